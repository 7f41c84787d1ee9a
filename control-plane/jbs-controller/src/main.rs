use std::net::SocketAddr;
use std::sync::{Arc, atomic::AtomicBool};

use envconfig::Envconfig;
use jbs_controller::{
    bootstrap::BootstrapOrchestrator,
    cluster::KubeCluster,
    config::ControllerConfig,
    controller::registrations,
    init_tracing,
    manager::KubeManagerBuilder,
    web::{bind_probe_listener, run_probe_server},
};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let cfg = ControllerConfig::init_from_env()?;
    info!(?cfg, "starting jvm build service controller");
    let settings = cfg.bootstrap.settings()?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    // Liveness is served for the whole bootstrap; readiness only once the
    // manager runs.
    let started = Arc::new(AtomicBool::new(false));
    let probe_addr: SocketAddr = ([0, 0, 0, 0], cfg.probe_port).into();
    let listener = bind_probe_listener(probe_addr).await?;
    let mut probes = tokio::spawn(run_probe_server(
        listener,
        started.clone(),
        shutdown.clone(),
    ));

    let kube_config = kube::Config::infer().await?;
    let discovery = KubeCluster::new(Client::try_from(kube_config.clone())?);
    let builder =
        KubeManagerBuilder::new(kube_config).with_started_flag(started);

    let mut orchestrator = BootstrapOrchestrator::new(
        settings,
        info_span!("bootstrap"),
        shutdown.clone(),
    );
    let bootstrap = tokio::select! {
        res = orchestrator.run(&discovery, &builder, registrations()) => res,
        res = &mut probes => {
            error!(result = ?res, "probe server stopped during bootstrap");
            std::process::exit(1);
        }
    };
    let manager = match bootstrap {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "unable to start controller manager");
            std::process::exit(1);
        }
    };

    info!("starting manager");
    let result = tokio::select! {
        res = manager.start(shutdown.clone()) => res,
        res = &mut probes => {
            let requested = shutdown.is_cancelled();
            shutdown.cancel();
            return match res {
                Ok(Ok(())) if requested => Ok(()),
                Ok(Ok(())) => Err(anyhow::anyhow!("probe server exited")),
                Ok(Err(e)) => Err(e.context("probe server failed")),
                Err(e) => Err(e.into()),
            };
        }
    };
    shutdown.cancel();
    probes.await??;
    result
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("termination signal received");
    shutdown.cancel();
}

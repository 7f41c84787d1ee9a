//! The manager handle returned by a successful bootstrap.
//!
//! It owns the cached client used by controller watches, the frozen type
//! catalog and watch scope, and every runnable that controller setup added.
//! Nothing runs until [`Manager::start`] is called.

use std::future::Future;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::anyhow;
use futures_util::future::BoxFuture;
use kube::{
    Client,
    api::{ApiResource, GroupVersionKind},
    runtime::watcher,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bootstrap::ManagerBuilder;
use crate::catalog::TypeCatalog;
use crate::cluster::KubeCluster;
use crate::error::BootstrapError;
use crate::watch_scope::WatchScope;

type Runnable = BoxFuture<'static, anyhow::Result<()>>;

pub struct Manager {
    client: Client,
    config: kube::Config,
    catalog: Arc<TypeCatalog>,
    scope: Arc<WatchScope>,
    runnables: Vec<(&'static str, Runnable)>,
    started: Arc<AtomicBool>,
}

impl Manager {
    pub fn new(
        config: kube::Config,
        catalog: Arc<TypeCatalog>,
        scope: WatchScope,
    ) -> Result<Self, BootstrapError> {
        let client = Client::try_from(config.clone())
            .map_err(|e| BootstrapError::ManagerConstruction(e.to_string()))?;
        Ok(Self {
            client,
            config,
            catalog,
            scope: Arc::new(scope),
            runnables: Vec::new(),
            started: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn config(&self) -> &kube::Config {
        &self.config
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn scope(&self) -> &WatchScope {
        &self.scope
    }

    pub fn api_resource(
        &self,
        kind: &GroupVersionKind,
    ) -> anyhow::Result<ApiResource> {
        self.catalog.resolve(kind).cloned().ok_or_else(|| {
            anyhow!(
                "kind {}/{} {} is not registered in the type catalog",
                kind.group,
                kind.version,
                kind.kind
            )
        })
    }

    pub fn watcher_config(&self, kind: &GroupVersionKind) -> watcher::Config {
        self.scope.watcher_config(kind)
    }

    pub fn add_runnable<F>(&mut self, name: &'static str, runnable: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.runnables.push((name, Box::pin(runnable)));
    }

    pub fn runnable_names(&self) -> Vec<&'static str> {
        self.runnables.iter().map(|(name, _)| *name).collect()
    }

    /// Flag that turns true once [`Manager::start`] has launched every
    /// runnable.
    pub fn started_flag(&self) -> Arc<AtomicBool> {
        self.started.clone()
    }

    /// Run every runnable until one fails, or until `shutdown` fires.
    pub async fn start(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let mut set = JoinSet::new();
        for (name, runnable) in self.runnables {
            info!(runnable = name, "starting");
            set.spawn(async move { (name, runnable.await) });
        }
        self.started.store(true, Ordering::SeqCst);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping runnables");
                    set.shutdown().await;
                    return Ok(());
                }
                next = set.join_next() => match next {
                    None => return Ok(()),
                    Some(Ok((name, Ok(())))) => info!(runnable = name, "finished"),
                    Some(Ok((name, Err(e)))) => {
                        error!(runnable = name, error = ?e, "runnable failed");
                        set.shutdown().await;
                        return Err(e.context(format!("runnable '{name}' failed")));
                    }
                    Some(Err(e)) => {
                        set.shutdown().await;
                        return Err(anyhow!("runnable task aborted: {e}"));
                    }
                }
            }
        }
    }
}

/// Builds [`Manager`]s and direct clients from one kube connection config.
#[derive(Clone)]
pub struct KubeManagerBuilder {
    config: kube::Config,
    started: Option<Arc<AtomicBool>>,
}

impl KubeManagerBuilder {
    pub fn new(config: kube::Config) -> Self {
        Self {
            config,
            started: None,
        }
    }

    /// Share `flag` with managers built from here, e.g. with a probe server
    /// that is already running.
    pub fn with_started_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.started = Some(flag);
        self
    }
}

impl ManagerBuilder for KubeManagerBuilder {
    type Manager = Manager;
    type Direct = KubeCluster;

    fn new_manager(
        &self,
        catalog: Arc<TypeCatalog>,
        scope: WatchScope,
    ) -> Result<Manager, BootstrapError> {
        let mut manager = Manager::new(self.config.clone(), catalog, scope)?;
        if let Some(flag) = &self.started {
            manager.started = flag.clone();
        }
        Ok(manager)
    }

    fn new_direct_client(
        &self,
        manager: &Manager,
    ) -> Result<KubeCluster, BootstrapError> {
        let client = Client::try_from(manager.config().clone()).map_err(|e| {
            BootstrapError::ManagerConstruction(format!(
                "unable to initialize non cached client: {e}"
            ))
        })?;
        Ok(KubeCluster::new(client))
    }
}

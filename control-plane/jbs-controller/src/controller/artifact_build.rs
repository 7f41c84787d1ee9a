use std::sync::Arc;

use futures_util::StreamExt;
use kube::{
    Api, ResourceExt,
    runtime::{Controller, controller::Action},
};
use tokio::time::Duration;
use tracing::{error, info};

use super::{ReconcileErr, require_watched};
use crate::catalog::kind_of;
use crate::crd::artifact_build::{ArtifactBuild, STATE_NEW};
use crate::manager::Manager;

pub const NAME: &str = "artifact-build";

pub fn setup_with_manager(mgr: &mut Manager) -> anyhow::Result<()> {
    let kind = kind_of::<ArtifactBuild>();
    require_watched(mgr, &kind)?;
    let api: Api<ArtifactBuild> = Api::all(mgr.client());
    let wc = mgr.watcher_config(&kind);

    mgr.add_runnable(NAME, async move {
        Controller::new(api, wc)
            .run(reconcile, error_policy, Arc::new(()))
            .for_each(|res| async move {
                match res {
                    Ok((obj_ref, action)) => {
                        info!(object = %obj_ref, "reconciled: requeue={:?}", action)
                    }
                    Err(e) => error!(error = ?e, "artifact build reconcile error"),
                }
            })
            .await;
        Ok(())
    });
    Ok(())
}

async fn reconcile(
    ab: Arc<ArtifactBuild>,
    _ctx: Arc<()>,
) -> Result<Action, ReconcileErr> {
    let state = ab
        .status
        .as_ref()
        .and_then(|s| s.state.as_deref())
        .unwrap_or(STATE_NEW);
    info!(
        namespace = %ab.namespace().unwrap_or_default(),
        name = %ab.name_any(),
        gav = %ab.spec.gav,
        state,
        "observed artifact build"
    );
    Ok(Action::await_change())
}

fn error_policy(
    _ab: Arc<ArtifactBuild>,
    err: &ReconcileErr,
    _ctx: Arc<()>,
) -> Action {
    error!(error = %err, "artifact build reconcile failed");
    Action::requeue(Duration::from_secs(60))
}

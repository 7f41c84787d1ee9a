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
use crate::crd::dependency_build::{DependencyBuild, STATE_NEW};
use crate::manager::Manager;

pub const NAME: &str = "dependency-build";

pub fn setup_with_manager(mgr: &mut Manager) -> anyhow::Result<()> {
    let kind = kind_of::<DependencyBuild>();
    require_watched(mgr, &kind)?;
    let api: Api<DependencyBuild> = Api::all(mgr.client());
    let wc = mgr.watcher_config(&kind);

    mgr.add_runnable(NAME, async move {
        Controller::new(api, wc)
            .run(reconcile, error_policy, Arc::new(()))
            .for_each(|res| async move {
                match res {
                    Ok((obj_ref, action)) => {
                        info!(object = %obj_ref, "reconciled: requeue={:?}", action)
                    }
                    Err(e) => error!(error = ?e, "dependency build reconcile error"),
                }
            })
            .await;
        Ok(())
    });
    Ok(())
}

async fn reconcile(
    db: Arc<DependencyBuild>,
    _ctx: Arc<()>,
) -> Result<Action, ReconcileErr> {
    if db.spec.scm.scm_url.is_empty() {
        return Err(ReconcileErr::Internal(format!(
            "dependency build {} has no SCM URL",
            db.name_any()
        )));
    }
    let state = db
        .status
        .as_ref()
        .and_then(|s| s.state.as_deref())
        .unwrap_or(STATE_NEW);
    info!(
        namespace = %db.namespace().unwrap_or_default(),
        name = %db.name_any(),
        scm = %db.spec.scm.scm_url,
        tag = %db.spec.scm.tag,
        state,
        "observed dependency build"
    );
    Ok(Action::await_change())
}

fn error_policy(
    _db: Arc<DependencyBuild>,
    err: &ReconcileErr,
    _ctx: Arc<()>,
) -> Action {
    error!(error = %err, "dependency build reconcile failed");
    Action::requeue(Duration::from_secs(60))
}

//! Observes the pipeline runs this service created. The watch is limited to
//! runs carrying the pipeline-run label, so foreign runs never reach the
//! cache.

use std::sync::Arc;

use futures_util::StreamExt;
use kube::{
    Api, ResourceExt,
    api::DynamicObject,
    runtime::{Controller, controller::Action},
};
use tokio::time::Duration;
use tracing::{error, info};

use super::{ReconcileErr, require_watched};
use crate::crd::tekton::pipeline_run_gvk;
use crate::manager::Manager;

pub const NAME: &str = "pipeline-wrapper";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Succeeded,
    Failed,
}

/// Reads the `Succeeded` condition of a pipeline run.
pub fn run_outcome(run: &DynamicObject) -> RunOutcome {
    let status = run
        .data
        .pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .and_then(|conds| {
            conds.iter().find(|c| {
                c.get("type").and_then(|t| t.as_str()) == Some("Succeeded")
            })
        })
        .and_then(|c| c.get("status"))
        .and_then(|s| s.as_str());
    match status {
        Some("True") => RunOutcome::Succeeded,
        Some("False") => RunOutcome::Failed,
        _ => RunOutcome::Running,
    }
}

pub fn setup_with_manager(mgr: &mut Manager) -> anyhow::Result<()> {
    let kind = pipeline_run_gvk();
    require_watched(mgr, &kind)?;
    let ar = mgr.api_resource(&kind)?;
    let api: Api<DynamicObject> = Api::all_with(mgr.client(), &ar);
    let wc = mgr.watcher_config(&kind);

    mgr.add_runnable(NAME, async move {
        Controller::new_with(api, wc, ar)
            .run(reconcile, error_policy, Arc::new(()))
            .for_each(|res| async move {
                match res {
                    Ok((obj_ref, action)) => {
                        info!(object = %obj_ref, "reconciled: requeue={:?}", action)
                    }
                    Err(e) => error!(error = ?e, "pipeline run reconcile error"),
                }
            })
            .await;
        Ok(())
    });
    Ok(())
}

async fn reconcile(
    run: Arc<DynamicObject>,
    _ctx: Arc<()>,
) -> Result<Action, ReconcileErr> {
    let namespace = run.namespace().ok_or_else(|| {
        ReconcileErr::Internal(format!(
            "pipeline run {} has no namespace",
            run.name_any()
        ))
    })?;
    let outcome = run_outcome(&run);
    info!(namespace = %namespace, name = %run.name_any(), ?outcome, "observed pipeline run");
    match outcome {
        RunOutcome::Running => Ok(Action::requeue(Duration::from_secs(300))),
        RunOutcome::Succeeded | RunOutcome::Failed => Ok(Action::await_change()),
    }
}

fn error_policy(
    _run: Arc<DynamicObject>,
    err: &ReconcileErr,
    _ctx: Arc<()>,
) -> Action {
    error!(error = %err, "pipeline run reconcile failed");
    Action::requeue(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use kube::api::ApiResource;
    use serde_json::json;

    use super::*;
    use crate::crd::tekton::pipeline_run_resource;

    fn run_with(status: serde_json::Value) -> DynamicObject {
        let ar: ApiResource = pipeline_run_resource();
        let mut obj = DynamicObject::new("pr-1", &ar).within("builds");
        obj.data = json!({ "status": status });
        obj
    }

    #[test]
    fn outcome_follows_succeeded_condition() {
        let ok = run_with(json!({"conditions": [{"type": "Succeeded", "status": "True"}]}));
        assert_eq!(run_outcome(&ok), RunOutcome::Succeeded);
        let failed = run_with(json!({"conditions": [{"type": "Succeeded", "status": "False"}]}));
        assert_eq!(run_outcome(&failed), RunOutcome::Failed);
        let pending = run_with(json!({"conditions": [{"type": "Succeeded", "status": "Unknown"}]}));
        assert_eq!(run_outcome(&pending), RunOutcome::Running);
    }

    #[test]
    fn missing_status_counts_as_running() {
        let run = run_with(json!({}));
        assert_eq!(run_outcome(&run), RunOutcome::Running);
    }
}

//! Controller registrations, in the order the bootstrap runs them.
//!
//! Each setup resolves its kind through the manager's catalog, builds a
//! watch loop with the manager's scoped watcher config and hands it to the
//! manager as a runnable. Nothing starts until the manager does.

use kube::api::GroupVersionKind;

use crate::bootstrap::RegistrationDescriptor;
use crate::manager::Manager;

pub mod artifact_build;
pub mod config_map;
pub mod dependency_build;
pub mod pipeline_wrapper;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("internal error: {0}")]
    Internal(String),
}

/// All controllers, in fixed registration order.
pub fn registrations() -> Vec<RegistrationDescriptor<Manager>> {
    vec![
        RegistrationDescriptor::new(
            artifact_build::NAME,
            artifact_build::setup_with_manager,
        ),
        RegistrationDescriptor::new(
            dependency_build::NAME,
            dependency_build::setup_with_manager,
        ),
        RegistrationDescriptor::with_system_config(
            config_map::NAME,
            config_map::setup_with_manager,
        ),
        RegistrationDescriptor::new(
            pipeline_wrapper::NAME,
            pipeline_wrapper::setup_with_manager,
        ),
    ]
}

/// Fails unless `kind` is in the catalog and held in the watch cache.
fn require_watched(mgr: &Manager, kind: &GroupVersionKind) -> anyhow::Result<()> {
    mgr.api_resource(kind)?;
    if !mgr.scope().is_watched(kind) {
        anyhow::bail!(
            "kind {}/{} {} is not part of the watch scope",
            kind.group,
            kind.version,
            kind.kind
        );
    }
    Ok(())
}

use std::time::Duration;

use kube::api::GroupVersionKind;
use thiserror::Error;

/// A single failed lookup against the cluster API. Gates log these and retry;
/// they never end a bootstrap on their own.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCause {
    DeadlineElapsed,
    Cancelled,
}

impl std::fmt::Display for WaitCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitCause::DeadlineElapsed => f.write_str("deadline elapsed"),
            WaitCause::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "gave up waiting for {what} after {elapsed:?} and {attempts} attempt(s): {cause}"
)]
pub struct ReadinessTimeout {
    pub what: String,
    pub cause: WaitCause,
    pub elapsed: Duration,
    pub attempts: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "schema conflict: {kind:?} from set '{conflicting_set}' is already registered by set '{existing_set}'"
)]
pub struct SchemaConflict {
    pub kind: GroupVersionKind,
    pub existing_set: String,
    pub conflicting_set: String,
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    ReadinessTimeout(#[from] ReadinessTimeout),

    #[error(transparent)]
    SchemaConflict(#[from] SchemaConflict),

    #[error("manager construction failed: {0}")]
    ManagerConstruction(String),

    #[error("setup of controller '{controller}' failed: {source}")]
    Registration {
        controller: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl BootstrapError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BootstrapError::ReadinessTimeout(_))
    }
}

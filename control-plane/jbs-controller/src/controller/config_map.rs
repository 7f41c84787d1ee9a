//! Watches the system config map that the bootstrap validated.
//!
//! The validated data is fixed for the life of the process; later edits are
//! reported so operators know a restart is needed to pick them up.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    Api, ResourceExt,
    runtime::{Controller, controller::Action},
};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use super::{ReconcileErr, require_watched};
use crate::bootstrap::SystemConfig;
use crate::catalog::kind_of;
use crate::manager::Manager;

pub const NAME: &str = "config-map";

pub const SYSTEM_CONFIG_MAP_NAME: &str = "jvm-build-system-config";
pub const SYSTEM_CONFIG_MAP_NAMESPACE: &str = "jvm-build-service";

/// Keys the system config map must define before any controller starts.
pub const REQUIRED_KEYS: &[&str] = &[
    "builder-image.jdk8.image",
    "builder-image.jdk11.image",
    "builder-image.jdk17.image",
];

struct Context {
    system: SystemConfig,
}

pub fn setup_with_manager(
    mgr: &mut Manager,
    system: &SystemConfig,
) -> anyhow::Result<()> {
    let kind = kind_of::<ConfigMap>();
    require_watched(mgr, &kind)?;
    let api: Api<ConfigMap> = Api::all(mgr.client());
    let wc = mgr.watcher_config(&kind);
    let ctx = Arc::new(Context {
        system: system.clone(),
    });
    info!(
        namespace = %system.namespace,
        name = %system.name,
        keys = system.data.len(),
        "using system config"
    );

    mgr.add_runnable(NAME, async move {
        Controller::new(api, wc)
            .run(reconcile, error_policy, ctx)
            .for_each(|res| async move {
                if let Err(e) = res {
                    error!(error = ?e, "config map reconcile error");
                }
            })
            .await;
        Ok(())
    });
    Ok(())
}

async fn reconcile(
    cm: Arc<ConfigMap>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileErr> {
    let system = &ctx.system;
    if cm.namespace().as_deref() != Some(system.namespace.as_str())
        || cm.name_any() != system.name
    {
        return Ok(Action::await_change());
    }

    let current = cm.data.clone().unwrap_or_default();
    let drift = config_drift(&system.data, &current);
    if drift.is_empty() {
        debug!("system config unchanged");
    } else {
        warn!(
            added = ?drift.added,
            removed = ?drift.removed,
            changed = ?drift.changed,
            "system config map changed since startup, restart to apply"
        );
    }
    Ok(Action::await_change())
}

fn error_policy(
    _cm: Arc<ConfigMap>,
    err: &ReconcileErr,
    _ctx: Arc<Context>,
) -> Action {
    error!(error = %err, "config map reconcile failed");
    Action::requeue(Duration::from_secs(60))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigDrift {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl ConfigDrift {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Key-level difference between the data seen at startup and now.
pub fn config_drift(
    startup: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> ConfigDrift {
    let mut drift = ConfigDrift::default();
    for (k, v) in current {
        match startup.get(k) {
            None => drift.added.push(k.clone()),
            Some(old) if old != v => drift.changed.push(k.clone()),
            Some(_) => {}
        }
    }
    drift.removed = startup
        .keys()
        .filter(|k| !current.contains_key(*k))
        .cloned()
        .collect();
    drift
}

//! Which objects of each watched kind the shared watch cache subscribes to.
//!
//! Only pipeline runs are restricted, to those carrying the controller's own
//! pipeline-run label. The build service's custom resources and config maps
//! are watched in full.

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{api::GroupVersionKind, runtime::watcher};

use crate::catalog::{TypeCatalog, kind_of};
use crate::crd::{
    artifact_build::ArtifactBuild,
    dependency_build::DependencyBuild,
    tekton::{is_pipeline_run, pipeline_run_gvk},
};
use crate::error::BootstrapError;

/// Label placed on every pipeline run this controller creates.
pub const PIPELINE_RUN_LABEL: &str = "jvmbuildservice.io/pipelinerun";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchSelector {
    Unrestricted,
    LabelEquals { key: String, value: String },
}

impl WatchSelector {
    /// Kubernetes label selector string, `None` when unrestricted.
    pub fn label_selector(&self) -> Option<String> {
        match self {
            WatchSelector::Unrestricted => None,
            WatchSelector::LabelEquals { key, value } => {
                Some(format!("{key}={value}"))
            }
        }
    }

    pub fn watcher_config(&self) -> watcher::Config {
        match self.label_selector() {
            Some(selector) => watcher::Config::default().labels(&selector),
            None => watcher::Config::default(),
        }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            WatchSelector::Unrestricted => true,
            WatchSelector::LabelEquals { key, value } => {
                labels.get(key).is_some_and(|v| v == value)
            }
        }
    }
}

/// The kinds held in the shared watch cache.
pub fn watched_kinds() -> Vec<GroupVersionKind> {
    vec![
        pipeline_run_gvk(),
        kind_of::<DependencyBuild>(),
        kind_of::<ArtifactBuild>(),
        kind_of::<ConfigMap>(),
    ]
}

#[derive(Clone, Debug)]
pub struct WatchScopePolicy {
    pipeline_run_label: String,
}

impl Default for WatchScopePolicy {
    fn default() -> Self {
        Self::new(PIPELINE_RUN_LABEL)
    }
}

impl WatchScopePolicy {
    pub fn new(pipeline_run_label: impl Into<String>) -> Self {
        Self {
            pipeline_run_label: pipeline_run_label.into(),
        }
    }

    pub fn selector_for(&self, kind: &GroupVersionKind) -> WatchSelector {
        if is_pipeline_run(kind) {
            WatchSelector::LabelEquals {
                key: self.pipeline_run_label.clone(),
                value: String::new(),
            }
        } else {
            WatchSelector::Unrestricted
        }
    }

    /// Freeze the selectors for every watched kind. Each watched kind must be
    /// known to `catalog`.
    pub fn build(
        &self,
        catalog: &TypeCatalog,
    ) -> Result<WatchScope, BootstrapError> {
        let mut selectors = HashMap::new();
        for kind in watched_kinds() {
            if !catalog.contains(&kind) {
                return Err(BootstrapError::ManagerConstruction(format!(
                    "watched kind {}/{} {} is not in the type catalog",
                    kind.group, kind.version, kind.kind
                )));
            }
            let selector = self.selector_for(&kind);
            selectors.insert(kind, selector);
        }
        Ok(WatchScope { selectors })
    }
}

/// Frozen per-kind selectors handed to the manager.
#[derive(Clone, Debug, Default)]
pub struct WatchScope {
    selectors: HashMap<GroupVersionKind, WatchSelector>,
}

impl WatchScope {
    pub fn selector(&self, kind: &GroupVersionKind) -> WatchSelector {
        self.selectors
            .get(kind)
            .cloned()
            .unwrap_or(WatchSelector::Unrestricted)
    }

    pub fn watcher_config(&self, kind: &GroupVersionKind) -> watcher::Config {
        self.selector(kind).watcher_config()
    }

    pub fn is_watched(&self, kind: &GroupVersionKind) -> bool {
        self.selectors.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TypeCatalog, build_schemas, default_schema_sets};

    #[test]
    fn pipeline_runs_require_the_controller_label() {
        let policy = WatchScopePolicy::default();
        let sel = policy.selector_for(&pipeline_run_gvk());
        assert_eq!(
            sel,
            WatchSelector::LabelEquals {
                key: PIPELINE_RUN_LABEL.into(),
                value: String::new()
            }
        );
        assert_eq!(
            sel.label_selector().as_deref(),
            Some("jvmbuildservice.io/pipelinerun=")
        );
        // any served version of the kind is restricted
        let v1 = GroupVersionKind::gvk("tekton.dev", "v1", "PipelineRun");
        assert_ne!(policy.selector_for(&v1), WatchSelector::Unrestricted);
    }

    #[test]
    fn own_resources_and_config_maps_are_unrestricted() {
        let policy = WatchScopePolicy::default();
        for kind in [
            kind_of::<ArtifactBuild>(),
            kind_of::<DependencyBuild>(),
            kind_of::<ConfigMap>(),
        ] {
            assert_eq!(policy.selector_for(&kind), WatchSelector::Unrestricted);
        }
        assert_eq!(
            policy.selector_for(&crate::crd::tekton::task_run_gvk()),
            WatchSelector::Unrestricted
        );
    }

    #[test]
    fn exactly_one_watched_kind_is_restricted() {
        let catalog = TypeCatalog::from_sets(default_schema_sets()).unwrap();
        let scope = WatchScopePolicy::default().build(&catalog).unwrap();
        assert_eq!(scope.len(), 4);
        let restricted = watched_kinds()
            .iter()
            .filter(|k| scope.selector(k) != WatchSelector::Unrestricted)
            .count();
        assert_eq!(restricted, 1);
        assert_eq!(
            scope.watcher_config(&pipeline_run_gvk()).label_selector.as_deref(),
            Some("jvmbuildservice.io/pipelinerun=")
        );
        assert!(
            scope
                .watcher_config(&kind_of::<ArtifactBuild>())
                .label_selector
                .is_none()
        );
    }

    #[test]
    fn custom_label_key_is_honoured() {
        let policy = WatchScopePolicy::new("example.com/owned");
        let sel = policy.selector_for(&pipeline_run_gvk());
        let mut labels = BTreeMap::new();
        assert!(!sel.matches(&labels));
        labels.insert("example.com/owned".to_string(), String::new());
        assert!(sel.matches(&labels));
        labels.insert("example.com/owned".to_string(), "x".to_string());
        assert!(!sel.matches(&labels));
    }

    #[test]
    fn watched_kind_missing_from_catalog_fails_construction() {
        let catalog = TypeCatalog::from_sets([build_schemas()]).unwrap();
        let err = WatchScopePolicy::default().build(&catalog).unwrap_err();
        assert!(matches!(err, BootstrapError::ManagerConstruction(_)));
    }
}

//! Startup sequencing for the controller process.
//!
//! The orchestrator moves through a fixed, linear set of phases:
//!
//! 1. wait until the pipeline CRD is installed (direct lookup),
//! 2. build the type catalog,
//! 3. construct the manager with its watch scope, plus a direct client,
//! 4. wait until the system config map holds every required key,
//! 5. run controller setup in registration order.
//!
//! Any failure ends the bootstrap. Retries only happen inside a readiness
//! gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info};

use crate::catalog::{SchemaSet, TypeCatalog, default_schema_sets};
use crate::cluster::ClusterApi;
use crate::controller::config_map::{
    REQUIRED_KEYS, SYSTEM_CONFIG_MAP_NAME, SYSTEM_CONFIG_MAP_NAMESPACE,
};
use crate::crd::tekton::TASK_RUN_CRD;
use crate::error::BootstrapError;
use crate::readiness::{Check, GateTiming, ReadinessCondition, ReadinessGate};
use crate::watch_scope::{PIPELINE_RUN_LABEL, WatchScope, WatchScopePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    AwaitingResourceKind,
    CatalogBuilt,
    ManagerConstructed,
    AwaitingConfig,
    ControllersRegistering,
    Ready,
    Failed,
}

/// Constructs the manager and its companion direct client.
pub trait ManagerBuilder {
    type Manager: Send;
    type Direct: ClusterApi;

    fn new_manager(
        &self,
        catalog: Arc<TypeCatalog>,
        scope: WatchScope,
    ) -> Result<Self::Manager, BootstrapError>;

    /// A client that reads the cluster directly, derived from the manager's
    /// connection settings. It must not depend on the manager's cache.
    fn new_direct_client(
        &self,
        manager: &Self::Manager,
    ) -> Result<Self::Direct, BootstrapError>;
}

/// Contents of the system config map once every required key is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub namespace: String,
    pub name: String,
    pub data: BTreeMap<String, String>,
}

impl SystemConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Required keys absent from `data`, in the order they were required.
pub fn missing_keys<'a>(
    data: &BTreeMap<String, String>,
    required: &'a [String],
) -> Vec<&'a str> {
    required
        .iter()
        .filter(|k| !data.contains_key(k.as_str()))
        .map(String::as_str)
        .collect()
}

type ManagerSetup<M> = Box<dyn FnOnce(&mut M) -> anyhow::Result<()> + Send>;
type ConfiguredSetup<M> =
    Box<dyn FnOnce(&mut M, &SystemConfig) -> anyhow::Result<()> + Send>;

pub enum Setup<M> {
    Manager(ManagerSetup<M>),
    WithSystemConfig(ConfiguredSetup<M>),
}

pub struct RegistrationDescriptor<M> {
    name: &'static str,
    setup: Setup<M>,
}

impl<M> RegistrationDescriptor<M> {
    pub fn new<F>(name: &'static str, setup: F) -> Self
    where
        F: FnOnce(&mut M) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name,
            setup: Setup::Manager(Box::new(setup)),
        }
    }

    /// A setup that also receives the validated system configuration.
    pub fn with_system_config<F>(name: &'static str, setup: F) -> Self
    where
        F: FnOnce(&mut M, &SystemConfig) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name,
            setup: Setup::WithSystemConfig(Box::new(setup)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn invoke(self, manager: &mut M, config: &SystemConfig) -> anyhow::Result<()> {
        match self.setup {
            Setup::Manager(f) => f(manager),
            Setup::WithSystemConfig(f) => f(manager, config),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    /// CRD that must exist before the watch cache may start.
    pub required_crd: String,
    pub system_config_namespace: String,
    pub system_config_name: String,
    pub required_keys: Vec<String>,
    pub pipeline_run_label: String,
    pub timing: GateTiming,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            required_crd: TASK_RUN_CRD.to_string(),
            system_config_namespace: SYSTEM_CONFIG_MAP_NAMESPACE.to_string(),
            system_config_name: SYSTEM_CONFIG_MAP_NAME.to_string(),
            required_keys: REQUIRED_KEYS.iter().map(|k| k.to_string()).collect(),
            pipeline_run_label: PIPELINE_RUN_LABEL.to_string(),
            timing: GateTiming::default(),
        }
    }
}

pub struct BootstrapOrchestrator {
    settings: BootstrapSettings,
    schema_sets: Vec<SchemaSet>,
    span: Span,
    cancel: CancellationToken,
    history: Vec<Phase>,
}

impl BootstrapOrchestrator {
    /// `span` carries the structured context for everything the bootstrap
    /// logs; `cancel` aborts any gate that is still waiting.
    pub fn new(
        settings: BootstrapSettings,
        span: Span,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            schema_sets: default_schema_sets(),
            span,
            cancel,
            history: vec![Phase::Init],
        }
    }

    pub fn with_schema_sets(mut self, sets: Vec<SchemaSet>) -> Self {
        self.schema_sets = sets;
        self
    }

    pub fn phase(&self) -> Phase {
        self.history.last().copied().unwrap_or(Phase::Init)
    }

    /// Every phase entered so far, starting with `Init`.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Run the whole bootstrap. On success the returned manager has every
    /// controller registered but has not been started.
    pub async fn run<B: ManagerBuilder>(
        &mut self,
        discovery: &dyn ClusterApi,
        builder: &B,
        registrations: Vec<RegistrationDescriptor<B::Manager>>,
    ) -> Result<B::Manager, BootstrapError> {
        let span = self.span.clone();
        let result = self
            .drive(discovery, builder, registrations)
            .instrument(span.clone())
            .await;
        if let Err(e) = &result {
            let failed_in = self.phase();
            self.enter(Phase::Failed);
            span.in_scope(|| {
                error!(phase = ?failed_in, error = %e, "bootstrap failed")
            });
        }
        result
    }

    fn enter(&mut self, phase: Phase) {
        self.history.push(phase);
    }

    fn transition(&mut self, phase: Phase) {
        info!(?phase, "bootstrap phase");
        self.enter(phase);
    }

    async fn drive<B: ManagerBuilder>(
        &mut self,
        discovery: &dyn ClusterApi,
        builder: &B,
        registrations: Vec<RegistrationDescriptor<B::Manager>>,
    ) -> Result<B::Manager, BootstrapError> {
        let settings = self.settings.clone();
        let gate = ReadinessGate::new(self.span.clone(), self.cancel.clone());

        // The watch cache cannot start before the kinds it watches exist.
        self.transition(Phase::AwaitingResourceKind);
        let crd = settings.required_crd.as_str();
        gate.wait(ReadinessCondition::new(
            format!("CRD {crd}"),
            settings.timing,
            || async move {
                if discovery.crd_exists(crd).await? {
                    info!(crd, "get of CRD returned successfully");
                    Ok(Check::Ready(()))
                } else {
                    info!(crd, "CRD not installed yet");
                    Ok(Check::NotReady)
                }
            },
        ))
        .await?;

        let catalog =
            Arc::new(TypeCatalog::from_sets(std::mem::take(&mut self.schema_sets))?);
        info!(kinds = catalog.len(), "type catalog built");
        self.transition(Phase::CatalogBuilt);

        let scope = WatchScopePolicy::new(settings.pipeline_run_label.as_str())
            .build(&catalog)?;
        let mut manager = builder.new_manager(catalog, scope)?;
        let direct = builder.new_direct_client(&manager)?;
        self.transition(Phase::ManagerConstructed);

        self.transition(Phase::AwaitingConfig);
        let namespace = settings.system_config_namespace.as_str();
        let name = settings.system_config_name.as_str();
        let required = settings.required_keys.as_slice();
        let direct = &direct;
        let data = gate
            .wait(ReadinessCondition::new(
                format!("config map {namespace}/{name}"),
                settings.timing,
                || async move {
                    let Some(data) =
                        direct.config_map_data(namespace, name).await?
                    else {
                        info!(namespace, name, "system config map not found");
                        return Ok(Check::NotReady);
                    };
                    let missing = missing_keys(&data, required);
                    if missing.is_empty() {
                        info!("config map loaded and has required keys");
                        return Ok(Check::Ready(data));
                    }
                    for key in missing {
                        info!(key, "missing required key in system config map");
                    }
                    Ok(Check::NotReady)
                },
            ))
            .await?;
        let system_config = SystemConfig {
            namespace: namespace.to_string(),
            name: name.to_string(),
            data,
        };

        self.transition(Phase::ControllersRegistering);
        for descriptor in registrations {
            let controller = descriptor.name();
            info!(controller, "setting up controller");
            descriptor
                .invoke(&mut manager, &system_config)
                .map_err(|source| BootstrapError::Registration {
                    controller,
                    source,
                })?;
        }

        self.transition(Phase::Ready);
        Ok(manager)
    }
}

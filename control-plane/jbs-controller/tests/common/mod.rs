#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use jbs_controller::{
    bootstrap::{ManagerBuilder, RegistrationDescriptor, SystemConfig},
    catalog::TypeCatalog,
    cluster::ClusterApi,
    error::{BootstrapError, ClusterError},
    watch_scope::WatchScope,
};
use tokio::time::Instant;

pub fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

struct ClusterState {
    start: Instant,
    /// `None` means the CRD never appears.
    crd_installed_at: Option<Duration>,
    crd_errors_before_success: u32,
    config_errors_before_success: u32,
    /// Config map snapshots, each effective from its offset onwards.
    config_timeline: Vec<(Duration, Option<BTreeMap<String, String>>)>,
    crd_lookups: AtomicU32,
    config_reads: AtomicU32,
}

/// Scripted cluster whose answers depend on the (paused) tokio clock.
#[derive(Clone)]
pub struct FakeCluster {
    state: Arc<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ClusterState {
                start: Instant::now(),
                crd_installed_at: Some(Duration::ZERO),
                crd_errors_before_success: 0,
                config_errors_before_success: 0,
                config_timeline: Vec::new(),
                crd_lookups: AtomicU32::new(0),
                config_reads: AtomicU32::new(0),
            }),
        }
    }

    fn edit(mut self, f: impl FnOnce(&mut ClusterState)) -> Self {
        let state = Arc::get_mut(&mut self.state)
            .expect("fake cluster is configured before it is shared");
        f(state);
        self
    }

    pub fn crd_never_installed(self) -> Self {
        self.edit(|s| s.crd_installed_at = None)
    }

    pub fn crd_installed_at(self, at: Duration) -> Self {
        self.edit(|s| s.crd_installed_at = Some(at))
    }

    pub fn crd_lookup_errors(self, n: u32) -> Self {
        self.edit(|s| s.crd_errors_before_success = n)
    }

    pub fn config_read_errors(self, n: u32) -> Self {
        self.edit(|s| s.config_errors_before_success = n)
    }

    pub fn config_at(
        self,
        at: Duration,
        config: Option<BTreeMap<String, String>>,
    ) -> Self {
        self.edit(|s| s.config_timeline.push((at, config)))
    }

    pub fn crd_lookups(&self) -> u32 {
        self.state.crd_lookups.load(Ordering::SeqCst)
    }

    pub fn config_reads(&self) -> u32 {
        self.state.config_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn crd_exists(&self, _name: &str) -> Result<bool, ClusterError> {
        let n = self.state.crd_lookups.fetch_add(1, Ordering::SeqCst);
        if n < self.state.crd_errors_before_success {
            return Err(ClusterError::Unavailable("connection refused".into()));
        }
        let elapsed = self.state.start.elapsed();
        Ok(self
            .state
            .crd_installed_at
            .is_some_and(|at| elapsed >= at))
    }

    async fn config_map_data(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ClusterError> {
        let n = self.state.config_reads.fetch_add(1, Ordering::SeqCst);
        if n < self.state.config_errors_before_success {
            return Err(ClusterError::Unavailable("etcdserver: leader changed".into()));
        }
        let elapsed = self.state.start.elapsed();
        Ok(self
            .state
            .config_timeline
            .iter()
            .filter(|(at, _)| *at <= elapsed)
            .last()
            .and_then(|(_, cfg)| cfg.clone()))
    }
}

/// Stand-in for the manager: just remembers what setup did to it.
#[derive(Debug, Default)]
pub struct FakeManager {
    pub catalog_kinds: usize,
    pub scope_kinds: usize,
    pub setups: Vec<&'static str>,
}

pub struct FakeBuilder {
    pub direct: FakeCluster,
    pub fail_manager: bool,
    pub managers_built: AtomicU32,
}

impl FakeBuilder {
    pub fn new(direct: FakeCluster) -> Self {
        Self {
            direct,
            fail_manager: false,
            managers_built: AtomicU32::new(0),
        }
    }

    pub fn failing(direct: FakeCluster) -> Self {
        Self {
            fail_manager: true,
            ..Self::new(direct)
        }
    }

    pub fn managers_built(&self) -> u32 {
        self.managers_built.load(Ordering::SeqCst)
    }
}

impl ManagerBuilder for FakeBuilder {
    type Manager = FakeManager;
    type Direct = FakeCluster;

    fn new_manager(
        &self,
        catalog: Arc<TypeCatalog>,
        scope: WatchScope,
    ) -> Result<FakeManager, BootstrapError> {
        self.managers_built.fetch_add(1, Ordering::SeqCst);
        if self.fail_manager {
            return Err(BootstrapError::ManagerConstruction(
                "no kubeconfig".into(),
            ));
        }
        Ok(FakeManager {
            catalog_kinds: catalog.len(),
            scope_kinds: scope.len(),
            setups: Vec::new(),
        })
    }

    fn new_direct_client(
        &self,
        _manager: &FakeManager,
    ) -> Result<FakeCluster, BootstrapError> {
        Ok(self.direct.clone())
    }
}

pub type Calls = Arc<Mutex<Vec<&'static str>>>;

/// Four descriptors shaped like the real ones. `fail` names the one whose
/// setup returns an error.
pub fn recording_registrations(
    calls: &Calls,
    seen_config: &Arc<Mutex<Option<SystemConfig>>>,
    fail: Option<&'static str>,
) -> Vec<RegistrationDescriptor<FakeManager>> {
    let plain = |name: &'static str| {
        let calls = calls.clone();
        RegistrationDescriptor::new(name, move |m: &mut FakeManager| {
            calls.lock().unwrap().push(name);
            m.setups.push(name);
            if fail == Some(name) {
                anyhow::bail!("{name} setup failed");
            }
            Ok(())
        })
    };
    let configured = {
        let calls = calls.clone();
        let seen = seen_config.clone();
        RegistrationDescriptor::with_system_config(
            "config-map",
            move |m: &mut FakeManager, cfg: &SystemConfig| {
                calls.lock().unwrap().push("config-map");
                m.setups.push("config-map");
                *seen.lock().unwrap() = Some(cfg.clone());
                if fail == Some("config-map") {
                    anyhow::bail!("config-map setup failed");
                }
                Ok(())
            },
        )
    };
    vec![
        plain("artifact-build"),
        plain("dependency-build"),
        configured,
        plain("pipeline-wrapper"),
    ]
}

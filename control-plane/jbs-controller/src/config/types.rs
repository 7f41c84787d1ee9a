use std::time::Duration;

use envconfig::Envconfig;

use crate::bootstrap::BootstrapSettings;
use crate::controller::config_map::REQUIRED_KEYS;
use crate::error::BootstrapError;
use crate::readiness::GateTiming;

#[derive(Envconfig, Clone, Debug)]
pub struct ControllerConfig {
    #[envconfig(nested)]
    pub bootstrap: BootstrapConfig,

    /// Port of the health/readiness probe server.
    /// Env: JBS_PROBE_PORT
    #[envconfig(from = "JBS_PROBE_PORT", default = "8081")]
    pub probe_port: u16,
}

#[derive(Envconfig, Clone, Debug)]
pub struct BootstrapConfig {
    /// Retry cadence of every startup readiness check, in seconds.
    #[envconfig(from = "JBS_BOOTSTRAP_POLL_INTERVAL_SECS", default = "5")]
    pub poll_interval_secs: u64,

    /// Maximum time a startup readiness check may wait, in seconds.
    #[envconfig(from = "JBS_BOOTSTRAP_DEADLINE_SECS", default = "300")]
    pub deadline_secs: u64,

    #[envconfig(from = "JBS_REQUIRED_CRD", default = "taskruns.tekton.dev")]
    pub required_crd: String,

    #[envconfig(
        from = "JBS_SYSTEM_CONFIG_NAMESPACE",
        default = "jvm-build-service"
    )]
    pub system_config_namespace: String,

    #[envconfig(
        from = "JBS_SYSTEM_CONFIG_NAME",
        default = "jvm-build-system-config"
    )]
    pub system_config_name: String,

    /// Comma-separated override of the required system config keys.
    /// Env: JBS_REQUIRED_CONFIG_KEYS
    #[envconfig(from = "JBS_REQUIRED_CONFIG_KEYS")]
    pub required_keys: Option<String>,

    #[envconfig(
        from = "JBS_PIPELINE_RUN_LABEL",
        default = "jvmbuildservice.io/pipelinerun"
    )]
    pub pipeline_run_label: String,
}

impl BootstrapConfig {
    pub fn required_keys(&self) -> Vec<String> {
        match &self.required_keys {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            None => REQUIRED_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn timing(&self) -> Result<GateTiming, BootstrapError> {
        GateTiming::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.deadline_secs),
        )
    }

    /// Validate and freeze into the settings the orchestrator runs with.
    pub fn settings(&self) -> Result<BootstrapSettings, BootstrapError> {
        if self.pipeline_run_label.trim().is_empty() {
            return Err(BootstrapError::Config(
                "pipeline run label must not be empty".into(),
            ));
        }
        Ok(BootstrapSettings {
            required_crd: self.required_crd.clone(),
            system_config_namespace: self.system_config_namespace.clone(),
            system_config_name: self.system_config_name.clone(),
            required_keys: self.required_keys(),
            pipeline_run_label: self.pipeline_run_label.clone(),
            timing: self.timing()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::bootstrap::BootstrapSettings;

    fn from(pairs: &[(&str, &str)]) -> BootstrapConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BootstrapConfig::init_from_hashmap(&env).unwrap()
    }

    #[test]
    fn defaults_match_built_in_settings() {
        let settings = from(&[]).settings().unwrap();
        let builtin = BootstrapSettings::default();
        assert_eq!(settings.required_crd, builtin.required_crd);
        assert_eq!(settings.system_config_namespace, builtin.system_config_namespace);
        assert_eq!(settings.system_config_name, builtin.system_config_name);
        assert_eq!(settings.required_keys, builtin.required_keys);
        assert_eq!(settings.pipeline_run_label, builtin.pipeline_run_label);
        assert_eq!(settings.timing, builtin.timing);
    }

    #[test]
    fn required_keys_override_is_trimmed_and_split() {
        let cfg = from(&[(
            "JBS_REQUIRED_CONFIG_KEYS",
            " maven-repository, cache-url ,,",
        )]);
        assert_eq!(cfg.required_keys(), vec!["maven-repository", "cache-url"]);
    }

    #[test]
    fn short_timings_are_accepted_for_tests() {
        let cfg = from(&[
            ("JBS_BOOTSTRAP_POLL_INTERVAL_SECS", "1"),
            ("JBS_BOOTSTRAP_DEADLINE_SECS", "3"),
        ]);
        let timing = cfg.timing().unwrap();
        assert_eq!(timing.poll_interval(), Duration::from_secs(1));
        assert_eq!(timing.deadline(), Duration::from_secs(3));
    }

    #[test]
    fn deadline_must_exceed_interval() {
        let cfg = from(&[
            ("JBS_BOOTSTRAP_POLL_INTERVAL_SECS", "10"),
            ("JBS_BOOTSTRAP_DEADLINE_SECS", "10"),
        ]);
        assert!(matches!(cfg.settings(), Err(BootstrapError::Config(_))));
    }

    #[test]
    fn full_config_loads_probe_port() {
        let env = HashMap::from([("JBS_PROBE_PORT".to_string(), "9000".to_string())]);
        let cfg = ControllerConfig::init_from_hashmap(&env).unwrap();
        assert_eq!(cfg.probe_port, 9000);
        assert_eq!(cfg.bootstrap.deadline_secs, 300);
    }
}

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "jvmbuildservice.io",
    version = "v1alpha1",
    kind = "DependencyBuild",
    plural = "dependencybuilds",
    shortname = "db",
    namespaced,
    status = "DependencyBuildStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DependencyBuildSpec {
    pub scm: ScmInfo,
    pub version: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScmInfo {
    #[serde(rename = "scmURL")]
    pub scm_url: String,
    pub scm_type: String,
    pub tag: String,
    pub commit_hash: Option<String>,
    /// Sub-directory of the repository holding the build, if not the root
    pub path: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DependencyBuildStatus {
    pub state: Option<String>,
    pub message: Option<String>,
    pub contaminates: Option<Vec<Contaminant>>,
    pub last_completed_build_pipeline_run: Option<String>,
    pub commit_time: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Contaminant {
    pub gav: String,
    pub contaminated_artifacts: Option<Vec<String>>,
}

pub const STATE_NEW: &str = "DependencyBuildStateNew";

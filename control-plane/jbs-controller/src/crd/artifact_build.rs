use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "jvmbuildservice.io",
    version = "v1alpha1",
    kind = "ArtifactBuild",
    plural = "artifactbuilds",
    shortname = "ab",
    namespaced,
    status = "ArtifactBuildStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBuildSpec {
    /// Maven coordinates (group:artifact:version) of the artifact to rebuild
    pub gav: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBuildStatus {
    pub state: Option<String>,
    pub message: Option<String>,
    /// Name of the DependencyBuild that produces this artifact
    pub dependency_build_name: Option<String>,
}

pub const STATE_NEW: &str = "ArtifactBuildNew";

//! Pipeline engine kinds. These are owned by Tekton, so they are addressed
//! dynamically instead of through generated types.

use kube::api::{ApiResource, GroupVersionKind};

pub const TEKTON_GROUP: &str = "tekton.dev";
pub const TEKTON_VERSION: &str = "v1beta1";

/// Name of the CRD that must be installed before any pipeline kind can be
/// watched.
pub const TASK_RUN_CRD: &str = "taskruns.tekton.dev";

pub fn pipeline_run_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(TEKTON_GROUP, TEKTON_VERSION, "PipelineRun")
}

pub fn task_run_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(TEKTON_GROUP, TEKTON_VERSION, "TaskRun")
}

pub fn pipeline_run_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&pipeline_run_gvk(), "pipelineruns")
}

pub fn task_run_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&task_run_gvk(), "taskruns")
}

/// True for pipeline-run kinds of any served version.
pub fn is_pipeline_run(gvk: &GroupVersionKind) -> bool {
    gvk.group == TEKTON_GROUP && gvk.kind == "PipelineRun"
}

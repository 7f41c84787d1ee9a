pub mod artifact_build;
pub mod dependency_build;
pub mod tekton;

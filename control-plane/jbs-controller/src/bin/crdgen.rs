use jbs_controller::crd::{
    artifact_build::ArtifactBuild, dependency_build::DependencyBuild,
};
use kube::core::CustomResourceExt;

fn main() {
    for crd in [ArtifactBuild::crd(), DependencyBuild::crd()] {
        let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
        println!("---\n{}", yaml);
    }
}

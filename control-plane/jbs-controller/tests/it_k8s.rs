// Integration tests require a running Kubernetes cluster with the Tekton
// CRDs installed. These tests are ignored by default.

use std::collections::BTreeMap;
use std::time::Duration;

use jbs_controller::{
    bootstrap::{BootstrapOrchestrator, BootstrapSettings},
    cluster::{ClusterApi, KubeCluster},
    controller::registrations,
    manager::KubeManagerBuilder,
    readiness::GateTiming,
};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    Client,
    api::{Api, DeleteParams, ObjectMeta, PostParams},
};
use tokio_util::sync::CancellationToken;
use tracing::info_span;

#[test_log::test(tokio::test)]
#[ignore]
async fn direct_lookups_see_crds_and_missing_config_maps() {
    let client = Client::try_default().await.expect("kube client");
    let cluster = KubeCluster::new(client);
    assert!(cluster.crd_exists("taskruns.tekton.dev").await.unwrap());
    assert!(!cluster.crd_exists("nothing.example.com").await.unwrap());
    assert!(
        cluster
            .config_map_data("default", "jbs-it-does-not-exist")
            .await
            .unwrap()
            .is_none()
    );
}

#[test_log::test(tokio::test)]
#[ignore]
async fn bootstrap_against_live_cluster() {
    let config = kube::Config::infer().await.expect("kube config");
    let client = Client::try_from(config.clone()).expect("kube client");
    let ns = "default";
    let name = "jbs-it-system-config";

    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    let cm = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("maven-repository".to_string(), "https://repo".to_string())])),
        ..Default::default()
    };
    let _ = cm_api.delete(name, &DeleteParams::default()).await;
    cm_api.create(&PostParams::default(), &cm).await.expect("create config map");

    let settings = BootstrapSettings {
        system_config_namespace: ns.into(),
        system_config_name: name.into(),
        required_keys: vec!["maven-repository".into()],
        timing: GateTiming::new(Duration::from_secs(1), Duration::from_secs(10)).unwrap(),
        ..BootstrapSettings::default()
    };
    let mut orch = BootstrapOrchestrator::new(
        settings,
        info_span!("it_bootstrap"),
        CancellationToken::new(),
    );
    let manager = orch
        .run(
            &KubeCluster::new(client),
            &KubeManagerBuilder::new(config),
            registrations(),
        )
        .await
        .expect("bootstrap");
    assert_eq!(manager.runnable_names().len(), 4);

    let _ = cm_api.delete(name, &DeleteParams::default()).await;
}

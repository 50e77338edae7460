//! Unit tests for the Deployment and Service diff policy

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use middleware_operator::controller::{deployment_needs_update, service_needs_update};
use middleware_operator::crd::BackendType;
use middleware_operator::resources::ManifestRenderer;

use crate::common::*;

fn rendered(backend: BackendType) -> Deployment {
    ManifestRenderer::new()
        .render(&create_test_middleware("backend", backend))
        .unwrap()
}

fn container_mut<'a>(
    deployment: &'a mut Deployment,
    name: &str,
) -> &'a mut k8s_openapi::api::core::v1::Container {
    deployment
        .spec
        .as_mut()
        .unwrap()
        .template
        .spec
        .as_mut()
        .unwrap()
        .containers
        .iter_mut()
        .find(|c| c.name == name)
        .unwrap()
}

fn set_selector(deployment: &mut Deployment, selector: Option<BTreeMap<String, String>>) {
    deployment
        .spec
        .as_mut()
        .unwrap()
        .template
        .spec
        .as_mut()
        .unwrap()
        .node_selector = selector;
}

mod deployment_tests {
    use super::*;

    #[test]
    fn test_identical_render_needs_no_update() {
        for backend in BackendType::ALL {
            assert!(!deployment_needs_update(backend, &rendered(backend), &rendered(backend)));
        }
    }

    #[test]
    fn test_server_image_change_detected() {
        let desired = rendered(BackendType::Redis);
        let mut actual = desired.clone();
        container_mut(&mut actual, "redis-server").image = Some("redis:6.0".to_string());
        assert!(deployment_needs_update(BackendType::Redis, &actual, &desired));
    }

    #[test]
    fn test_server_resources_change_detected() {
        let desired = rendered(BackendType::Mysql);
        let mut actual = desired.clone();
        container_mut(&mut actual, "mysql-server")
            .resources
            .as_mut()
            .unwrap()
            .limits
            .as_mut()
            .unwrap()
            .insert("memory".to_string(), Quantity("64Gi".to_string()));
        assert!(deployment_needs_update(BackendType::Mysql, &actual, &desired));
    }

    #[test]
    fn test_sidecar_image_change_detected() {
        let desired = rendered(BackendType::Mongodb);
        let mut actual = desired.clone();
        container_mut(&mut actual, "mongodb-sidecar").image = Some("exporter:old".to_string());
        assert!(deployment_needs_update(BackendType::Mongodb, &actual, &desired));
    }

    #[test]
    fn test_sidecar_resources_ignored() {
        let desired = rendered(BackendType::Redis);
        let mut actual = desired.clone();
        container_mut(&mut actual, "redis-sidecar").resources = None;
        assert!(!deployment_needs_update(BackendType::Redis, &actual, &desired));
    }

    #[test]
    fn test_unrelated_fields_ignored() {
        let desired = rendered(BackendType::Kafka);
        let mut actual = desired.clone();
        actual.spec.as_mut().unwrap().replicas = Some(3);
        actual.metadata.resource_version = Some("42".to_string());
        container_mut(&mut actual, "kafka-server").env = None;
        assert!(!deployment_needs_update(BackendType::Kafka, &actual, &desired));
    }

    #[test]
    fn test_node_selector_compared_by_content() {
        let mut a = rendered(BackendType::Redis);
        let mut b = rendered(BackendType::Redis);

        let mut first = BTreeMap::new();
        first.insert("zone".to_string(), "a".to_string());
        first.insert("disk".to_string(), "ssd".to_string());
        let mut second = BTreeMap::new();
        second.insert("disk".to_string(), "ssd".to_string());
        second.insert("zone".to_string(), "a".to_string());

        set_selector(&mut a, Some(first));
        set_selector(&mut b, Some(second));
        assert!(!deployment_needs_update(BackendType::Redis, &a, &b));

        set_selector(&mut b, Some(BTreeMap::from([("zone".to_string(), "b".to_string())])));
        assert!(deployment_needs_update(BackendType::Redis, &a, &b));
    }

    #[test]
    fn test_missing_and_empty_node_selector_equal() {
        let mut a = rendered(BackendType::Mysql);
        let mut b = rendered(BackendType::Mysql);
        set_selector(&mut a, None);
        set_selector(&mut b, Some(BTreeMap::new()));
        assert!(!deployment_needs_update(BackendType::Mysql, &a, &b));
    }
}

mod service_tests {
    use super::*;

    fn rendered_service(external: bool) -> Service {
        let mut builder = MiddlewareBuilder::new("cache", TEST_NAMESPACE, BackendType::Redis);
        if external {
            builder = builder.with_external_exposure();
        }
        ManifestRenderer::new().render(&builder.build()).unwrap()
    }

    #[test]
    fn test_exposure_change_detected() {
        assert!(service_needs_update(&rendered_service(false), &rendered_service(true)));
        assert!(service_needs_update(&rendered_service(true), &rendered_service(false)));
    }

    #[test]
    fn test_other_fields_ignored() {
        let desired = rendered_service(false);
        let mut actual = desired.clone();
        let spec = actual.spec.as_mut().unwrap();
        spec.cluster_ip = Some("10.96.0.12".to_string());
        spec.ports.as_mut().unwrap()[0].port = 16379;
        assert!(!service_needs_update(&actual, &desired));
    }
}

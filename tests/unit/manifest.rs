//! Unit tests for manifest rendering

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::ResourceExt;
use middleware_operator::crd::BackendType;
use middleware_operator::resources::{INSTANCE_LABEL, ManifestRenderer, ResourceKind};

use crate::common::*;

fn containers(deployment: &Deployment) -> Vec<String> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(|p| p.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

fn template(path: &str) -> String {
    std::fs::read_to_string(format!("{}/templates/{}", env!("CARGO_MANIFEST_DIR"), path)).unwrap()
}

mod naming_tests {
    use super::*;

    #[test]
    fn test_rendered_names_are_fixed_per_type() {
        let renderer = ManifestRenderer::new();
        let mw = create_test_middleware("orders", BackendType::Mysql);

        assert_eq!(renderer.render::<ConfigMap>(&mw).unwrap().name_any(), "mysql-config");
        assert_eq!(renderer.render::<Secret>(&mw).unwrap().name_any(), "mysql-auth");
        assert_eq!(renderer.render::<Deployment>(&mw).unwrap().name_any(), "mysql-server");
        assert_eq!(renderer.render::<Service>(&mw).unwrap().name_any(), "mysql-server-svc");
    }

    #[test]
    fn test_owner_reference_and_labels_stamped() {
        let renderer = ManifestRenderer::new();
        let mw = create_test_middleware("cache", BackendType::Redis);
        let deployment = renderer.render::<Deployment>(&mw).unwrap();

        assert_eq!(deployment.namespace().as_deref(), Some(TEST_NAMESPACE));
        let owners = deployment.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Middleware");
        assert_eq!(owners[0].name, "cache");
        assert_eq!(owners[0].uid, TEST_UID);
        assert_eq!(owners[0].controller, Some(true));

        assert_eq!(deployment.labels().get(INSTANCE_LABEL).map(String::as_str), Some("cache"));
        // Template labels are kept next to the standard ones
        assert_eq!(deployment.labels().get("app").map(String::as_str), Some("redis"));
    }
}

mod content_tests {
    use super::*;

    #[test]
    fn test_secret_carries_credentials() {
        let renderer = ManifestRenderer::new();
        let mw = MiddlewareBuilder::new("mq", TEST_NAMESPACE, BackendType::Rabbitmq)
            .with_credentials("admin", "s3cr:t")
            .build();
        let secret = renderer.render::<Secret>(&mw).unwrap();
        let data = secret.data.unwrap();

        assert_eq!(data["rabbitmq_username"].0, b"admin");
        assert_eq!(data["rabbitmq_password"].0, b"s3cr:t");
    }

    #[test]
    fn test_node_selector_propagated() {
        let renderer = ManifestRenderer::new();
        let mw = MiddlewareBuilder::new("events", TEST_NAMESPACE, BackendType::Kafka)
            .with_node_selector("disktype", "ssd")
            .with_node_selector("zone", "eu-1")
            .build();
        let deployment = renderer.render::<Deployment>(&mw).unwrap();
        let selector = deployment
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .node_selector
            .unwrap();

        assert_eq!(selector.len(), 2);
        assert_eq!(selector["disktype"], "ssd");
        assert_eq!(selector["zone"], "eu-1");
    }

    #[test]
    fn test_empty_node_selector_omitted() {
        let renderer = ManifestRenderer::new();
        let mw = create_test_middleware("docs", BackendType::Mongodb);
        let deployment = renderer.render::<Deployment>(&mw).unwrap();
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert!(pod.node_selector.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_service_exposure_follows_spec() {
        let renderer = ManifestRenderer::new();

        let internal = create_test_middleware("cache", BackendType::Redis);
        let svc = renderer.render::<Service>(&internal).unwrap();
        assert_eq!(svc.spec.unwrap().type_.as_deref(), Some("ClusterIP"));

        let external = MiddlewareBuilder::new("cache", TEST_NAMESPACE, BackendType::Redis)
            .with_external_exposure()
            .build();
        let svc = renderer.render::<Service>(&external).unwrap();
        assert_eq!(svc.spec.unwrap().type_.as_deref(), Some("NodePort"));
    }

    #[test]
    fn test_sidecar_presence_matches_backend() {
        let renderer = ManifestRenderer::new();
        for backend in BackendType::ALL {
            let mw = create_test_middleware("backend", backend);
            let names = containers(&renderer.render::<Deployment>(&mw).unwrap());
            assert!(names.contains(&backend.server_container()), "{backend}");
            assert_eq!(
                names.contains(&backend.sidecar_container()),
                backend.has_sidecar(),
                "{backend}"
            );
        }
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_missing_template_is_configuration_error() {
        let renderer = ManifestRenderer::new();
        let mw = create_test_middleware("events", BackendType::Kafka);
        let err = renderer.render::<ConfigMap>(&mw).unwrap_err();
        assert!(err.is_configuration());
        assert!(!renderer.has_template(ResourceKind::ConfigMap, BackendType::Kafka));
    }

    #[test]
    fn test_wrong_name_is_configuration_error() {
        let source = template("redis/secret.yaml").replace("{{ names.auth }}", "cache-auth");
        let renderer = ManifestRenderer::from_sources([("redis/secret.yaml".to_string(), source)]);
        let mw = create_test_middleware("cache", BackendType::Redis);
        let err = renderer.render::<Secret>(&mw).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("redis-auth"));
    }

    #[test]
    fn test_deployment_without_server_container_rejected() {
        let source = template("redis/deployment.yaml").replace("- name: redis-server", "- name: cache");
        let renderer =
            ManifestRenderer::from_sources([("redis/deployment.yaml".to_string(), source)]);
        let mw = create_test_middleware("cache", BackendType::Redis);
        let err = renderer.render::<Deployment>(&mw).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_undefined_variable_rejected() {
        let renderer = ManifestRenderer::from_sources([(
            "redis/configmap.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ names.missing }}\n",
        )]);
        let mw = create_test_middleware("cache", BackendType::Redis);
        assert!(renderer.render::<ConfigMap>(&mw).unwrap_err().is_configuration());
    }

    #[test]
    fn test_broken_template_syntax_rejected() {
        let renderer =
            ManifestRenderer::from_sources([("redis/configmap.yaml", "kind: {% if %}")]);
        let mw = create_test_middleware("cache", BackendType::Redis);
        assert!(renderer.render::<ConfigMap>(&mw).unwrap_err().is_configuration());
    }

    #[test]
    fn test_missing_credential_key_rejected() {
        let source = template("redis/secret.yaml").replace("redis_prod_password", "password");
        let renderer = ManifestRenderer::from_sources([("redis/secret.yaml".to_string(), source)]);
        let mw = create_test_middleware("cache", BackendType::Redis);
        let err = renderer.render::<Secret>(&mw).unwrap_err();
        assert!(err.to_string().contains("redis_prod_password"));
    }
}

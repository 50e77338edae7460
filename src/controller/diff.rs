//! Diff policy for owned resources
//!
//! Decides whether an existing resource has drifted far enough from the
//! rendered one to be written again. Only the fields listed here are
//! compared; everything else the API server defaults or mutates is ignored.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements, Service};

use crate::crd::BackendType;

/// Check whether an existing Deployment must be replaced by the desired one.
///
/// True when any of:
/// - the pod node selector differs by content (absent and empty are equal)
/// - the `<type>-server` container image or resource requirements differ
/// - for backends with a sidecar, the `<type>-sidecar` container image differs
pub fn deployment_needs_update(
    backend: BackendType,
    actual: &Deployment,
    desired: &Deployment,
) -> bool {
    let actual_pod = pod_spec(actual);
    let desired_pod = pod_spec(desired);

    if node_selector(actual_pod) != node_selector(desired_pod) {
        return true;
    }

    let server = backend.server_container();
    let actual_server = container(actual_pod, &server);
    let desired_server = container(desired_pod, &server);
    if image(actual_server) != image(desired_server)
        || resources(actual_server) != resources(desired_server)
    {
        return true;
    }

    if backend.has_sidecar() {
        let sidecar = backend.sidecar_container();
        if image(container(actual_pod, &sidecar)) != image(container(desired_pod, &sidecar)) {
            return true;
        }
    }

    false
}

/// Check whether an existing Service must be updated.
///
/// Only the exposure mode (`spec.type`) is compared.
pub fn service_needs_update(actual: &Service, desired: &Service) -> bool {
    service_type(actual) != service_type(desired)
}

/// Exposure mode of a service, `None` when unset
pub fn service_type(service: &Service) -> Option<&str> {
    service.spec.as_ref().and_then(|s| s.type_.as_deref())
}

fn pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
}

fn node_selector(pod: Option<&PodSpec>) -> BTreeMap<String, String> {
    pod.and_then(|p| p.node_selector.clone()).unwrap_or_default()
}

fn container<'a>(pod: Option<&'a PodSpec>, name: &str) -> Option<&'a Container> {
    pod.and_then(|p| p.containers.iter().find(|c| c.name == name))
}

fn image(container: Option<&Container>) -> Option<&str> {
    container.and_then(|c| c.image.as_deref())
}

fn resources(container: Option<&Container>) -> ResourceRequirements {
    container
        .and_then(|c| c.resources.clone())
        .unwrap_or_default()
}

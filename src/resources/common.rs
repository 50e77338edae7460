//! Common utilities for Kubernetes resource generation
//!
//! This module provides shared functions and constants used by the manifest
//! renderer and the controller to keep naming, labels and ownership consistent.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use serde::Serialize;

use crate::crd::{BackendType, Middleware};

/// API version for Middleware CRD
pub const API_VERSION: &str = "middleware-operator.smoketurner.com/v1alpha1";

/// Kind for Middleware CRD
pub const KIND: &str = "Middleware";

/// Operator field manager name
pub const FIELD_MANAGER: &str = "middleware-operator";

/// Label carrying the owning Middleware name
pub const INSTANCE_LABEL: &str = "middleware-operator.smoketurner.com/instance";

/// The four resource kinds owned by every Middleware
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
    Deployment,
    Service,
}

impl ResourceKind {
    /// Template file stem for this kind
    pub fn template_stem(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
        }
    }

    /// Kubernetes kind name
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Fixed names of the resources owned by a Middleware of a given type
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceNames {
    pub config: String,
    pub auth: String,
    pub server: String,
    pub service: String,
}

impl ResourceNames {
    pub fn for_backend(backend: BackendType) -> Self {
        let t = backend.as_str();
        Self {
            config: format!("{t}-config"),
            auth: format!("{t}-auth"),
            server: format!("{t}-server"),
            service: format!("{t}-server-svc"),
        }
    }

    /// Name of the resource of the given kind
    pub fn get(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::ConfigMap => &self.config,
            ResourceKind::Secret => &self.auth,
            ResourceKind::Deployment => &self.server,
            ResourceKind::Service => &self.service,
        }
    }
}

/// Generate an owner reference for a Middleware
///
/// Owned resources are garbage collected when the Middleware is deleted, and
/// their watch events are routed back to the owning Middleware.
pub fn owner_reference(middleware: &Middleware) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: middleware.name_any(),
        uid: middleware.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate standard labels for all resources belonging to a Middleware
pub fn standard_labels(instance: &str, backend: BackendType) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            backend.as_str().to_string(),
        ),
        (
            "app.kubernetes.io/component".to_string(),
            "middleware".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (INSTANCE_LABEL.to_string(), instance.to_string()),
    ])
}

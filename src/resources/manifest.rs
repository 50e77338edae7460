//! Desired-state generation for Middleware owned resources
//!
//! Every (resource kind, backend type) pair has one YAML template embedded in
//! the binary. Rendering substitutes descriptor fields into the template,
//! parses the result into the typed Kubernetes resource and validates it
//! before the controller ever sees it. A template that is missing or produces
//! an invalid document is a configuration error, not a transient fault.

use std::borrow::Cow;
use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{Resource, ResourceExt};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::controller::error::{Error, Result};
use crate::crd::{BackendType, Middleware};
use crate::resources::common::{ResourceKind, ResourceNames, owner_reference, standard_labels};

/// Templates compiled into the operator, keyed by `<type>/<kind>.yaml`
const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    ("mysql/configmap.yaml", include_str!("../../templates/mysql/configmap.yaml")),
    ("mysql/secret.yaml", include_str!("../../templates/mysql/secret.yaml")),
    ("mysql/deployment.yaml", include_str!("../../templates/mysql/deployment.yaml")),
    ("mysql/service.yaml", include_str!("../../templates/mysql/service.yaml")),
    ("redis/configmap.yaml", include_str!("../../templates/redis/configmap.yaml")),
    ("redis/secret.yaml", include_str!("../../templates/redis/secret.yaml")),
    ("redis/deployment.yaml", include_str!("../../templates/redis/deployment.yaml")),
    ("redis/service.yaml", include_str!("../../templates/redis/service.yaml")),
    ("rabbitmq/configmap.yaml", include_str!("../../templates/rabbitmq/configmap.yaml")),
    ("rabbitmq/secret.yaml", include_str!("../../templates/rabbitmq/secret.yaml")),
    ("rabbitmq/deployment.yaml", include_str!("../../templates/rabbitmq/deployment.yaml")),
    ("rabbitmq/service.yaml", include_str!("../../templates/rabbitmq/service.yaml")),
    ("kafka/secret.yaml", include_str!("../../templates/kafka/secret.yaml")),
    ("kafka/deployment.yaml", include_str!("../../templates/kafka/deployment.yaml")),
    ("kafka/service.yaml", include_str!("../../templates/kafka/service.yaml")),
    ("mongodb/secret.yaml", include_str!("../../templates/mongodb/secret.yaml")),
    ("mongodb/deployment.yaml", include_str!("../../templates/mongodb/deployment.yaml")),
    ("mongodb/service.yaml", include_str!("../../templates/mongodb/service.yaml")),
];

/// A Kubernetes resource kind the renderer can produce
pub trait OwnedResource:
    Resource<DynamicType = ()> + DeserializeOwned + Clone + std::fmt::Debug
{
    const KIND: ResourceKind;

    /// Kind-specific structural checks on a freshly parsed document
    fn check(&self, _backend: BackendType) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl OwnedResource for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;
}

impl OwnedResource for Secret {
    const KIND: ResourceKind = ResourceKind::Secret;

    fn check(&self, backend: BackendType) -> std::result::Result<(), String> {
        let (user_key, pass_key) = backend.credential_keys();
        let data = self.data.as_ref().ok_or("secret has no data")?;
        for key in [user_key, pass_key] {
            if !data.contains_key(key) {
                return Err(format!("secret is missing key {key}"));
            }
        }
        Ok(())
    }
}

impl OwnedResource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;

    fn check(&self, backend: BackendType) -> std::result::Result<(), String> {
        let containers = self
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|p| p.containers.as_slice())
            .unwrap_or_default();

        let server = backend.server_container();
        if !containers.iter().any(|c| c.name == server) {
            return Err(format!("deployment has no {server} container"));
        }
        Ok(())
    }
}

impl OwnedResource for Service {
    const KIND: ResourceKind = ResourceKind::Service;

    fn check(&self, _backend: BackendType) -> std::result::Result<(), String> {
        match self.spec.as_ref().and_then(|s| s.type_.as_deref()) {
            Some("ClusterIP") | Some("NodePort") => Ok(()),
            other => Err(format!("unsupported service type {other:?}")),
        }
    }
}

/// Descriptor fields exposed to templates
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSpec<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    node_selector: &'a BTreeMap<String, String>,
    login_user: &'a str,
    login_pass: &'a str,
    enable_external_exposure: bool,
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    name: String,
    namespace: &'a str,
    names: ResourceNames,
    spec: TemplateSpec<'a>,
}

fn b64enc(value: String) -> String {
    STANDARD.encode(value)
}

/// Renders owned resources from the template set.
///
/// Built once at startup and shared through the controller context.
pub struct ManifestRenderer {
    env: Environment<'static>,
}

impl Default for ManifestRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestRenderer {
    /// Renderer over the templates embedded in the binary
    pub fn new() -> Self {
        Self::from_sources(
            EMBEDDED_TEMPLATES
                .iter()
                .map(|(name, source)| (Cow::Borrowed(*name), Cow::Borrowed(*source))),
        )
    }

    /// Renderer over an explicit template set.
    ///
    /// A template that fails to compile is left out and reported when the
    /// corresponding resource is rendered.
    pub fn from_sources<I, N, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<Cow<'static, str>>,
        S: Into<Cow<'static, str>>,
    {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("b64enc", b64enc);

        for (name, source) in sources {
            let name = name.into();
            if let Err(e) = env.add_template_owned(name.clone(), source.into()) {
                error!(template = %name, "Failed to compile manifest template: {}", e);
            }
        }

        Self { env }
    }

    /// Check whether a template exists for the (kind, backend) pair
    pub fn has_template(&self, kind: ResourceKind, backend: BackendType) -> bool {
        self.env.get_template(&template_name(kind, backend)).is_ok()
    }

    /// Render, parse and validate the desired resource of kind `K`
    pub fn render<K: OwnedResource>(&self, middleware: &Middleware) -> Result<K> {
        let backend = middleware.spec.type_;
        let kind = K::KIND;
        let names = ResourceNames::for_backend(backend);
        let expected_name = names.get(kind).to_string();
        let ns = middleware
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

        let template = self
            .env
            .get_template(&template_name(kind, backend))
            .map_err(|e| Error::configuration(backend, kind, e.to_string()))?;

        let ctx = TemplateContext {
            name: middleware.name_any(),
            namespace: &ns,
            names,
            spec: TemplateSpec {
                type_: backend.as_str(),
                node_selector: &middleware.spec.node_selector,
                login_user: &middleware.spec.login_user,
                login_pass: &middleware.spec.login_pass,
                enable_external_exposure: middleware.spec.enable_external_exposure,
            },
        };

        let rendered = template
            .render(&ctx)
            .map_err(|e| Error::configuration(backend, kind, format!("render failed: {e}")))?;

        let mut resource = parse_document::<K>(&rendered)
            .map_err(|reason| Error::configuration(backend, kind, reason))?;

        if resource.meta().name.as_deref() != Some(expected_name.as_str()) {
            return Err(Error::configuration(
                backend,
                kind,
                format!(
                    "rendered name {:?} does not match {}",
                    resource.meta().name,
                    expected_name
                ),
            ));
        }

        resource
            .check(backend)
            .map_err(|reason| Error::configuration(backend, kind, reason))?;

        let meta = resource.meta_mut();
        meta.namespace = Some(ns);
        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .extend(standard_labels(&middleware.name_any(), backend));
        meta.owner_references = Some(vec![owner_reference(middleware)]);

        debug!(kind = %kind, name = %expected_name, "Rendered desired resource");
        Ok(resource)
    }
}

fn template_name(kind: ResourceKind, backend: BackendType) -> String {
    format!("{}/{}.yaml", backend.as_str(), kind.template_stem())
}

/// Parse a single rendered YAML document into `K`, checking its kind first
fn parse_document<K: OwnedResource>(rendered: &str) -> std::result::Result<K, String> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(rendered).map_err(|e| format!("rendered document is not YAML: {e}"))?;

    let kind = value.get("kind").and_then(|k| k.as_str());
    if kind != Some(K::kind(&()).as_ref()) {
        return Err(format!(
            "rendered document has kind {:?}, expected {}",
            kind,
            K::kind(&())
        ));
    }

    serde_yaml::from_value(value).map_err(|e| format!("rendered document does not match schema: {e}"))
}

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Middleware is the Schema for the middlewares API
///
/// One Middleware describes one managed backend instance. The operator owns a
/// ConfigMap, a Secret, a Deployment and a Service for it, all named after the
/// backend type.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "middleware-operator.smoketurner.com",
    version = "v1alpha1",
    kind = "Middleware",
    plural = "middlewares",
    shortname = "mw",
    namespaced,
    status = "MiddlewareStatus",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"External", "type":"boolean", "jsonPath":".spec.enableExternalExposure"}"#,
    printcolumn = r#"{"name":"Validated", "type":"boolean", "jsonPath":".status.isValidate"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareSpec {
    /// Backend type, fixes the names of every owned resource
    #[serde(rename = "type")]
    pub type_: BackendType,

    /// Node selector applied to the backend pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Login user seeded into the credentials Secret
    pub login_user: String,

    /// Login password seeded into the credentials Secret
    pub login_pass: String,

    /// Expose the backend outside the cluster through a NodePort service
    #[serde(default, alias = "enableNodePort")]
    pub enable_external_exposure: bool,
}

/// Supported middleware backends
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// MySQL relational database
    Mysql,
    /// Redis in-memory cache
    Redis,
    /// RabbitMQ message broker
    Rabbitmq,
    /// Kafka stream platform
    Kafka,
    /// MongoDB document database
    Mongodb,
}

impl BackendType {
    pub const ALL: [BackendType; 5] = [
        BackendType::Mysql,
        BackendType::Redis,
        BackendType::Rabbitmq,
        BackendType::Kafka,
        BackendType::Mongodb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Mysql => "mysql",
            BackendType::Redis => "redis",
            BackendType::Rabbitmq => "rabbitmq",
            BackendType::Kafka => "kafka",
            BackendType::Mongodb => "mongodb",
        }
    }

    /// Whether the backend is configured through a ConfigMap
    pub fn has_config_surface(&self) -> bool {
        match self {
            BackendType::Mysql | BackendType::Redis | BackendType::Rabbitmq => true,
            BackendType::Kafka | BackendType::Mongodb => false,
        }
    }

    /// Whether the backend pod runs a `<type>-sidecar` exporter container
    pub fn has_sidecar(&self) -> bool {
        match self {
            BackendType::Rabbitmq => false,
            BackendType::Mysql | BackendType::Redis | BackendType::Kafka | BackendType::Mongodb => {
                true
            }
        }
    }

    /// Port the backend listens on behind its service
    pub fn default_port(&self) -> u16 {
        match self {
            BackendType::Mysql => 3306,
            BackendType::Redis => 6379,
            BackendType::Rabbitmq => 5672,
            BackendType::Kafka => 9092,
            BackendType::Mongodb => 27017,
        }
    }

    /// Secret data keys holding the login user and password
    pub fn credential_keys(&self) -> (&'static str, &'static str) {
        match self {
            BackendType::Mysql => ("mysql_prod_username", "mysql_prod_password"),
            BackendType::Redis => ("redis_prod_username", "redis_prod_password"),
            BackendType::Rabbitmq => ("rabbitmq_username", "rabbitmq_password"),
            BackendType::Kafka => ("kafka_username", "kafka_password"),
            BackendType::Mongodb => ("mongodb_root_user", "mongodb_root_pass"),
        }
    }

    /// Name of the primary backend container
    pub fn server_container(&self) -> String {
        format!("{}-server", self.as_str())
    }

    /// Name of the sidecar container
    pub fn sidecar_container(&self) -> String {
        format!("{}-sidecar", self.as_str())
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the Middleware
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareStatus {
    /// Result of the last backend health probe.
    /// Unset until the first reconciliation, `false` until the first probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_validate: Option<bool>,

    /// Error reported by the last failed probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_error: Option<String>,

    /// Time of the last probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<String>,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

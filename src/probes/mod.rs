//! Backend health probes
//!
//! After the owned resources exist, the controller validates that the backend
//! answers on its service with the provisioned credentials. Each backend type
//! maps to at most one [`HealthProbe`]; types without one are considered
//! valid.

mod mysql;
mod rabbitmq;
mod redis;

pub use mysql::MysqlProbe;
pub use rabbitmq::RabbitmqProbe;
pub use redis::RedisProbe;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::ResourceExt;
use thiserror::Error;
use tracing::debug;

use crate::crd::BackendType;

/// Default upper bound on a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Slack given to a probe past its own timeout before the registry cancels it
const BACKSTOP_GRACE: Duration = Duration::from_secs(1);

/// Upper bound on closing a probe connection
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors reported by a failed health probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

/// Connection parameters for one probe
#[derive(Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

// Keep the password out of logs
impl std::fmt::Debug for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ProbeTarget {
    /// Derive the target from the backend service and credentials secret.
    ///
    /// The host is `<service>.<namespace>`; credentials come from the
    /// backend-specific secret keys.
    pub fn from_resources(
        backend: BackendType,
        service: &Service,
        secret: &Secret,
    ) -> Result<Self, ProbeError> {
        let namespace = service
            .namespace()
            .ok_or_else(|| ProbeError::Connect("service has no namespace".to_string()))?;
        let (user_key, pass_key) = backend.credential_keys();

        Ok(Self {
            host: format!("{}.{}", service.name_any(), namespace),
            port: backend.default_port(),
            username: secret_value(secret, user_key)?,
            password: secret_value(secret, pass_key)?,
        })
    }
}

fn secret_value(secret: &Secret, key: &str) -> Result<String, ProbeError> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| ProbeError::Credentials(format!("secret has no key {key}")))?;

    String::from_utf8(bytes.0.clone())
        .map_err(|_| ProbeError::Credentials(format!("secret key {key} is not valid UTF-8")))
}

/// A connectivity check for one backend protocol
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Open a short-lived connection and perform a liveness exchange.
    ///
    /// Must release the connection before returning and finish within `timeout`.
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> Result<bool, ProbeError>;
}

/// Result of validating one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub valid: bool,
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn failed(error: ProbeError) -> Self {
        Self {
            valid: false,
            error: Some(error),
        }
    }
}

/// Dispatch table from backend type to health probe
///
/// Built once at startup and shared through the controller context.
#[derive(Clone)]
pub struct ProbeRegistry {
    mysql: Option<Arc<dyn HealthProbe>>,
    redis: Option<Arc<dyn HealthProbe>>,
    rabbitmq: Option<Arc<dyn HealthProbe>>,
    kafka: Option<Arc<dyn HealthProbe>>,
    mongodb: Option<Arc<dyn HealthProbe>>,
    timeout: Duration,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl ProbeRegistry {
    /// Registry with the built-in probes for mysql, redis and rabbitmq.
    /// Kafka and mongodb have no probe and always validate.
    pub fn new(timeout: Duration) -> Self {
        Self::empty(timeout)
            .with_probe(BackendType::Mysql, Arc::new(MysqlProbe))
            .with_probe(BackendType::Redis, Arc::new(RedisProbe))
            .with_probe(BackendType::Rabbitmq, Arc::new(RabbitmqProbe))
    }

    /// Registry without any probe
    pub fn empty(timeout: Duration) -> Self {
        Self {
            mysql: None,
            redis: None,
            rabbitmq: None,
            kafka: None,
            mongodb: None,
            timeout,
        }
    }

    /// Register (or replace) the probe for a backend type
    pub fn with_probe(mut self, backend: BackendType, probe: Arc<dyn HealthProbe>) -> Self {
        *self.slot_mut(backend) = Some(probe);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe registered for the backend type, if any
    pub fn probe_for(&self, backend: BackendType) -> Option<&Arc<dyn HealthProbe>> {
        match backend {
            BackendType::Mysql => self.mysql.as_ref(),
            BackendType::Redis => self.redis.as_ref(),
            BackendType::Rabbitmq => self.rabbitmq.as_ref(),
            BackendType::Kafka => self.kafka.as_ref(),
            BackendType::Mongodb => self.mongodb.as_ref(),
        }
    }

    fn slot_mut(&mut self, backend: BackendType) -> &mut Option<Arc<dyn HealthProbe>> {
        match backend {
            BackendType::Mysql => &mut self.mysql,
            BackendType::Redis => &mut self.redis,
            BackendType::Rabbitmq => &mut self.rabbitmq,
            BackendType::Kafka => &mut self.kafka,
            BackendType::Mongodb => &mut self.mongodb,
        }
    }

    /// Validate a backend through its service and credentials secret.
    ///
    /// Never fails: probe errors are reported in the outcome.
    pub async fn validate(
        &self,
        backend: BackendType,
        service: &Service,
        secret: Option<&Secret>,
    ) -> ProbeOutcome {
        let Some(probe) = self.probe_for(backend) else {
            debug!(backend = %backend, "No health probe registered, treating as valid");
            return ProbeOutcome::valid();
        };

        let Some(secret) = secret else {
            return ProbeOutcome::failed(ProbeError::Credentials(
                "credentials secret not available".to_string(),
            ));
        };

        let target = match ProbeTarget::from_resources(backend, service, secret) {
            Ok(target) => target,
            Err(e) => return ProbeOutcome::failed(e),
        };

        debug!(backend = %backend, target = ?target, "Probing backend");

        let backstop = self.timeout + BACKSTOP_GRACE;
        match tokio::time::timeout(backstop, probe.probe(&target, self.timeout)).await {
            Ok(Ok(true)) => ProbeOutcome::valid(),
            Ok(Ok(false)) => ProbeOutcome::failed(ProbeError::Protocol(format!(
                "{backend} did not confirm liveness"
            ))),
            Ok(Err(e)) => ProbeOutcome::failed(e),
            Err(_) => ProbeOutcome::failed(ProbeError::Timeout(self.timeout)),
        }
    }
}

//! Operator configuration loaded from the environment

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HEALTH_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings of the operator process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Restrict all watches to this namespace, cluster-wide when unset
    pub watch_namespace: Option<String>,
    /// Upper bound on a single backend health probe
    pub probe_timeout: Duration,
    /// Delay before a successfully reconciled Middleware is revisited
    pub requeue_interval: Duration,
    /// Bind address of the health and metrics server
    pub health_bind_addr: SocketAddr,
    /// Identity used for leader election
    pub pod_name: Option<String>,
    /// Namespace holding the leader election lease
    pub pod_namespace: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS),
            health_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            pod_name: None,
            pod_namespace: None,
        }
    }
}

impl OperatorConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let probe_timeout = seconds(
            "PROBE_TIMEOUT_SECS",
            non_empty("PROBE_TIMEOUT_SECS"),
            DEFAULT_PROBE_TIMEOUT_SECS,
        )?;
        let requeue_interval = seconds(
            "REQUEUE_INTERVAL_SECS",
            non_empty("REQUEUE_INTERVAL_SECS"),
            DEFAULT_REQUEUE_INTERVAL_SECS,
        )?;

        let bind = non_empty("HEALTH_BIND_ADDR").unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDR.to_string());
        let health_bind_addr = bind.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue {
                var: "HEALTH_BIND_ADDR",
                value: bind.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            probe_timeout,
            requeue_interval,
            health_bind_addr,
            pod_name: non_empty("POD_NAME"),
            pod_namespace: non_empty("POD_NAMESPACE"),
        })
    }
}

fn seconds(var: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            var,
            value,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::InvalidValue {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

//! MySQL liveness probe

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use sqlx_core::connection::{ConnectOptions, Connection};
use sqlx_core::error::Error as SqlxError;
use sqlx_mysql::MySqlConnectOptions;
use tracing::warn;

use super::{CLOSE_TIMEOUT, HealthProbe, ProbeError, ProbeTarget};

/// SQLSTATE for an access-denied login
const ACCESS_DENIED: &str = "28000";

/// Connects to the `mysql` system database and issues a ping
pub struct MysqlProbe;

#[async_trait]
impl HealthProbe for MysqlProbe {
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> Result<bool, ProbeError> {
        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.username)
            .password(&target.password)
            .database("mysql");

        let deadline = Instant::now() + timeout;

        // Dropping a pending connect closes its socket
        let mut conn = tokio::time::timeout_at(deadline, options.connect())
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
            .map_err(classify)?;

        let ping = match tokio::time::timeout_at(deadline, conn.ping()).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(host = %target.host, "Failed to close MySQL probe connection: {}", e),
            Err(_) => warn!(host = %target.host, "Timed out closing MySQL probe connection"),
        }

        ping.map(|()| true)
    }
}

fn classify(err: SqlxError) -> ProbeError {
    match &err {
        SqlxError::Database(db) if db.code().as_deref() == Some(ACCESS_DENIED) => {
            ProbeError::Authentication(db.message().to_string())
        }
        SqlxError::Io(_) | SqlxError::Tls(_) | SqlxError::PoolTimedOut => {
            ProbeError::Connect(err.to_string())
        }
        _ => ProbeError::Protocol(err.to_string()),
    }
}

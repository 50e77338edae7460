//! RabbitMQ liveness probe

use std::time::Duration;

use async_trait::async_trait;
use lapin::{Connection, ConnectionProperties};
use tracing::warn;
use url::Url;

use super::{CLOSE_TIMEOUT, HealthProbe, ProbeError, ProbeTarget};

/// Opens an AMQP connection on the default vhost and closes it again
pub struct RabbitmqProbe;

impl RabbitmqProbe {
    fn amqp_uri(target: &ProbeTarget) -> Result<String, ProbeError> {
        let mut url = Url::parse(&format!("amqp://{}:{}/%2f", target.host, target.port))
            .map_err(|e| ProbeError::Connect(format!("invalid amqp address: {e}")))?;
        url.set_username(&target.username)
            .and_then(|()| url.set_password(Some(&target.password)))
            .map_err(|()| ProbeError::Credentials("credentials cannot be encoded".to_string()))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl HealthProbe for RabbitmqProbe {
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> Result<bool, ProbeError> {
        let uri = Self::amqp_uri(target)?;
        let host = target.host.clone();

        // lapin keeps its I/O loop running when a pending connect is dropped,
        // so the handshake runs on its own task and is always closed.
        let mut connect =
            tokio::spawn(async move { Connection::connect(&uri, ConnectionProperties::default()).await });

        let conn = match tokio::time::timeout(timeout, &mut connect).await {
            Ok(joined) => joined
                .map_err(|e| ProbeError::Protocol(format!("amqp handshake aborted: {e}")))?
                .map_err(classify)?,
            Err(_) => {
                tokio::spawn(async move {
                    if let Ok(Ok(conn)) = connect.await {
                        close(conn, &host).await;
                    }
                });
                return Err(ProbeError::Timeout(timeout));
            }
        };

        let connected = conn.status().connected();
        close(conn, &host).await;
        Ok(connected)
    }
}

async fn close(conn: Connection, host: &str) {
    match tokio::time::timeout(CLOSE_TIMEOUT, conn.close(200, "probe complete")).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(host = %host, "Failed to close AMQP probe connection: {}", e),
        Err(_) => warn!(host = %host, "Timed out closing AMQP probe connection"),
    }
}

fn classify(err: lapin::Error) -> ProbeError {
    let message = err.to_string();
    match err {
        lapin::Error::IOError(_) => ProbeError::Connect(message),
        _ if message.contains("ACCESS_REFUSED") || message.contains("authentication") => {
            ProbeError::Authentication(message)
        }
        _ => ProbeError::Protocol(message),
    }
}

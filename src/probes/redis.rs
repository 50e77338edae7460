//! Redis liveness probe

use std::time::Duration;

use async_trait::async_trait;
use redis::{ErrorKind, RedisError};
use url::Url;

use super::{HealthProbe, ProbeError, ProbeTarget};

/// Authenticates with the provisioned ACL user and expects `PONG`
pub struct RedisProbe;

impl RedisProbe {
    fn connection_url(target: &ProbeTarget) -> Result<Url, ProbeError> {
        let mut url = Url::parse(&format!("redis://{}:{}/0", target.host, target.port))
            .map_err(|e| ProbeError::Connect(format!("invalid redis address: {e}")))?;
        url.set_username(&target.username)
            .and_then(|()| url.set_password(Some(&target.password)))
            .map_err(|()| ProbeError::Credentials("credentials cannot be encoded".to_string()))?;
        Ok(url)
    }
}

#[async_trait]
impl HealthProbe for RedisProbe {
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> Result<bool, ProbeError> {
        let url = Self::connection_url(target)?;
        let client = redis::Client::open(url.as_str()).map_err(classify)?;

        let ping = async {
            let mut conn = client
                .get_multiplexed_async_connection_with_timeouts(timeout, timeout)
                .await
                .map_err(classify)?;

            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok::<_, ProbeError>(pong == "PONG")
        };

        // The connection driver stops once `conn` drops, on every exit path
        tokio::time::timeout(timeout, ping)
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }
}

fn classify(err: RedisError) -> ProbeError {
    match err.kind() {
        ErrorKind::AuthenticationFailed => ProbeError::Authentication(err.to_string()),
        ErrorKind::IoError | ErrorKind::InvalidClientConfig => ProbeError::Connect(err.to_string()),
        _ if err.is_connection_refusal() || err.is_timeout() => ProbeError::Connect(err.to_string()),
        _ => ProbeError::Protocol(err.to_string()),
    }
}

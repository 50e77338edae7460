use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kube::Client;

use crate::config::OperatorConfig;
use crate::controller::error::BackoffConfig;
use crate::controller::store::KubeStore;
use crate::health::HealthState;
use crate::probes::ProbeRegistry;
use crate::resources::ManifestRenderer;

/// Shared context for the controller
pub struct Context<S> {
    /// Backing resource store
    pub store: S,
    /// Desired-state generator
    pub manifests: ManifestRenderer,
    /// Health probes by backend type
    pub probes: ProbeRegistry,
    pub config: OperatorConfig,
    /// Metrics sink, absent in tests
    pub health_state: Option<Arc<HealthState>>,
    /// Retry delays for failed passes
    pub backoff: BackoffConfig,
    /// Consecutive failed passes per `namespace/name`
    retries: Mutex<HashMap<String, u32>>,
}

impl<S> Context<S> {
    pub fn new(
        store: S,
        manifests: ManifestRenderer,
        probes: ProbeRegistry,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            store,
            manifests,
            probes,
            config,
            health_state,
            backoff: BackoffConfig::default(),
            retries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed pass and return how many failures preceded it
    pub fn next_retry_attempt(&self, key: &str) -> u32 {
        let mut retries = self.retries.lock().unwrap_or_else(|e| e.into_inner());
        let attempts = retries.entry(key.to_string()).or_insert(0);
        let attempt = *attempts;
        *attempts = attempts.saturating_add(1);
        attempt
    }

    /// Forget past failures after a successful pass
    pub fn reset_retries(&self, key: &str) {
        self.retries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

impl Context<KubeStore> {
    /// Context over the API server with the embedded templates and built-in probes
    pub fn from_client(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let probes = ProbeRegistry::new(config.probe_timeout);
        Self::new(
            KubeStore::new(client),
            ManifestRenderer::new(),
            probes,
            config,
            health_state,
        )
    }
}

//! Test fixtures and builders for Middleware resources
//!
//! ```rust,ignore
//! let mw = MiddlewareBuilder::new("cache", "apps", BackendType::Redis)
//!     .with_node_selector("zone", "a")
//!     .with_external_exposure()
//!     .build();
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kube::core::ObjectMeta;
use middleware_operator::config::OperatorConfig;
use middleware_operator::controller::Context;
use middleware_operator::crd::{BackendType, Middleware, MiddlewareSpec, MiddlewareStatus};
use middleware_operator::probes::{HealthProbe, ProbeError, ProbeRegistry, ProbeTarget};
use middleware_operator::resources::ManifestRenderer;

use super::MockStore;

pub const TEST_NAMESPACE: &str = "apps";
pub const TEST_UID: &str = "test-uid-12345";

/// Builder for Middleware test fixtures
pub struct MiddlewareBuilder {
    name: String,
    namespace: String,
    generation: Option<i64>,
    spec: MiddlewareSpec,
    status: Option<MiddlewareStatus>,
}

impl MiddlewareBuilder {
    pub fn new(name: &str, namespace: &str, backend: BackendType) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            generation: Some(1),
            spec: MiddlewareSpec {
                type_: backend,
                node_selector: BTreeMap::new(),
                login_user: "prod".to_string(),
                login_pass: "prod123456".to_string(),
                enable_external_exposure: false,
            },
            status: None,
        }
    }

    pub fn with_node_selector(mut self, key: &str, value: &str) -> Self {
        self.spec
            .node_selector
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_credentials(mut self, user: &str, pass: &str) -> Self {
        self.spec.login_user = user.to_string();
        self.spec.login_pass = pass.to_string();
        self
    }

    pub fn with_external_exposure(mut self) -> Self {
        self.spec.enable_external_exposure = true;
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Mark the descriptor as already through its first pass
    pub fn initialized(mut self) -> Self {
        self.status = Some(MiddlewareStatus {
            is_validate: Some(false),
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> Middleware {
        Middleware {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                uid: Some(TEST_UID.to_string()),
                generation: self.generation,
                ..Default::default()
            },
            spec: self.spec,
            status: self.status,
        }
    }
}

/// Convenience for the common case
pub fn create_test_middleware(name: &str, backend: BackendType) -> Middleware {
    MiddlewareBuilder::new(name, TEST_NAMESPACE, backend).build()
}

/// Probe returning a fixed result and recording every target it was asked to probe
pub struct FakeProbe {
    result: Result<bool, ProbeError>,
    calls: AtomicUsize,
    targets: Mutex<Vec<ProbeTarget>>,
}

impl FakeProbe {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::returning(Ok(true)))
    }

    pub fn failing(error: ProbeError) -> Arc<Self> {
        Arc::new(Self::returning(Err(error)))
    }

    fn returning(result: Result<bool, ProbeError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<ProbeTarget> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self, target: &ProbeTarget, _timeout: Duration) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.clone());
        self.result.clone()
    }
}

/// Registry with `probe` registered for `backend` only
pub fn registry_with(backend: BackendType, probe: Arc<FakeProbe>) -> ProbeRegistry {
    ProbeRegistry::empty(Duration::from_secs(1)).with_probe(backend, probe)
}

/// Controller context over the in-memory store with the embedded templates
pub fn test_context(store: MockStore, probes: ProbeRegistry) -> Context<MockStore> {
    Context::new(
        store,
        ManifestRenderer::new(),
        probes,
        OperatorConfig::default(),
        None,
    )
}

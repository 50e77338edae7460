//! Liveness, readiness and Prometheus metrics endpoints

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::crd::BackendType;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MiddlewareLabels {
    pub namespace: String,
    pub name: String,
}

impl MiddlewareLabels {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Verdict {
    valid,
    invalid,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub backend: String,
    pub outcome: Verdict,
}

/// Operator metrics, registered under the `middleware_operator` prefix
pub struct Metrics {
    pub reconciliations: Family<MiddlewareLabels, Counter>,
    pub reconciliation_errors: Family<MiddlewareLabels, Counter>,
    pub reconcile_duration: Family<MiddlewareLabels, Histogram>,
    pub probe_results: Family<BackendLabels, Counter>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("middleware_operator");

        let reconciliations = Family::default();
        registry.register(
            "reconciliations",
            "Completed reconciliation passes",
            reconciliations.clone(),
        );

        let reconciliation_errors = Family::default();
        registry.register(
            "reconciliation_errors",
            "Reconciliation passes that returned an error",
            reconciliation_errors.clone(),
        );

        let reconcile_duration =
            Family::<MiddlewareLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.005, 2.0, 12))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Wall time of a reconciliation pass",
            reconcile_duration.clone(),
        );

        let probe_results = Family::default();
        registry.register(
            "probe_results",
            "Backend health checks by backend type and verdict",
            probe_results.clone(),
        );

        Self {
            reconciliations,
            reconciliation_errors,
            reconcile_duration,
            probe_results,
            registry,
        }
    }

    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = MiddlewareLabels::new(namespace, name);
        self.reconciliations.get_or_create(&labels).inc();
        self.reconcile_duration
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors
            .get_or_create(&MiddlewareLabels::new(namespace, name))
            .inc();
    }

    pub fn record_probe(&self, backend: BackendType, valid: bool) {
        let labels = BackendLabels {
            backend: backend.as_str().to_string(),
            outcome: if valid { Verdict::valid } else { Verdict::invalid },
        };
        self.probe_results.get_or_create(&labels).inc();
    }

    fn render(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

/// State shared between the controller and the HTTP endpoints
#[derive(Default)]
pub struct HealthState {
    ready: AtomicBool,
    pub metrics: Metrics,
    /// Unix time of the last successful pass, zero before the first one
    pub last_reconcile: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn touch_reconcile(&self) {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.last_reconcile.store(now, Ordering::Relaxed);
    }
}

async fn readyz(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                String::new(),
            )
        }
    }
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the endpoints on `addr` until the listener fails
pub async fn run_health_server(state: Arc<HealthState>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Health server listening on {}", addr);
    axum::serve(listener, router(state)).await
}

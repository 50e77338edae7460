//! Reconciliation logic for Middleware resources
//!
//! One pass walks the four owned kinds in a fixed order (ConfigMap, Secret,
//! Deployment, Service), creating what is missing and rolling drifted
//! Deployments and Services to their desired state, then writes the health
//! verdict back to the Middleware status.
//!
//! A configuration error (missing or broken template) only skips its own
//! step. Store failures abort the pass.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::diff::{deployment_needs_update, service_needs_update, service_type};
use crate::controller::error::{Error, Result};
use crate::controller::status::{self, initial_status, probe_status};
use crate::controller::store::{ObjectStore, ResourceStore, StatusStore};
use crate::crd::{BackendType, Middleware};
use crate::probes::{ProbeError, ProbeOutcome};
use crate::resources::ResourceNames;

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The Middleware no longer exists
    Gone,
    /// First pass: resources provisioned, verdict initialized to `false`
    Initialized,
    /// Resources reconciled and the backend probed
    Validated(ProbeOutcome),
}

/// Main reconciliation function
#[instrument(skip(middleware, ctx), fields(name = %middleware.name_any(), namespace = middleware.namespace().unwrap_or_default()))]
pub async fn reconcile<S: ResourceStore>(
    middleware: Arc<Middleware>,
    ctx: Arc<Context<S>>,
) -> Result<Action> {
    let ns = middleware
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = middleware.name_any();

    if status::spec_changed(&middleware) {
        info!(
            "Spec changed (generation: {:?} -> {:?})",
            middleware.status.as_ref().and_then(|s| s.observed_generation),
            middleware.metadata.generation
        );
    }

    let start = Instant::now();
    let result = reconcile_middleware(&ns, &name, &ctx).await;

    if let Some(state) = &ctx.health_state {
        match &result {
            Ok(_) => {
                state
                    .metrics
                    .record_reconcile(&ns, &name, start.elapsed().as_secs_f64());
                state.touch_reconcile();
            }
            Err(_) => state.metrics.record_error(&ns, &name),
        }
    }

    if result.is_ok() {
        ctx.reset_retries(&retry_key(&ns, &name));
    }

    match result {
        Ok(PassOutcome::Gone) => {
            debug!("Middleware no longer exists");
            Ok(Action::await_change())
        }
        Ok(_) => {
            debug!("Reconciliation completed successfully");
            Ok(Action::requeue(ctx.config.requeue_interval))
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            Err(e)
        }
    }
}

/// Error policy for the controller
///
/// Configuration errors wait for the next change to the Middleware; store
/// failures are retried with backoff.
pub fn error_policy<S>(middleware: Arc<Middleware>, error: &Error, ctx: Arc<Context<S>>) -> Action {
    let name = middleware.name_any();
    let key = retry_key(&middleware.namespace().unwrap_or_default(), &name);

    if error.is_configuration() {
        error!(
            "Configuration error for {}: {}, waiting for a change",
            name, error
        );
        return Action::await_change();
    }

    let attempt = ctx.next_retry_attempt(&key);
    let delay = ctx.backoff.delay_for_error(error, attempt);
    if error.is_retryable() {
        warn!("Retryable error for {}: {:?}, requeuing in {:?}", name, error, delay);
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    }
    Action::requeue(delay)
}

fn retry_key(ns: &str, name: &str) -> String {
    format!("{ns}/{name}")
}

/// Run one pass for the Middleware identified by (namespace, name)
pub async fn reconcile_middleware<S: ResourceStore>(
    ns: &str,
    name: &str,
    ctx: &Context<S>,
) -> Result<PassOutcome> {
    let Some(middleware) = fetch::<Middleware, S>(&ctx.store, ns, name).await? else {
        return Ok(PassOutcome::Gone);
    };

    let backend = middleware.spec.type_;
    let names = ResourceNames::for_backend(backend);
    let mut deferred: Option<Error> = None;

    info!(backend = %backend, "Reconciling Middleware");

    if backend.has_config_surface() {
        match ctx.manifests.render::<ConfigMap>(&middleware) {
            Ok(desired) => {
                ensure_created(&ctx.store, ns, desired).await?;
            }
            Err(e) => defer(&mut deferred, e)?,
        }
    }

    let secret = match ctx.manifests.render::<Secret>(&middleware) {
        Ok(desired) => Some(ensure_created(&ctx.store, ns, desired).await?),
        Err(e) => {
            defer(&mut deferred, e)?;
            fetch::<Secret, S>(&ctx.store, ns, &names.auth).await?
        }
    };

    match ctx.manifests.render::<Deployment>(&middleware) {
        Ok(desired) => reconcile_deployment(&ctx.store, ns, backend, desired).await?,
        Err(e) => defer(&mut deferred, e)?,
    }

    let service = match ctx.manifests.render::<Service>(&middleware) {
        Ok(desired) => Some(reconcile_service(&ctx.store, ns, desired).await?),
        Err(e) => {
            defer(&mut deferred, e)?;
            fetch::<Service, S>(&ctx.store, ns, &names.service).await?
        }
    };

    let outcome = if status::is_initialized(&middleware) {
        let outcome = match &service {
            Some(service) => {
                ctx.probes
                    .validate(backend, service, secret.as_ref())
                    .await
            }
            None => ProbeOutcome::failed(ProbeError::Connect(format!(
                "service {} not available",
                names.service
            ))),
        };

        match &outcome.error {
            None => debug!(backend = %backend, "Backend validated"),
            Some(e) => warn!(backend = %backend, "Backend health probe failed: {}", e),
        }
        if let Some(state) = &ctx.health_state {
            state.metrics.record_probe(backend, outcome.valid);
        }

        let status = probe_status(&middleware, &outcome, Utc::now());
        if status::status_changed(&middleware, &status) {
            StatusStore::patch_status(&ctx.store, ns, name, &status).await?;
        } else {
            debug!(backend = %backend, "Status unchanged");
        }
        PassOutcome::Validated(outcome)
    } else {
        let status = initial_status(&middleware, Utc::now());
        StatusStore::patch_status(&ctx.store, ns, name, &status).await?;
        info!(backend = %backend, "Resources provisioned, validation starts on the next pass");
        PassOutcome::Initialized
    };

    match deferred {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}

/// Hold a configuration error until the pass completes; propagate anything else
fn defer(slot: &mut Option<Error>, err: Error) -> Result<()> {
    if !err.is_configuration() {
        return Err(err);
    }
    error!("Skipping step: {}", err);
    slot.get_or_insert(err);
    Ok(())
}

async fn fetch<K, S>(store: &S, ns: &str, name: &str) -> Result<Option<K>>
where
    K: Send + Sync + 'static,
    S: ObjectStore<K>,
{
    <S as ObjectStore<K>>::get(store, ns, name).await
}

async fn create<K, S>(store: &S, ns: &str, object: &K) -> Result<K>
where
    K: Send + Sync + 'static,
    S: ObjectStore<K>,
{
    <S as ObjectStore<K>>::create(store, ns, object).await
}

async fn replace<K, S>(store: &S, ns: &str, object: &K) -> Result<K>
where
    K: Send + Sync + 'static,
    S: ObjectStore<K>,
{
    <S as ObjectStore<K>>::replace(store, ns, object).await
}

/// Create the object if it does not exist yet. Existing objects are never
/// updated. Returns the stored object.
async fn ensure_created<K, S>(store: &S, ns: &str, desired: K) -> Result<K>
where
    K: kube::Resource + Send + Sync + 'static,
    S: ObjectStore<K>,
{
    let name = desired.name_any();
    match fetch::<K, S>(store, ns, &name).await? {
        Some(actual) => {
            debug!("{} already exists", name);
            Ok(actual)
        }
        None => {
            let created = create(store, ns, &desired).await?;
            info!("Created {}", name);
            Ok(created)
        }
    }
}

/// Create the Deployment or roll it to the desired state.
///
/// A drifted Deployment is first scaled to zero replicas and then replaced
/// with the desired document, so old and new pods never run side by side.
async fn reconcile_deployment<S>(
    store: &S,
    ns: &str,
    backend: BackendType,
    desired: Deployment,
) -> Result<()>
where
    S: ObjectStore<Deployment>,
{
    let name = desired.name_any();
    let Some(actual) = fetch::<Deployment, S>(store, ns, &name).await? else {
        create(store, ns, &desired).await?;
        info!("Created Deployment {}", name);
        return Ok(());
    };

    if !deployment_needs_update(backend, &actual, &desired) {
        debug!("Deployment {} is up to date", name);
        return Ok(());
    }

    info!("Deployment {} drifted, scaling down before update", name);
    let mut scaled = actual;
    if let Some(spec) = scaled.spec.as_mut() {
        spec.replicas = Some(0);
    }
    let scaled = replace(store, ns, &scaled).await?;

    let mut next = desired;
    next.metadata.resource_version = scaled.metadata.resource_version;
    if let Err(e) = replace(store, ns, &next).await {
        warn!(
            "Deployment {} left at zero replicas after failed update: {}",
            name, e
        );
        return Err(e);
    }

    info!("Updated Deployment {}", name);
    Ok(())
}

/// Create the Service or switch its exposure mode. Returns the stored Service.
async fn reconcile_service<S>(store: &S, ns: &str, desired: Service) -> Result<Service>
where
    S: ObjectStore<Service>,
{
    let name = desired.name_any();
    let Some(actual) = fetch::<Service, S>(store, ns, &name).await? else {
        let created = create(store, ns, &desired).await?;
        info!("Created Service {}", name);
        return Ok(created);
    };

    if !service_needs_update(&actual, &desired) {
        debug!("Service {} is up to date", name);
        return Ok(actual);
    }

    let exposure = service_type(&desired).map(str::to_string);
    info!(
        "Service {} exposure changed from {:?} to {:?}",
        name,
        service_type(&actual),
        exposure
    );

    let mut updated = actual;
    let spec = updated.spec.get_or_insert_with(Default::default);
    // Node ports are rejected on services that are no longer NodePort
    if exposure.as_deref() != Some("NodePort") {
        for port in spec.ports.iter_mut().flatten() {
            port.node_port = None;
        }
    }
    spec.type_ = exposure;

    replace(store, ns, &updated).await
}

pub mod context;
pub mod diff;
pub mod error;
pub mod reconciler;
pub mod status;
pub mod store;

pub use context::Context;
pub use diff::{deployment_needs_update, service_needs_update};
pub use error::{BackoffConfig, Error, Result};
pub use reconciler::{PassOutcome, error_policy, reconcile, reconcile_middleware};
pub use status::ConditionBuilder;
pub use store::{KubeStore, ObjectStore, ResourceStore, StatusStore};

//! Status and conditions management for Middleware resources
//!
//! The health verdict is tri-state: unset until the first pass, `false` right
//! after it, and probe-derived from then on.

use chrono::{DateTime, Utc};

use crate::crd::{Condition, Middleware, MiddlewareStatus};
use crate::probes::ProbeOutcome;

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// Backend answered its health probe
    pub const VALIDATED: &str = "Validated";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
    now: DateTime<Utc>,
}

impl ConditionBuilder {
    /// Start from existing conditions
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>, now: DateTime<Utc>) -> Self {
        Self {
            conditions: existing,
            generation,
            now,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't.
    ///
    /// The transition time only moves when the status value changes.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = self.now.to_rfc3339();
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: self.now.to_rfc3339(),
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the Validated condition from a probe outcome
    pub fn validated(self, outcome: &ProbeOutcome) -> Self {
        match &outcome.error {
            None => self.set_condition(
                condition_types::VALIDATED,
                condition_status::TRUE,
                "ProbeSucceeded",
                "Backend answered the health probe",
            ),
            Some(e) => self.set_condition(
                condition_types::VALIDATED,
                condition_status::FALSE,
                "ProbeFailed",
                &e.to_string(),
            ),
        }
    }

    /// Mark the Validated condition as not yet evaluated
    pub fn pending(self) -> Self {
        self.set_condition(
            condition_types::VALIDATED,
            condition_status::UNKNOWN,
            "Provisioning",
            "Backend resources provisioned, probe runs on the next pass",
        )
    }

    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Whether the descriptor has gone through its first pass
pub fn is_initialized(middleware: &Middleware) -> bool {
    middleware
        .status
        .as_ref()
        .and_then(|s| s.is_validate)
        .is_some()
}

/// Check if the spec changed since the last recorded pass
pub fn spec_changed(middleware: &Middleware) -> bool {
    let observed = middleware
        .status
        .as_ref()
        .and_then(|s| s.observed_generation);
    observed != middleware.metadata.generation
}

/// Whether `status` differs from the stored one.
///
/// Every status write is a watch event on the Middleware, so an unchanged
/// status must not be written.
pub fn status_changed(middleware: &Middleware, status: &MiddlewareStatus) -> bool {
    middleware.status.as_ref() != Some(status)
}

fn existing_conditions(middleware: &Middleware) -> Vec<Condition> {
    middleware
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default()
}

/// Status written on the first pass: not validated, no probe run
pub fn initial_status(middleware: &Middleware, now: DateTime<Utc>) -> MiddlewareStatus {
    let generation = middleware.metadata.generation;
    MiddlewareStatus {
        is_validate: Some(false),
        last_probe_error: None,
        last_probe_time: None,
        observed_generation: generation,
        conditions: ConditionBuilder::from_existing(existing_conditions(middleware), generation, now)
            .pending()
            .build(),
    }
}

/// Status carrying the verdict of a probe run at `now`.
///
/// `lastProbeTime` marks when the current verdict was first observed. A probe
/// repeating the stored verdict and error keeps the stored time, so a steady
/// backend produces a status equal to the stored one.
pub fn probe_status(
    middleware: &Middleware,
    outcome: &ProbeOutcome,
    now: DateTime<Utc>,
) -> MiddlewareStatus {
    let generation = middleware.metadata.generation;
    let last_probe_error = outcome.error.as_ref().map(|e| e.to_string());
    let last_probe_time = middleware
        .status
        .as_ref()
        .filter(|s| s.is_validate == Some(outcome.valid) && s.last_probe_error == last_probe_error)
        .and_then(|s| s.last_probe_time.clone())
        .unwrap_or_else(|| now.to_rfc3339());
    MiddlewareStatus {
        is_validate: Some(outcome.valid),
        last_probe_error,
        last_probe_time: Some(last_probe_time),
        observed_generation: generation,
        conditions: ConditionBuilder::from_existing(existing_conditions(middleware), generation, now)
            .validated(outcome)
            .build(),
    }
}

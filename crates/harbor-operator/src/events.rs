//! Reconciliation events
//!
//! The reconciler reports progress through a [`ReconcileEvents`] handle it
//! receives at construction. Production wiring uses [`TracingEvents`]; tests
//! substitute a recorder and assert on what was reported.

use crate::ensure::EnsureOutcome;
use crate::error::OperatorError;
use crate::reconciler::{InstanceRef, Subsystem};
use tracing::{debug, info, warn};

/// Sink for everything a reconciliation pass wants to tell the outside world
pub trait ReconcileEvents: Send + Sync {
    /// The instance no longer exists; nothing to do
    fn instance_missing(&self, instance: &InstanceRef);

    /// The derived configuration was loaded; `generated` is true on first creation
    fn config_loaded(&self, instance: &InstanceRef, generated: bool);

    /// A dependent object was created or found already present
    fn object_ensured(
        &self,
        subsystem: Subsystem,
        kind: &str,
        namespace: &str,
        name: &str,
        outcome: EnsureOutcome,
    );

    /// Every object of a subsystem exists
    fn subsystem_converged(&self, instance: &InstanceRef, subsystem: Subsystem, created: usize);

    /// A subsystem failed; later subsystems are skipped in this pass
    fn subsystem_failed(&self, instance: &InstanceRef, subsystem: Subsystem, error: &OperatorError);

    /// The pass finished successfully
    fn pass_completed(&self, instance: &InstanceRef, created: usize);
}

/// [`ReconcileEvents`] that emits structured `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl ReconcileEvents for TracingEvents {
    fn instance_missing(&self, instance: &InstanceRef) {
        debug!(
            namespace = %instance.namespace,
            instance = %instance.name,
            "Harbor instance not found, assuming it was deleted"
        );
    }

    fn config_loaded(&self, instance: &InstanceRef, generated: bool) {
        if generated {
            info!(
                namespace = %instance.namespace,
                instance = %instance.name,
                "Generated derived configuration"
            );
        } else {
            debug!(
                namespace = %instance.namespace,
                instance = %instance.name,
                "Loaded derived configuration"
            );
        }
    }

    fn object_ensured(
        &self,
        subsystem: Subsystem,
        kind: &str,
        namespace: &str,
        name: &str,
        outcome: EnsureOutcome,
    ) {
        match outcome {
            EnsureOutcome::Created => info!(
                subsystem = subsystem.as_str(),
                kind,
                namespace,
                name,
                "Created dependent object"
            ),
            EnsureOutcome::Existing => debug!(
                subsystem = subsystem.as_str(),
                kind,
                namespace,
                name,
                "Dependent object already exists"
            ),
        }
    }

    fn subsystem_converged(&self, instance: &InstanceRef, subsystem: Subsystem, created: usize) {
        debug!(
            namespace = %instance.namespace,
            instance = %instance.name,
            subsystem = subsystem.as_str(),
            created,
            "Subsystem converged"
        );
    }

    fn subsystem_failed(&self, instance: &InstanceRef, subsystem: Subsystem, error: &OperatorError) {
        warn!(
            namespace = %instance.namespace,
            instance = %instance.name,
            subsystem = subsystem.as_str(),
            error = %error,
            "Subsystem failed, aborting pass"
        );
    }

    fn pass_completed(&self, instance: &InstanceRef, created: usize) {
        info!(
            namespace = %instance.namespace,
            instance = %instance.name,
            created,
            "Reconciliation pass complete"
        );
    }
}

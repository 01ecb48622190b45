//! Harbor Controller
//!
//! This module wires the [`Reconciler`] into the kube-runtime controller. It
//! watches `Harbor` resources and the objects they own, and hands every change
//! event to the reconciler as an [`InstanceRef`]. Retry and backoff live here,
//! never in the reconciler.

use crate::crd::Harbor;
use crate::error::{OperatorError, Result};
use crate::events::TracingEvents;
use crate::reconciler::{InstanceRef, ReconcileOutcome, Reconciler, ReconcilerSettings};
use crate::store::KubeStore;
use dashmap::DashMap;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Requeue interval for error cases (base for exponential backoff)
const ERROR_REQUEUE_SECONDS: u64 = 30;

/// Maximum requeue delay for error backoff
const MAX_ERROR_REQUEUE_SECONDS: u64 = 600;

/// Context passed to the controller
pub struct ControllerContext {
    /// Reconciliation engine backed by the API server
    pub reconciler: Reconciler<KubeStore>,
    /// Metrics recorder (optional)
    pub metrics: Option<ControllerMetrics>,
    /// Per-instance error retry counts for exponential backoff
    pub error_counts: DashMap<String, u32>,
}

/// Metrics for the controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Counter for reconciliation attempts
    pub reconciliations: metrics::Counter,
    /// Counter for reconciliation errors
    pub errors: metrics::Counter,
    /// Counter for dependent objects created
    pub resources_created: metrics::Counter,
    /// Histogram for reconciliation duration
    pub duration: metrics::Histogram,
}

impl ControllerMetrics {
    /// Create new controller metrics
    pub fn new() -> Self {
        Self {
            reconciliations: metrics::counter!("harbor_operator_reconciliations_total"),
            errors: metrics::counter!("harbor_operator_reconciliation_errors_total"),
            resources_created: metrics::counter!("harbor_operator_resources_created_total"),
            duration: metrics::histogram!("harbor_operator_reconciliation_duration_seconds"),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Watch configuration for objects the operator owns
fn owned_config() -> Config {
    Config::default().labels("app.kubernetes.io/managed-by=harbor-operator")
}

/// Start the Harbor controller
pub async fn run_controller(
    client: Client,
    namespace: Option<String>,
    settings: ReconcilerSettings,
) -> Result<()> {
    let ns = namespace.as_deref();
    let harbors: Api<Harbor> = scoped_api(&client, ns);

    let ctx = Arc::new(ControllerContext {
        reconciler: Reconciler::new(
            KubeStore::new(client.clone()).with_field_manager(settings.field_manager.clone()),
            settings,
            Arc::new(TracingEvents),
        ),
        metrics: Some(ControllerMetrics::new()),
        error_counts: DashMap::new(),
    });

    info!(
        namespace = ns.unwrap_or("all"),
        "Starting Harbor controller"
    );

    Controller::new(harbors, Config::default())
        .owns(scoped_api::<Deployment>(&client, ns), owned_config())
        .owns(scoped_api::<StatefulSet>(&client, ns), owned_config())
        .owns(scoped_api::<Service>(&client, ns), owned_config())
        .owns(scoped_api::<Secret>(&client, ns), owned_config())
        .owns(scoped_api::<ConfigMap>(&client, ns), owned_config())
        .owns(scoped_api::<PersistentVolumeClaim>(&client, ns), owned_config())
        .owns(scoped_api::<Ingress>(&client, ns), owned_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(
                        name = obj.name,
                        namespace = obj.namespace,
                        ?action,
                        "Reconciliation completed"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    Ok(())
}

/// Main reconciliation function
#[instrument(skip(harbor, ctx), fields(name = %harbor.name_any(), namespace = harbor.namespace()))]
async fn reconcile(harbor: Arc<Harbor>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let start = std::time::Instant::now();

    if let Some(ref metrics) = ctx.metrics {
        metrics.reconciliations.increment(1);
    }

    let instance = InstanceRef::from(harbor.as_ref());
    let result = ctx.reconciler.reconcile(&instance).await;

    if let Some(ref metrics) = ctx.metrics {
        metrics.duration.record(start.elapsed().as_secs_f64());
    }

    match result {
        Ok(outcome) => {
            // Reset error backoff counter on success
            ctx.error_counts.remove(&instance.to_string());
            if let (Some(metrics), ReconcileOutcome::Converged { created }) =
                (ctx.metrics.as_ref(), outcome)
            {
                metrics.resources_created.increment(created as u64);
            }
            Ok(Action::await_change())
        }
        Err(e) => {
            if let Some(ref metrics) = ctx.metrics {
                metrics.errors.increment(1);
            }
            Err(e)
        }
    }
}

/// Error policy for the controller: exponential backoff.
fn error_policy(harbor: Arc<Harbor>, error: &OperatorError, ctx: Arc<ControllerContext>) -> Action {
    let key = InstanceRef::from(harbor.as_ref()).to_string();
    let retries = record_failure(&ctx.error_counts, &key);
    let delay = backoff_delay(error, retries);

    warn!(
        error = %error,
        retry = retries,
        delay_secs = delay.as_secs(),
        "Reconciliation error for '{}', will retry",
        key
    );

    Action::requeue(delay)
}

/// Bump and return the consecutive failure count of an instance
fn record_failure(counts: &DashMap<String, u32>, key: &str) -> u32 {
    let mut entry = counts.entry(key.to_string()).or_insert(0);
    *entry += 1;
    *entry
}

/// The error's suggested delay, or exponential backoff:
/// 30s → 60s → 120s → 240s → 480s → 600s (capped)
fn backoff_delay(error: &OperatorError, retries: u32) -> Duration {
    error.requeue_delay().unwrap_or_else(|| {
        let base = Duration::from_secs(ERROR_REQUEUE_SECONDS);
        let backoff = base * 2u32.saturating_pow(retries.saturating_sub(1).min(5));
        backoff.min(Duration::from_secs(MAX_ERROR_REQUEUE_SECONDS))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    fn invalid() -> OperatorError {
        OperatorError::InvalidConfig("spec.version: version must be 1-64 characters".to_string())
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let delays: Vec<u64> = (1..=8)
            .map(|retries| backoff_delay(&invalid(), retries).as_secs())
            .collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 480, 600, 600, 600]);
    }

    #[test]
    fn test_retryable_errors_use_fixed_delay() {
        let transient = OperatorError::ConfigUnavailable {
            name: "demo-harbor-int".to_string(),
            source: StoreError::Kube(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "etcdserver: request timed out".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
            })),
        };
        assert_eq!(backoff_delay(&transient, 6), Duration::from_secs(30));
    }

    #[test]
    fn test_record_failure_counts_per_instance() {
        let counts = DashMap::new();
        assert_eq!(record_failure(&counts, "default/demo"), 1);
        assert_eq!(record_failure(&counts, "default/demo"), 2);
        assert_eq!(record_failure(&counts, "other/demo"), 1);

        counts.remove("default/demo");
        assert_eq!(record_failure(&counts, "default/demo"), 1);
    }
}

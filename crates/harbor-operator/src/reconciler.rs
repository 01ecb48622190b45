//! Desired-state reconciler
//!
//! One [`Reconciler::reconcile`] call is one reconciliation pass for one
//! Harbor instance: fetch the instance, load (or create) its derived
//! configuration, then ensure every dependent object subsystem by subsystem.
//! The first failing subsystem ends the pass; retrying is the scheduler's job.
//! Every step is create-if-absent, so a repeated pass is a no-op for objects
//! that already exist.

use crate::config::derive_or_load;
use crate::crd::Harbor;
use crate::ensure::{Accumulator, Ensurer};
use crate::error::{OperatorError, Result};
use crate::events::ReconcileEvents;
use crate::pki::{CertificateAuthority, DEFAULT_CERT_VALIDITY};
use crate::resources::{
    ResourceBuilder, COMPONENT_CORE, COMPONENT_INGRESS, COMPONENT_JOBSERVICE, COMPONENT_REGISTRY,
};
use crate::store::{ObjectStore, FIELD_MANAGER};
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Identity of a Harbor instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    pub namespace: String,
    pub name: String,
}

impl InstanceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl From<&Harbor> for InstanceRef {
    fn from(harbor: &Harbor) -> Self {
        Self::new(
            harbor.namespace().unwrap_or_else(|| "default".to_string()),
            harbor.name_any(),
        )
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Groups of dependent objects, ensured in [`Subsystem::ORDER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Database,
    Core,
    Registry,
    AdminServer,
    JobService,
    Ingress,
    Portal,
}

impl Subsystem {
    /// Sequence of every pass
    pub const ORDER: [Subsystem; 7] = [
        Subsystem::Database,
        Subsystem::Core,
        Subsystem::Registry,
        Subsystem::AdminServer,
        Subsystem::JobService,
        Subsystem::Ingress,
        Subsystem::Portal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Database => "database",
            Subsystem::Core => "core",
            Subsystem::Registry => "registry",
            Subsystem::AdminServer => "adminserver",
            Subsystem::JobService => "jobservice",
            Subsystem::Ingress => "ingress",
            Subsystem::Portal => "portal",
        }
    }
}

/// Knobs of the reconciliation engine
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Validity window of every issued certificate
    pub cert_validity: Duration,
    /// Field manager recorded on created objects
    pub field_manager: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            cert_validity: DEFAULT_CERT_VALIDITY,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }
}

/// Result of a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every dependent object exists; `created` were created by this pass
    Converged { created: usize },
    /// The instance no longer exists
    Deleted,
}

/// Converges Harbor instances against an [`ObjectStore`]
pub struct Reconciler<S> {
    store: S,
    ca: CertificateAuthority,
    events: Arc<dyn ReconcileEvents>,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: S, settings: ReconcilerSettings, events: Arc<dyn ReconcileEvents>) -> Self {
        Self {
            store,
            ca: CertificateAuthority::new(settings.cert_validity),
            events,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one pass for the referenced instance
    pub async fn reconcile(&self, instance: &InstanceRef) -> Result<ReconcileOutcome> {
        let harbor = self
            .store
            .get::<Harbor>(&instance.namespace, &instance.name)
            .await
            .map_err(|source| OperatorError::InstanceUnavailable {
                namespace: instance.namespace.clone(),
                name: instance.name.clone(),
                source,
            })?;

        match harbor {
            Some(harbor) => self.converge(instance, &harbor).await,
            None => {
                self.events.instance_missing(instance);
                Ok(ReconcileOutcome::Deleted)
            }
        }
    }

    async fn converge(&self, instance: &InstanceRef, harbor: &Harbor) -> Result<ReconcileOutcome> {
        validate(harbor)?;

        let ensurer = Ensurer::new(&self.store, harbor)?;
        let loaded = derive_or_load(&self.store, &ensurer, harbor).await?;
        self.events.config_loaded(instance, loaded.generated);

        let mut config = loaded.config;
        config.normalize(&instance.name, &harbor.spec);

        let builder = ResourceBuilder::new(harbor, &config)?;
        let mut created = usize::from(loaded.generated);

        for subsystem in Subsystem::ORDER {
            let mut batch = Accumulator::new(&ensurer, self.events.as_ref(), subsystem);
            self.ensure_subsystem(subsystem, &builder, &mut batch).await;
            match batch.result() {
                Ok(count) => {
                    created += count;
                    self.events.subsystem_converged(instance, subsystem, count);
                }
                Err(error) => {
                    self.events.subsystem_failed(instance, subsystem, &error);
                    return Err(error);
                }
            }
        }

        self.events.pass_completed(instance, created);
        Ok(ReconcileOutcome::Converged { created })
    }

    /// Feed one subsystem's objects through the batch, in dependency order
    async fn ensure_subsystem(
        &self,
        subsystem: Subsystem,
        builder: &ResourceBuilder<'_>,
        batch: &mut Accumulator<'_, S>,
    ) {
        match subsystem {
            Subsystem::Database => {
                batch.accumulate(builder.build_database_secret()).await;
                batch.accumulate(builder.build_database_statefulset()).await;
                batch.accumulate(builder.build_database_service()).await;
            }
            Subsystem::Core => {
                batch.accumulate(builder.build_core_config_map()).await;
                batch.accumulate(builder.build_core_service()).await;
                // CA material is issued only when the secret is missing
                batch
                    .accumulate_with(&builder.resource_name(COMPONENT_CORE), || {
                        builder.build_core_secret(&self.ca)
                    })
                    .await;
                batch.accumulate(builder.build_core_deployment()).await;
            }
            Subsystem::Registry => {
                batch.accumulate(builder.build_registry_deployment()).await;
                batch.accumulate(builder.build_registry_service()).await;
                batch.accumulate(builder.build_registry_secret()).await;
                batch
                    .accumulate_with(&builder.resource_name(COMPONENT_REGISTRY), || {
                        builder.build_registry_config_map()
                    })
                    .await;
                batch.accumulate(builder.build_registry_pvc()).await;
            }
            Subsystem::AdminServer => {
                batch.accumulate(builder.build_adminserver_deployment()).await;
                batch.accumulate(builder.build_adminserver_secret()).await;
                batch.accumulate(builder.build_adminserver_config_map()).await;
                batch.accumulate(builder.build_adminserver_service()).await;
            }
            Subsystem::JobService => {
                batch.accumulate(builder.build_jobservice_secret()).await;
                batch
                    .accumulate_with(&builder.resource_name(COMPONENT_JOBSERVICE), || {
                        builder.build_jobservice_config_map()
                    })
                    .await;
                batch.accumulate(builder.build_jobservice_deployment()).await;
                batch.accumulate(builder.build_jobservice_service()).await;
            }
            Subsystem::Ingress => {
                batch
                    .accumulate_with(&builder.resource_name(COMPONENT_INGRESS), || {
                        builder.build_ingress_secret(&self.ca)
                    })
                    .await;
                batch.accumulate(builder.build_ingress()).await;
            }
            Subsystem::Portal => {
                batch.accumulate(builder.build_portal_deployment()).await;
                batch.accumulate(builder.build_portal_service()).await;
            }
        }
    }
}

/// Reject specs that fail validation; terminal for the pass
fn validate(harbor: &Harbor) -> Result<()> {
    harbor.spec.validate().map_err(|errors| {
        let mut messages: Vec<String> = Vec::new();
        collect_messages("spec", &errors, &mut messages);
        OperatorError::InvalidConfig(messages.join("; "))
    })
}

fn collect_messages(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = format!("{}.{}", prefix, field);
        match kind {
            ValidationErrorsKind::Field(errs) => out.extend(errs.iter().map(|e| match &e.message {
                Some(message) => format!("{}: {}", path, message),
                None => format!("{}: {}", path, e.code),
            })),
            ValidationErrorsKind::Struct(nested) => collect_messages(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_messages(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

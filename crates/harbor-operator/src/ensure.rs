//! Resource ensurer
//!
//! [`Ensurer::ensure`] is the create-if-absent primitive every dependent
//! object goes through: look the object up, create it with a controller
//! owner reference when missing, and leave it untouched when present.
//! Existing objects are never compared or updated.
//!
//! [`Accumulator`] batches a subsystem's ensure calls with first-error-wins
//! semantics: once one call fails, the remaining calls of the batch are
//! skipped and the batch reports that single error.

use crate::crd::Harbor;
use crate::error::{OperatorError, Result};
use crate::events::ReconcileEvents;
use crate::reconciler::Subsystem;
use crate::store::{kind_of, ManagedResource, ObjectStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// What [`Ensurer::ensure`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The object was missing and has been created
    Created,
    /// The object was already present (or created concurrently by someone else)
    Existing,
}

/// Stamp a controller owner reference on an object, once
pub fn set_owner<K: ManagedResource>(owner: &OwnerReference, object: &mut K) {
    let references = object.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if !references.iter().any(|r| r.uid == owner.uid) {
        references.push(owner.clone());
    }
}

/// Idempotent "ensure this object exists" for one owning instance
pub struct Ensurer<'a, S> {
    store: &'a S,
    namespace: String,
    owner: OwnerReference,
}

impl<'a, S: ObjectStore> Ensurer<'a, S> {
    /// Create an ensurer whose objects are owned by `instance`
    pub fn new(store: &'a S, instance: &Harbor) -> Result<Self> {
        let owner = instance.controller_owner_ref(&()).ok_or_else(|| {
            OperatorError::InvalidConfig(format!(
                "Harbor {} has no uid, cannot own dependents",
                instance.name_any()
            ))
        })?;
        let namespace = instance.namespace().ok_or_else(|| {
            OperatorError::InvalidConfig(format!(
                "Harbor {} has no namespace",
                instance.name_any()
            ))
        })?;
        Ok(Self {
            store,
            namespace,
            owner,
        })
    }

    /// Namespace dependents are created in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create `object` unless an object of the same kind and name already exists
    pub async fn ensure<K: ManagedResource>(&self, object: K) -> Result<EnsureOutcome> {
        let name = object.name_any();
        let namespace = object
            .namespace()
            .unwrap_or_else(|| self.namespace.clone());
        self.ensure_with(&namespace, &name, move || Ok(object)).await
    }

    /// Like [`Ensurer::ensure`], but only builds the object when it is missing.
    ///
    /// Used for objects carrying one-time material (generated credentials,
    /// certificate authority keys) that must never be produced twice.
    pub async fn ensure_with<K, F>(&self, namespace: &str, name: &str, build: F) -> Result<EnsureOutcome>
    where
        K: ManagedResource,
        F: FnOnce() -> Result<K> + Send,
    {
        let existing = self
            .store
            .get::<K>(namespace, name)
            .await
            .map_err(|source| self.failed::<K>(namespace, name, source))?;
        if existing.is_some() {
            return Ok(EnsureOutcome::Existing);
        }

        let mut object = build()?;
        object.meta_mut().name = Some(name.to_string());
        object.meta_mut().namespace = Some(namespace.to_string());
        set_owner(&self.owner, &mut object);

        match self.store.create(&object).await {
            Ok(()) => Ok(EnsureOutcome::Created),
            Err(StoreError::AlreadyExists) => Ok(EnsureOutcome::Existing),
            Err(source) => Err(self.failed::<K>(namespace, name, source)),
        }
    }

    fn failed<K: ManagedResource>(&self, namespace: &str, name: &str, source: StoreError) -> OperatorError {
        OperatorError::EnsureFailed {
            kind: kind_of::<K>(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            source,
        }
    }
}

/// First-error-wins batch over an [`Ensurer`]
pub struct Accumulator<'a, S> {
    ensurer: &'a Ensurer<'a, S>,
    events: &'a dyn ReconcileEvents,
    subsystem: Subsystem,
    error: Option<OperatorError>,
    created: usize,
}

impl<'a, S: ObjectStore> Accumulator<'a, S> {
    pub fn new(ensurer: &'a Ensurer<'a, S>, events: &'a dyn ReconcileEvents, subsystem: Subsystem) -> Self {
        Self {
            ensurer,
            events,
            subsystem,
            error: None,
            created: 0,
        }
    }

    /// Ensure `object` unless an earlier call of the batch failed
    pub async fn accumulate<K: ManagedResource>(&mut self, object: K) {
        if self.error.is_some() {
            return;
        }
        let name = object.name_any();
        let namespace = object
            .namespace()
            .unwrap_or_else(|| self.ensurer.namespace().to_string());
        let result = self.ensurer.ensure(object).await;
        self.record::<K>(&namespace, &name, result);
    }

    /// Ensure a lazily built object unless an earlier call of the batch failed
    pub async fn accumulate_with<K, F>(&mut self, name: &str, build: F)
    where
        K: ManagedResource,
        F: FnOnce() -> Result<K> + Send,
    {
        if self.error.is_some() {
            return;
        }
        let namespace = self.ensurer.namespace().to_string();
        let result = self.ensurer.ensure_with(&namespace, name, build).await;
        self.record::<K>(&namespace, name, result);
    }

    fn record<K: ManagedResource>(&mut self, namespace: &str, name: &str, result: Result<EnsureOutcome>) {
        match result {
            Ok(outcome) => {
                if outcome == EnsureOutcome::Created {
                    self.created += 1;
                }
                self.events
                    .object_ensured(self.subsystem, &kind_of::<K>(), namespace, name, outcome);
            }
            Err(error) => self.error = Some(error),
        }
    }

    /// Whether a call of the batch has failed
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    /// Number of objects created by this batch so far
    pub fn created(&self) -> usize {
        self.created
    }

    /// The first error of the batch, or the number of objects created
    pub fn result(self) -> Result<usize> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.created),
        }
    }
}

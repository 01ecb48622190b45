//! # Harbor Kubernetes Operator
//!
//! Kubernetes operator that turns a single `Harbor` custom resource into a
//! running Harbor container registry: database, core, registry, adminserver,
//! jobservice, portal and ingress.
//!
//! ## Features
//!
//! - **One declarative resource**: users describe version, external URL,
//!   log level and storage; everything else is derived
//! - **Generated secrets**: passwords and shared secrets are created once and
//!   persisted in a per-instance Secret, so they survive operator restarts
//! - **Embedded certificate authority**: token-signing root and ingress TLS
//!   material issued in-process
//! - **Create-if-absent reconciliation**: every pass is idempotent and safe to
//!   run concurrently with itself
//! - **Observability**: structured `tracing` logs and Prometheus metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use harbor_operator::prelude::*;
//! use kube::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::try_default().await?;
//!     run_controller(client, None, ReconcilerSettings::default()).await
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **Watch**: the [`controller`] watches `Harbor` resources and the objects
//!    they own
//! 2. **Load**: the [`reconciler`] loads the instance's derived configuration
//!    ([`config`]), generating it on first sight
//! 3. **Ensure**: each subsystem's objects are built by [`resources`] and
//!    created through [`ensure`] if missing; the first failing subsystem ends
//!    the pass
//! 4. **Retry**: failures requeue through the controller's error policy
//!
//! ## Custom Resource Definition
//!
//! ```yaml
//! apiVersion: app.goharbor.io/v1alpha1
//! kind: Harbor
//! metadata:
//!   name: demo
//! spec:
//!   version: v1.6.0
//!   config:
//!     extURL: http://demo.example.com
//!     logLevel: info
//!   registry:
//!     storage:
//!       size: 10Gi
//! ```
//!
//! ## Metrics
//!
//! - `harbor_operator_reconciliations_total` - Total reconciliation attempts
//! - `harbor_operator_reconciliation_errors_total` - Reconciliation errors
//! - `harbor_operator_reconciliation_duration_seconds` - Reconciliation latency
//! - `harbor_operator_resources_created_total` - Dependent objects created

pub mod config;
pub mod controller;
pub mod crd;
pub mod ensure;
pub mod error;
pub mod events;
pub mod pki;
pub mod reconciler;
pub mod resources;
pub mod store;
pub mod templates;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::config::{DerivedConfig, Identity, Topology};
    pub use crate::controller::{run_controller, ControllerContext, ControllerMetrics};
    pub use crate::crd::{Harbor, HarborConfigSpec, HarborSpec, RegistrySpec, RegistryStorageSpec};
    pub use crate::ensure::{EnsureOutcome, Ensurer};
    pub use crate::error::{OperatorError, Result};
    pub use crate::events::{ReconcileEvents, TracingEvents};
    pub use crate::pki::{CertificateAuthority, CertifiedKey};
    pub use crate::reconciler::{
        InstanceRef, ReconcileOutcome, Reconciler, ReconcilerSettings, Subsystem,
    };
    pub use crate::resources::ResourceBuilder;
    pub use crate::store::{KubeStore, ObjectStore, StoreError};
}

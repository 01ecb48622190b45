//! Cluster-state store capability
//!
//! The reconciler only ever reads objects by name and creates missing ones.
//! [`ObjectStore`] captures exactly that surface so the reconciliation engine
//! can run against the Kubernetes API ([`KubeStore`]) or an in-memory double
//! in tests.

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Field manager recorded on objects the operator creates
pub const FIELD_MANAGER: &str = "harbor-operator";

/// Store-level failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// An object with the same name already exists
    #[error("object already exists")]
    AlreadyExists,

    /// The caller is not allowed to perform the operation
    #[error("permission denied: {0}")]
    Denied(String),

    /// The object was rejected by validation or admission
    #[error("object rejected: {0}")]
    Invalid(String),

    /// Any other API failure (transport, quota, server errors)
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    /// Whether retrying the same request later may succeed without user action
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Kube(_))
    }
}

/// Any namespaced, statically typed Kubernetes object the operator manages
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Kind of a managed resource, for logs and errors
pub fn kind_of<K: ManagedResource>() -> String {
    K::kind(&()).to_string()
}

/// Read/create access to the cluster-state store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object by namespace and name; `Ok(None)` when it does not exist
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError>;

    /// Create an object in the namespace recorded in its metadata
    async fn create<K: ManagedResource>(&self, object: &K) -> Result<(), StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    /// Record creates under a different field manager
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(classify)
    }

    async fn create<K: ManagedResource>(&self, object: &K) -> Result<(), StoreError> {
        let namespace = object.namespace().ok_or_else(|| {
            StoreError::Invalid(format!(
                "{} {} has no namespace",
                kind_of::<K>(),
                object.name_any()
            ))
        })?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        api.create(&params, object).await.map_err(classify)?;
        Ok(())
    }
}

/// Map API status codes onto the store taxonomy
fn classify(error: kube::Error) -> StoreError {
    match &error {
        kube::Error::Api(response) => match response.code {
            409 if response.reason == "AlreadyExists" => StoreError::AlreadyExists,
            401 | 403 => StoreError::Denied(response.message.clone()),
            400 | 422 => StoreError::Invalid(response.message.clone()),
            _ => StoreError::Kube(error),
        },
        _ => StoreError::Kube(error),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_kind_of() {
        assert_eq!(kind_of::<ConfigMap>(), "ConfigMap");
    }

    #[test]
    fn test_transient_errors() {
        assert!(!StoreError::AlreadyExists.is_transient());
        assert!(!StoreError::Denied("no".to_string()).is_transient());
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} failure", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_status_codes() {
        assert!(matches!(
            classify(api_error(409, "AlreadyExists")),
            StoreError::AlreadyExists
        ));
        assert!(matches!(
            classify(api_error(403, "Forbidden")),
            StoreError::Denied(_)
        ));
        assert!(matches!(
            classify(api_error(422, "Invalid")),
            StoreError::Invalid(_)
        ));
        // A conflict that is not a name clash stays a plain API error
        assert!(classify(api_error(409, "Conflict")).is_transient());
        assert!(classify(api_error(503, "ServiceUnavailable")).is_transient());
    }

    #[tokio::test]
    async fn test_memory_store_lookup_failure() {
        let store = MemoryStore::new();
        store.create(&config_map("a")).await.unwrap();
        store.fail_get::<ConfigMap>("default", "a");

        let err = store.get::<ConfigMap>("default", "a").await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.get::<ConfigMap>("default", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_duplicate_create() {
        let store = MemoryStore::new();
        store.create(&config_map("a")).await.unwrap();

        let again = store.create(&config_map("a")).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists)));
        assert_eq!(store.created().len(), 1);
        assert_eq!(store.create_attempts(), 2);

        let fetched: Option<ConfigMap> = store.get("default", "a").await.unwrap();
        assert!(fetched.is_some());
        let missing: Option<ConfigMap> = store.get("other", "a").await.unwrap();
        assert!(missing.is_none());
    }
}

//! Derived configuration
//!
//! Everything the operator generates for an instance (credentials, service
//! URLs, database parameters, feature toggles) is kept in a [`DerivedConfig`]
//! snapshot, separate from the user's declared [`HarborSpec`]. The snapshot is
//! persisted once per instance in the `<instance>-harbor-int` secret and
//! reloaded on every later pass, so generated secrets never change for a
//! live instance.

use crate::crd::{Harbor, HarborSpec};
use crate::ensure::{EnsureOutcome, Ensurer};
use crate::error::{OperatorError, Result};
use crate::store::{ObjectStore, StoreError};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key of the serialized snapshot inside the configuration secret
pub const CONFIG_KEY: &str = "data.json";

/// Length of every generated secret
pub const SECRET_LENGTH: usize = 16;

/// Database user every component connects as
pub const DATABASE_USER: &str = "postgres";

/// Port the database service listens on
pub const DATABASE_PORT: u16 = 5432;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Name of the configuration record for an instance
pub fn config_name(instance: &str) -> String {
    format!("{}-harbor-int", instance)
}

/// Generate a random alphanumeric string from the operating system RNG
pub fn random_string(len: usize) -> Result<String> {
    // Largest multiple of the alphabet size that fits a byte; keeps sampling unbiased
    let limit = (u8::MAX as usize / ALPHABET.len() * ALPHABET.len()) as u8;
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| OperatorError::CryptoFailure(format!("random source failed: {}", e)))?;
        for byte in buf.iter().copied().filter(|b| *b < limit) {
            if out.len() == len {
                break;
            }
            out.push(ALPHABET[byte as usize % ALPHABET.len()] as char);
        }
    }
    Ok(out)
}

/// Generated credentials of one instance
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Name of the owning Harbor instance
    pub instance: String,
    /// Symmetric key used by core and adminserver to encrypt stored settings
    pub secret_key: String,
    /// Initial password of the `admin` account
    pub admin_password: String,
    /// Shared secret core presents to other components
    pub core_secret: String,
    /// Shared secret the job service presents to core
    pub jobservice_secret: String,
    /// Secret the registry uses to sign upload state
    pub registry_http_secret: String,
    /// Password of the database superuser
    pub database_password: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("instance", &self.instance)
            .field("secret_key", &"[REDACTED]")
            .field("admin_password", &"[REDACTED]")
            .field("core_secret", &"[REDACTED]")
            .field("jobservice_secret", &"[REDACTED]")
            .field("registry_http_secret", &"[REDACTED]")
            .field("database_password", &"[REDACTED]")
            .finish()
    }
}

/// Database connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub sslmode: String,
    pub core_database: String,
    pub clair_database: String,
}

/// Chart repository settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSettings {
    pub enabled: bool,
    pub storage_type: String,
}

/// Computed endpoints and toggles of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// URL users reach Harbor at
    pub external_url: String,
    pub core_url: String,
    pub jobservice_url: String,
    pub adminserver_url: String,
    pub database: DatabaseSettings,
    /// Registry storage backend
    pub storage_type: String,
    pub log_level: String,
    pub chart: ChartSettings,
    pub clair_enabled: bool,
    pub notary_enabled: bool,
}

/// Generated, persisted state of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedConfig {
    pub identity: Identity,
    pub topology: Topology,
}

impl DerivedConfig {
    /// Build a fresh snapshot with newly generated secrets
    pub fn generate(instance: &str, spec: &HarborSpec) -> Result<Self> {
        let identity = Identity {
            instance: instance.to_string(),
            secret_key: random_string(SECRET_LENGTH)?,
            admin_password: random_string(SECRET_LENGTH)?,
            core_secret: random_string(SECRET_LENGTH)?,
            jobservice_secret: random_string(SECRET_LENGTH)?,
            registry_http_secret: random_string(SECRET_LENGTH)?,
            database_password: random_string(SECRET_LENGTH)?,
        };
        let topology = Topology {
            external_url: spec.config.ext_url.clone(),
            core_url: format!("http://{}-core", instance),
            jobservice_url: format!("http://{}-jobservice", instance),
            adminserver_url: format!("http://{}-adminserver", instance),
            database: DatabaseSettings {
                host: format!("{}-database", instance),
                port: DATABASE_PORT,
                user: DATABASE_USER.to_string(),
                sslmode: "disable".to_string(),
                core_database: "registry".to_string(),
                clair_database: "postgres".to_string(),
            },
            storage_type: "filesystem".to_string(),
            log_level: spec.log_level(),
            chart: ChartSettings {
                enabled: false,
                storage_type: "filesystem".to_string(),
            },
            clair_enabled: false,
            notary_enabled: false,
        };
        Ok(Self { identity, topology })
    }

    /// Overwrite the fields that always take their canonical value
    pub fn normalize(&mut self, instance: &str, spec: &HarborSpec) {
        self.topology.database.user = DATABASE_USER.to_string();
        self.topology.database.host = format!("{}-database", instance);
        self.topology.log_level = spec.log_level();
    }

    /// Serialize into the configuration secret
    pub fn to_secret(&self, name: &str, labels: BTreeMap<String, String>) -> Result<Secret> {
        let payload = serde_json::to_vec(self)?;
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(
                CONFIG_KEY.to_string(),
                ByteString(payload),
            )])),
            ..Default::default()
        })
    }

    /// Decode the configuration secret
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let name = secret.name_any();
        let payload = secret
            .data
            .as_ref()
            .and_then(|data| data.get(CONFIG_KEY))
            .ok_or_else(|| OperatorError::ConfigCorrupt {
                name: name.clone(),
                reason: format!("missing key {}", CONFIG_KEY),
            })?;
        serde_json::from_slice(&payload.0).map_err(|e| OperatorError::ConfigCorrupt {
            name,
            reason: e.to_string(),
        })
    }
}

/// A loaded snapshot and whether this pass created it
#[derive(Debug)]
pub struct Loaded {
    pub config: DerivedConfig,
    pub generated: bool,
}

/// Reload the instance's snapshot, creating it first when it does not exist yet.
///
/// Creation goes through the ensurer like every other dependent object. The
/// copy read back from the store is returned, so a snapshot created by a
/// concurrent pass wins over the one generated here.
pub async fn derive_or_load<S: ObjectStore>(
    store: &S,
    ensurer: &Ensurer<'_, S>,
    harbor: &Harbor,
) -> Result<Loaded> {
    let instance = harbor.name_any();
    let namespace = ensurer.namespace().to_string();
    let name = config_name(&instance);
    let unavailable = |source: StoreError| OperatorError::ConfigUnavailable {
        name: name.clone(),
        source,
    };

    if let Some(secret) = store
        .get::<Secret>(&namespace, &name)
        .await
        .map_err(unavailable)?
    {
        return Ok(Loaded {
            config: DerivedConfig::from_secret(&secret)?,
            generated: false,
        });
    }

    let labels = harbor.spec.get_labels(&instance, "harbor-int");
    let outcome = ensurer
        .ensure_with(&namespace, &name, || {
            DerivedConfig::generate(&instance, &harbor.spec)?.to_secret(&name, labels)
        })
        .await?;

    let secret = store
        .get::<Secret>(&namespace, &name)
        .await
        .map_err(unavailable)?
        .ok_or_else(|| OperatorError::NotFound {
            kind: "Secret".to_string(),
            name: name.clone(),
            namespace: namespace.clone(),
        })?;
    Ok(Loaded {
        config: DerivedConfig::from_secret(&secret)?,
        generated: outcome == EnsureOutcome::Created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::fixtures::instance;
    use crate::store::testing::MemoryStore;

    fn is_token(value: &str) -> bool {
        value.len() == SECRET_LENGTH && value.chars().all(|c| c.is_ascii_alphanumeric())
    }

    #[test]
    fn test_random_string() {
        let a = random_string(SECRET_LENGTH).unwrap();
        let b = random_string(SECRET_LENGTH).unwrap();
        assert!(is_token(&a));
        assert_ne!(a, b);
        assert_eq!(random_string(100).unwrap().len(), 100);
        assert!(random_string(0).unwrap().is_empty());
    }

    #[test]
    fn test_generate() {
        let harbor = instance("demo", "http://demo.example.com");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();

        let identity = &config.identity;
        assert_eq!(identity.instance, "demo");
        for secret in [
            &identity.secret_key,
            &identity.admin_password,
            &identity.core_secret,
            &identity.jobservice_secret,
            &identity.registry_http_secret,
            &identity.database_password,
        ] {
            assert!(is_token(secret));
        }
        assert_ne!(identity.admin_password, identity.database_password);

        let topology = &config.topology;
        assert_eq!(topology.external_url, "http://demo.example.com");
        assert_eq!(topology.core_url, "http://demo-core");
        assert_eq!(topology.jobservice_url, "http://demo-jobservice");
        assert_eq!(topology.database.host, "demo-database");
        assert_eq!(topology.database.port, 5432);
        assert_eq!(topology.storage_type, "filesystem");
        assert_eq!(topology.log_level, "info");
        assert!(!topology.clair_enabled);
        assert!(!topology.notary_enabled);
    }

    #[test]
    fn test_normalize_overwrites_canonical_fields() {
        let mut harbor = instance("demo", "http://demo.example.com");
        harbor.spec.config.log_level = "WARNING".to_string();
        let mut config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        config.topology.database.user = "someone".to_string();
        config.topology.database.host = "elsewhere".to_string();
        config.topology.log_level = "debug".to_string();
        let before = config.identity.clone();

        config.normalize("demo", &harbor.spec);
        assert_eq!(config.topology.database.user, "postgres");
        assert_eq!(config.topology.database.host, "demo-database");
        assert_eq!(config.topology.log_level, "warning");
        assert_eq!(config.identity, before);
    }

    #[test]
    fn test_debug_redacts_identity() {
        let harbor = instance("demo", "");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&config.identity.admin_password));
    }

    #[test]
    fn test_from_secret_rejects_garbage() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("demo-harbor-int".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                CONFIG_KEY.to_string(),
                ByteString(b"{not json".to_vec()),
            )])),
            ..Default::default()
        };
        assert!(matches!(
            DerivedConfig::from_secret(&secret),
            Err(OperatorError::ConfigCorrupt { .. })
        ));

        let empty = Secret::default();
        assert!(matches!(
            DerivedConfig::from_secret(&empty),
            Err(OperatorError::ConfigCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_derive_or_load_is_stable() {
        let store = MemoryStore::new();
        let harbor = instance("demo", "http://demo.example.com");
        let ensurer = Ensurer::new(&store, &harbor).unwrap();

        let first = derive_or_load(&store, &ensurer, &harbor).await.unwrap();
        assert!(first.generated);
        let second = derive_or_load(&store, &ensurer, &harbor).await.unwrap();
        assert!(!second.generated);
        assert_eq!(first.config, second.config);

        let stored: Secret = store.object("default", "demo-harbor-int").unwrap();
        assert!(stored.data.unwrap().contains_key(CONFIG_KEY));
        assert_eq!(
            stored.metadata.owner_references.unwrap()[0].name,
            "demo"
        );
        assert_eq!(store.created().len(), 1);
    }

    #[tokio::test]
    async fn test_derive_or_load_reports_corrupt_record() {
        let store = MemoryStore::new();
        let harbor = instance("demo", "http://demo.example.com");
        store.insert(&Secret {
            metadata: ObjectMeta {
                name: Some("demo-harbor-int".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                CONFIG_KEY.to_string(),
                ByteString(b"[]".to_vec()),
            )])),
            ..Default::default()
        });
        let ensurer = Ensurer::new(&store, &harbor).unwrap();

        let err = derive_or_load(&store, &ensurer, &harbor).await.unwrap_err();
        assert!(matches!(err, OperatorError::ConfigCorrupt { .. }));
        assert_eq!(store.create_attempts(), 0);
    }
}

//! Custom Resource Definitions for the Harbor Kubernetes Operator
//!
//! This module defines the `Harbor` CRD, the single declarative resource a
//! user manages. Everything the operator generates on the user's behalf
//! (credentials, URLs, certificates) lives in [`crate::config`], never here.

use kube::CustomResource;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

/// Default size requested by the registry volume claim
pub const DEFAULT_REGISTRY_STORAGE_SIZE: &str = "10Gi";

/// Default log level when `logLevel` is empty
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log levels understood by every Harbor component
const LOG_LEVELS: [&str; 5] = ["debug", "info", "warning", "error", "fatal"];

/// Regex for validating Kubernetes resource quantities (e.g., "10Gi", "100Mi")
static QUANTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$").unwrap());

/// Regex for validating Kubernetes names (RFC 1123 subdomain)
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$").unwrap());

/// Validate a Kubernetes resource quantity string (empty means the default)
fn validate_quantity(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || QUANTITY_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_quantity")
            .with_message(format!("'{}' is not a valid Kubernetes quantity", value).into()))
    }
}

/// Validate a Kubernetes name (RFC 1123 subdomain)
fn validate_k8s_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > 253 {
        return Err(ValidationError::new("name_too_long")
            .with_message("name exceeds 253 characters".into()));
    }
    if !NAME_REGEX.is_match(value) {
        return Err(ValidationError::new("invalid_name").with_message(
            format!("'{}' is not a valid Kubernetes name (RFC 1123)", value).into(),
        ));
    }
    Ok(())
}

/// Validate the external URL: empty, or an http(s) URL with a host
fn validate_external_url(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Ok(());
    }
    let rest = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"))
        .ok_or_else(|| {
            ValidationError::new("invalid_scheme")
                .with_message(format!("'{}' must start with http:// or https://", value).into())
        })?;
    if host_of(rest).is_empty() {
        return Err(ValidationError::new("missing_host")
            .with_message(format!("'{}' has no host", value).into()));
    }
    Ok(())
}

/// Validate the component log level
fn validate_log_level(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || LOG_LEVELS.contains(&value.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level").with_message(
            format!("logLevel must be one of {}", LOG_LEVELS.join(", ")).into(),
        ))
    }
}

/// Strip everything after the authority (path, port)
fn host_of(authority_and_path: &str) -> &str {
    let authority = authority_and_path
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    authority.split(':').next().unwrap_or_default()
}

/// Harbor custom resource definition
///
/// Represents one Harbor container registry installation: core, registry,
/// portal, jobservice, adminserver, database and ingress.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, Validate)]
#[kube(
    group = "app.goharbor.io",
    version = "v1alpha1",
    kind = "Harbor",
    plural = "harbors",
    namespaced,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.config.extURL"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HarborSpec {
    /// Harbor release used as the image tag of every component (e.g. "v1.6.0")
    #[validate(length(min = 1, max = 64, message = "version must be 1-64 characters"))]
    pub version: String,

    /// Installation-wide settings
    #[serde(default)]
    #[validate(nested)]
    pub config: HarborConfigSpec,

    /// Registry settings
    #[serde(default)]
    #[validate(nested)]
    pub registry: RegistrySpec,
}

/// Installation-wide settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HarborConfigSpec {
    /// URL users reach Harbor at (e.g. "http://harbor.example.com")
    #[serde(rename = "extURL", default)]
    #[validate(custom(function = "validate_external_url"))]
    pub ext_url: String,

    /// Log level for all components (empty defaults to "info")
    #[serde(default)]
    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,

    /// Storage class for the database volume; without it the database uses an emptyDir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_k8s_name"))]
    pub storage_class: Option<String>,
}

/// Registry settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    /// Image blob storage
    #[serde(default)]
    #[validate(nested)]
    pub storage: RegistryStorageSpec,
}

/// Registry volume claim settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStorageSpec {
    /// Requested size (defaults to 10Gi)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_quantity"))]
    pub size: Option<String>,

    /// Storage class of the registry volume claim (empty uses the cluster default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_k8s_name"))]
    pub storage_class: Option<String>,
}

impl HarborSpec {
    /// Host part of the external URL, without scheme, port or path
    pub fn external_host(&self) -> &str {
        let url = self.config.ext_url.as_str();
        let rest = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
            .unwrap_or(url);
        host_of(rest)
    }

    /// Declared log level, lower-cased, or the default
    pub fn log_level(&self) -> String {
        if self.config.log_level.is_empty() {
            DEFAULT_LOG_LEVEL.to_string()
        } else {
            self.config.log_level.to_ascii_lowercase()
        }
    }

    /// Size requested by the registry volume claim
    pub fn registry_storage_size(&self) -> &str {
        self.registry
            .storage
            .size
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_REGISTRY_STORAGE_SIZE)
    }

    /// Non-empty storage class for the registry volume claim
    pub fn registry_storage_class(&self) -> Option<&str> {
        self.registry
            .storage
            .storage_class
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    /// Non-empty storage class for the database volume
    pub fn database_storage_class(&self) -> Option<&str> {
        self.config.storage_class.as_deref().filter(|s| !s.is_empty())
    }

    /// Get standard labels for a component's resources
    pub fn get_labels(&self, instance: &str, component: &str) -> BTreeMap<String, String> {
        let mut labels = self.get_selector_labels(instance, component);
        labels.insert("app.kubernetes.io/name".to_string(), "harbor".to_string());
        labels.insert(
            "app.kubernetes.io/instance".to_string(),
            instance.to_string(),
        );
        labels.insert(
            "app.kubernetes.io/component".to_string(),
            component.to_string(),
        );
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            "harbor-operator".to_string(),
        );
        labels.insert(
            "app.kubernetes.io/version".to_string(),
            self.version.clone(),
        );
        labels
    }

    /// Get selector labels for a component's pods
    pub fn get_selector_labels(
        &self,
        instance: &str,
        component: &str,
    ) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), instance.to_string());
        labels.insert("component".to_string(), component.to_string());
        labels
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use kube::api::ObjectMeta;

    /// A stored `Harbor` instance in the default namespace
    pub fn instance(name: &str, ext_url: &str) -> Harbor {
        let mut harbor = Harbor::new(
            name,
            HarborSpec {
                version: "v1.6.0".to_string(),
                config: HarborConfigSpec {
                    ext_url: ext_url.to_string(),
                    ..Default::default()
                },
                registry: RegistrySpec::default(),
            },
        );
        harbor.metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("{name}-0b5c7a3e-uid")),
            ..Default::default()
        };
        harbor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ext_url: &str) -> HarborSpec {
        HarborSpec {
            version: "v1.6.0".to_string(),
            config: HarborConfigSpec {
                ext_url: ext_url.to_string(),
                ..Default::default()
            },
            registry: RegistrySpec::default(),
        }
    }

    #[test]
    fn test_deserialize_original_field_names() {
        let spec: HarborSpec = serde_json::from_value(serde_json::json!({
            "version": "v1.6.0",
            "config": {"extURL": "http://demo.example.com", "logLevel": "debug"},
            "registry": {"storage": {"size": "50Gi", "storageClass": "fast"}}
        }))
        .unwrap();

        assert_eq!(spec.config.ext_url, "http://demo.example.com");
        assert_eq!(spec.registry_storage_size(), "50Gi");
        assert_eq!(spec.registry_storage_class(), Some("fast"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_external_host() {
        assert_eq!(spec("http://demo.example.com").external_host(), "demo.example.com");
        assert_eq!(
            spec("https://demo.example.com:8443/ui").external_host(),
            "demo.example.com"
        );
        assert_eq!(spec("").external_host(), "");
    }

    #[test]
    fn test_defaults() {
        let spec = spec("http://demo.example.com");
        assert_eq!(spec.registry_storage_size(), DEFAULT_REGISTRY_STORAGE_SIZE);
        assert_eq!(spec.registry_storage_class(), None);
        assert_eq!(spec.database_storage_class(), None);
        assert_eq!(spec.log_level(), "info");
    }

    #[test]
    fn test_log_level_is_lowercased() {
        let mut spec = spec("http://demo.example.com");
        spec.config.log_level = "DEBUG".to_string();
        assert_eq!(spec.log_level(), "debug");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_get_labels() {
        let labels = spec("").get_labels("demo", "core");
        assert_eq!(labels.get("app"), Some(&"demo".to_string()));
        assert_eq!(labels.get("component"), Some(&"core".to_string()));
        assert_eq!(
            labels.get("app.kubernetes.io/managed-by"),
            Some(&"harbor-operator".to_string())
        );
        assert_eq!(
            labels.get("app.kubernetes.io/version"),
            Some(&"v1.6.0".to_string())
        );
    }

    #[test]
    fn test_validate_external_url() {
        assert!(validate_external_url("").is_ok());
        assert!(validate_external_url("http://demo.example.com").is_ok());
        assert!(validate_external_url("https://demo.example.com/").is_ok());
        assert!(validate_external_url("demo.example.com").is_err());
        assert!(validate_external_url("ftp://demo.example.com").is_err());
        assert!(validate_external_url("http://").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity("10Gi").is_ok());
        assert!(validate_quantity("1.5Ti").is_ok());
        assert!(validate_quantity("10GB").is_err());
        assert!(validate_quantity("").is_ok());
        assert!(validate_quantity("Gi").is_err());
    }

    #[test]
    fn test_validate_log_level() {
        assert!(validate_log_level("").is_ok());
        assert!(validate_log_level("warning").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let mut spec = spec("http://demo.example.com");
        spec.version = String::new();
        spec.registry.storage.size = Some("lots".to_string());
        let errors = spec.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("version"));
        assert!(errors.errors().contains_key("registry"));
    }
}

//! Kubernetes Resource Builders
//!
//! This module generates the manifests of every Harbor component (Deployment,
//! StatefulSet, Service, Secret, ConfigMap, PersistentVolumeClaim, Ingress)
//! from a `Harbor` instance and its derived configuration. Builders are pure:
//! owner references are stamped by the ensurer, not here.

mod adminserver;
mod core_service;
mod database;
mod ingress;
mod jobservice;
mod portal;
mod registry;

use crate::config::DerivedConfig;
use crate::crd::Harbor;
use crate::error::{OperatorError, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, EnvVar, EnvVarSource, KeyToPath, PodSpec, PodTemplateSpec,
    Secret, SecretKeySelector, SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

pub const COMPONENT_DATABASE: &str = "database";
pub const COMPONENT_CORE: &str = "core";
pub const COMPONENT_REGISTRY: &str = "registry";
pub const COMPONENT_ADMINSERVER: &str = "adminserver";
pub const COMPONENT_JOBSERVICE: &str = "jobservice";
pub const COMPONENT_INGRESS: &str = "ingress";
pub const COMPONENT_PORTAL: &str = "portal";

/// Builder for generating Kubernetes resources from a Harbor instance
pub struct ResourceBuilder<'a> {
    harbor: &'a Harbor,
    config: &'a DerivedConfig,
    name: String,
    namespace: String,
}

impl<'a> ResourceBuilder<'a> {
    /// Create a new resource builder
    pub fn new(harbor: &'a Harbor, config: &'a DerivedConfig) -> Result<Self> {
        let name = harbor
            .metadata
            .name
            .clone()
            .ok_or_else(|| OperatorError::InvalidConfig("harbor name is required".to_string()))?;

        let namespace = harbor
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        Ok(Self {
            harbor,
            config,
            name,
            namespace,
        })
    }

    /// Name of a component's objects: `<instance>-<component>`
    pub fn resource_name(&self, component: &str) -> String {
        format!("{}-{}", self.name, component)
    }

    /// Image of a Harbor component at the declared version
    fn image(&self, repository: &str) -> String {
        format!("goharbor/{}:{}", repository, self.harbor.spec.version)
    }

    fn metadata(&self, component: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.resource_name(component)),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.harbor.spec.get_labels(&self.name, component)),
            ..Default::default()
        }
    }

    fn selector_labels(&self, component: &str) -> BTreeMap<String, String> {
        self.harbor.spec.get_selector_labels(&self.name, component)
    }

    fn pod_template(&self, component: &str, pod_spec: PodSpec) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(self.selector_labels(component)),
                ..Default::default()
            }),
            spec: Some(pod_spec),
        }
    }

    /// Single-replica deployment of a component
    fn deployment(&self, component: &str, pod_spec: PodSpec) -> Deployment {
        Deployment {
            metadata: self.metadata(component),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels(component)),
                    ..Default::default()
                },
                template: self.pod_template(component, pod_spec),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// ClusterIP service selecting a component's pods
    fn service(&self, component: &str, ports: Vec<ServicePort>) -> Service {
        Service {
            metadata: self.metadata(component),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(self.selector_labels(component)),
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn secret<I, K, V>(&self, component: &str, data: I) -> Secret
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Secret {
            metadata: self.metadata(component),
            type_: Some("Opaque".to_string()),
            data: Some(
                data.into_iter()
                    .map(|(k, v)| (k.into(), ByteString(v.into())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn config_map(&self, component: &str, data: BTreeMap<String, String>) -> ConfigMap {
        ConfigMap {
            metadata: self.metadata(component),
            data: Some(data),
            ..Default::default()
        }
    }
}

fn service_port(name: &str, port: i32, target_port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(target_port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: String, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret,
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Volume projecting a secret, optionally restricted to `(key, path)` items
fn secret_volume(name: &str, secret: String, items: &[(&str, &str)]) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret),
            items: if items.is_empty() {
                None
            } else {
                Some(
                    items
                        .iter()
                        .map(|(key, path)| KeyToPath {
                            key: key.to_string(),
                            path: path.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                )
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_map_volume(name: &str, config_map: String) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(name: &str, mount_path: &str, sub_path: Option<&str>) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        sub_path: sub_path.map(str::to_string),
        ..Default::default()
    }
}

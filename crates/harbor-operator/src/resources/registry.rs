//! Registry: blob storage claim, configuration, HTTP secret, deployment and service

use super::core_service::ROOT_CERT_KEY;
use super::{
    config_map_volume, mount, secret_volume, service_port, ResourceBuilder, COMPONENT_CORE,
    COMPONENT_REGISTRY,
};
use crate::error::Result;
use crate::templates::{registry_config, REGISTRY_ROOT_CERT_PATH, REGISTRY_STORAGE_ROOT};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvFromSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, Secret,
    SecretEnvSource, Service, Volume, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

const STORAGE_VOLUME: &str = "storage";

impl ResourceBuilder<'_> {
    /// Registry deployment serving `/etc/registry/config.yml`
    pub fn build_registry_deployment(&self) -> Deployment {
        let registry = self.resource_name(COMPONENT_REGISTRY);

        let container = Container {
            name: "registry".to_string(),
            image: Some(format!(
                "goharbor/registry-photon:v2.6.2-{}",
                self.harbor.spec.version
            )),
            args: Some(vec![
                "serve".to_string(),
                "/etc/registry/config.yml".to_string(),
            ]),
            ports: Some(vec![
                ContainerPort {
                    name: Some("registry".to_string()),
                    container_port: 5000,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ContainerPort {
                    name: Some("controller".to_string()),
                    container_port: 8080,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            env_from: Some(vec![EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: registry.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![
                mount(STORAGE_VOLUME, REGISTRY_STORAGE_ROOT, None),
                mount(
                    "registry-config",
                    "/etc/registry/config.yml",
                    Some("config.yml"),
                ),
                mount(
                    "registry-root-certificate",
                    REGISTRY_ROOT_CERT_PATH,
                    Some(ROOT_CERT_KEY),
                ),
            ]),
            ..Default::default()
        };

        let pod_spec = PodSpec {
            containers: vec![container],
            volumes: Some(vec![
                Volume {
                    name: STORAGE_VOLUME.to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: registry.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                config_map_volume("registry-config", registry),
                secret_volume(
                    "registry-root-certificate",
                    self.resource_name(COMPONENT_CORE),
                    &[],
                ),
            ]),
            ..Default::default()
        };

        self.deployment(COMPONENT_REGISTRY, pod_spec)
    }

    /// Service exposing the registry API and its controller port
    pub fn build_registry_service(&self) -> Service {
        self.service(
            COMPONENT_REGISTRY,
            vec![
                service_port("registry", 5000, 5000),
                service_port("controller", 8080, 8080),
            ],
        )
    }

    /// Secret exported into the registry's environment
    pub fn build_registry_secret(&self) -> Secret {
        self.secret(
            COMPONENT_REGISTRY,
            [(
                "REGISTRY_HTTP_SECRET",
                self.config.identity.registry_http_secret.as_str(),
            )],
        )
    }

    /// Rendered registry `config.yml`
    pub fn build_registry_config_map(&self) -> Result<ConfigMap> {
        let rendered = registry_config(self.config)?;
        Ok(self.config_map(
            COMPONENT_REGISTRY,
            BTreeMap::from([("config.yml".to_string(), rendered)]),
        ))
    }

    /// Volume claim backing the registry's blob storage
    pub fn build_registry_pvc(&self) -> PersistentVolumeClaim {
        let spec = &self.harbor.spec;
        PersistentVolumeClaim {
            metadata: self.metadata(COMPONENT_REGISTRY),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: spec.registry_storage_class().map(str::to_string),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(spec.registry_storage_size().to_string()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

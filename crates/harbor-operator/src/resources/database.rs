//! Database: credentials, PostgreSQL stateful set and service

use super::{env, mount, service_port, ResourceBuilder, COMPONENT_DATABASE};
use crate::config::DATABASE_PORT;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvFromSource, ExecAction,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, Probe, SecretEnvSource, Secret,
    Service, Volume, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

const DATA_VOLUME: &str = "database-data";
const DATA_DIR: &str = "/var/lib/postgresql/data";
const DATA_VOLUME_SIZE: &str = "1Gi";

impl ResourceBuilder<'_> {
    /// Secret holding the database superuser password
    pub fn build_database_secret(&self) -> Secret {
        self.secret(
            COMPONENT_DATABASE,
            [(
                "POSTGRES_PASSWORD",
                self.config.identity.database_password.as_str(),
            )],
        )
    }

    /// Single-replica PostgreSQL stateful set.
    ///
    /// With `config.storageClass` set the data directory comes from a volume
    /// claim template; otherwise it lives in an emptyDir.
    pub fn build_database_statefulset(&self) -> StatefulSet {
        let name = self.resource_name(COMPONENT_DATABASE);
        let image = self.image("harbor-db");
        let storage_class = self.harbor.spec.database_storage_class();

        let init = Container {
            name: "remove-lost-found".to_string(),
            image: Some(image.clone()),
            command: Some(vec![
                "rm".to_string(),
                "-Rf".to_string(),
                format!("{}/lost+found", DATA_DIR),
            ]),
            volume_mounts: Some(vec![mount(DATA_VOLUME, DATA_DIR, None)]),
            ..Default::default()
        };

        let database = Container {
            name: "database".to_string(),
            image: Some(image),
            ports: Some(vec![ContainerPort {
                name: Some("postgres".to_string()),
                container_port: DATABASE_PORT as i32,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            env: Some(vec![env("PGDATA", format!("{}/pgdata", DATA_DIR))]),
            env_from: Some(vec![EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            liveness_probe: Some(Probe {
                exec: Some(ExecAction {
                    command: Some(vec!["/docker-healthcheck.sh".to_string()]),
                }),
                initial_delay_seconds: Some(300),
                period_seconds: Some(10),
                ..Default::default()
            }),
            readiness_probe: Some(Probe {
                exec: Some(ExecAction {
                    command: Some(vec!["/docker-healthcheck.sh".to_string()]),
                }),
                initial_delay_seconds: Some(1),
                period_seconds: Some(10),
                ..Default::default()
            }),
            volume_mounts: Some(vec![mount(DATA_VOLUME, DATA_DIR, None)]),
            ..Default::default()
        };

        let (volumes, claim_templates) = match storage_class {
            Some(class) => (
                None,
                Some(vec![PersistentVolumeClaim {
                    metadata: ObjectMeta {
                        name: Some(DATA_VOLUME.to_string()),
                        ..Default::default()
                    },
                    spec: Some(PersistentVolumeClaimSpec {
                        access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                        storage_class_name: Some(class.to_string()),
                        resources: Some(VolumeResourceRequirements {
                            requests: Some(BTreeMap::from([(
                                "storage".to_string(),
                                Quantity(DATA_VOLUME_SIZE.to_string()),
                            )])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
            ),
            None => (
                Some(vec![Volume {
                    name: DATA_VOLUME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }]),
                None,
            ),
        };

        let pod_spec = PodSpec {
            init_containers: Some(vec![init]),
            containers: vec![database],
            volumes,
            ..Default::default()
        };

        StatefulSet {
            metadata: self.metadata(COMPONENT_DATABASE),
            spec: Some(StatefulSetSpec {
                replicas: Some(1),
                service_name: name.into(),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels(COMPONENT_DATABASE)),
                    ..Default::default()
                },
                template: self.pod_template(COMPONENT_DATABASE, pod_spec),
                volume_claim_templates: claim_templates,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Service in front of the database
    pub fn build_database_service(&self) -> Service {
        let port = DATABASE_PORT as i32;
        self.service(COMPONENT_DATABASE, vec![service_port("postgres", port, port)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DerivedConfig;
    use crate::crd::fixtures::instance;
    use crate::resources::test_support::secret_string;

    #[test]
    fn test_database_secret_carries_derived_password() {
        let harbor = instance("demo", "http://demo.example.com");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let builder = ResourceBuilder::new(&harbor, &config).unwrap();

        let secret = builder.build_database_secret();
        assert_eq!(secret.metadata.name.as_deref(), Some("demo-database"));
        assert_eq!(
            secret_string(&secret, "POSTGRES_PASSWORD"),
            config.identity.database_password
        );
    }

    #[test]
    fn test_statefulset_uses_empty_dir_without_storage_class() {
        let harbor = instance("demo", "http://demo.example.com");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let builder = ResourceBuilder::new(&harbor, &config).unwrap();

        let sts = builder.build_database_statefulset();
        let spec = sts.spec.unwrap();
        assert!(spec.volume_claim_templates.is_none());
        let pod = spec.template.spec.unwrap();
        let volumes = pod.volumes.unwrap();
        assert_eq!(volumes[0].name, DATA_VOLUME);
        assert!(volumes[0].empty_dir.is_some());
        assert_eq!(
            pod.containers[0].image.as_deref(),
            Some("goharbor/harbor-db:v1.6.0")
        );
        assert_eq!(
            pod.containers[0].env_from.as_ref().unwrap()[0]
                .secret_ref
                .as_ref()
                .unwrap()
                .name,
            "demo-database"
        );
    }

    #[test]
    fn test_statefulset_claims_volume_with_storage_class() {
        let mut harbor = instance("demo", "http://demo.example.com");
        harbor.spec.config.storage_class = Some("fast".to_string());
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let builder = ResourceBuilder::new(&harbor, &config).unwrap();

        let spec = builder.build_database_statefulset().spec.unwrap();
        let templates = spec.volume_claim_templates.unwrap();
        assert_eq!(templates[0].metadata.name.as_deref(), Some(DATA_VOLUME));
        let claim = templates[0].spec.as_ref().unwrap();
        assert_eq!(claim.storage_class_name.as_deref(), Some("fast"));
        assert!(spec.template.spec.unwrap().volumes.is_none());
    }

    #[test]
    fn test_database_service_port() {
        let harbor = instance("demo", "http://demo.example.com");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let builder = ResourceBuilder::new(&harbor, &config).unwrap();

        let ports = builder.build_database_service().spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].port, 5432);
    }
}

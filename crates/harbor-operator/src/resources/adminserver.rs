//! Adminserver: settings store seeded from the derived configuration

use super::{
    env, mount, secret_env, secret_volume, service_port, ResourceBuilder, COMPONENT_ADMINSERVER,
    COMPONENT_CORE, COMPONENT_JOBSERVICE,
};
use crate::templates::adminserver_env;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapEnvSource, Container, EmptyDirVolumeSource, EnvFromSource, PodSpec,
    Secret, SecretEnvSource, Service, Volume,
};

impl ResourceBuilder<'_> {
    /// Adminserver deployment
    pub fn build_adminserver_deployment(&self) -> Deployment {
        let adminserver = self.resource_name(COMPONENT_ADMINSERVER);

        let container = Container {
            name: "adminserver".to_string(),
            image: Some(self.image("harbor-adminserver")),
            env: Some(vec![
                env("PORT", "8080"),
                env(
                    "JSON_CFG_STORE_PATH",
                    "/etc/adminserver/config/config.json",
                ),
                env("KEY_PATH", "/etc/adminserver/key"),
                secret_env("CORE_SECRET", self.resource_name(COMPONENT_CORE), "secret"),
                secret_env(
                    "JOBSERVICE_SECRET",
                    self.resource_name(COMPONENT_JOBSERVICE),
                    "secret",
                ),
            ]),
            env_from: Some(vec![
                EnvFromSource {
                    config_map_ref: Some(ConfigMapEnvSource {
                        name: adminserver.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                EnvFromSource {
                    secret_ref: Some(SecretEnvSource {
                        name: adminserver.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            volume_mounts: Some(vec![
                mount("adminserver-key", "/etc/adminserver/key", Some("key")),
                mount("adminserver-config", "/etc/adminserver/config", None),
            ]),
            ..Default::default()
        };

        let pod_spec = PodSpec {
            containers: vec![container],
            volumes: Some(vec![
                secret_volume("adminserver-key", adminserver, &[("secretKey", "key")]),
                Volume {
                    name: "adminserver-config".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        self.deployment(COMPONENT_ADMINSERVER, pod_spec)
    }

    /// Credentials the adminserver seeds Harbor's settings with
    pub fn build_adminserver_secret(&self) -> Secret {
        let identity = &self.config.identity;
        self.secret(
            COMPONENT_ADMINSERVER,
            [
                ("secretKey", identity.secret_key.as_str()),
                ("HARBOR_ADMIN_PASSWORD", identity.admin_password.as_str()),
                ("POSTGRESQL_PASSWORD", identity.database_password.as_str()),
            ],
        )
    }

    /// Non-secret adminserver environment
    pub fn build_adminserver_config_map(&self) -> ConfigMap {
        self.config_map(COMPONENT_ADMINSERVER, adminserver_env(self.config))
    }

    /// Service in front of the adminserver
    pub fn build_adminserver_service(&self) -> Service {
        self.service(COMPONENT_ADMINSERVER, vec![service_port("http", 80, 8080)])
    }
}

//! Job service: shared secret, configuration, deployment and service

use super::{
    config_map_volume, env, mount, secret_env, service_port, ResourceBuilder, COMPONENT_CORE,
    COMPONENT_JOBSERVICE,
};
use crate::error::Result;
use crate::templates::jobservice_config;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, ContainerPort, PodSpec, Secret, Service};
use std::collections::BTreeMap;

impl ResourceBuilder<'_> {
    /// Secret the job service presents to core
    pub fn build_jobservice_secret(&self) -> Secret {
        self.secret(
            COMPONENT_JOBSERVICE,
            [("secret", self.config.identity.jobservice_secret.as_str())],
        )
    }

    /// Rendered job service `config.yml`
    pub fn build_jobservice_config_map(&self) -> Result<ConfigMap> {
        let rendered = jobservice_config(self.config)?;
        Ok(self.config_map(
            COMPONENT_JOBSERVICE,
            BTreeMap::from([("config.yml".to_string(), rendered)]),
        ))
    }

    /// Job service deployment
    pub fn build_jobservice_deployment(&self) -> Deployment {
        let jobservice = self.resource_name(COMPONENT_JOBSERVICE);

        let container = Container {
            name: "jobservice".to_string(),
            image: Some(self.image("harbor-jobservice")),
            ports: Some(vec![ContainerPort {
                name: Some("http".to_string()),
                container_port: 8080,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            env: Some(vec![
                secret_env("CORE_SECRET", self.resource_name(COMPONENT_CORE), "secret"),
                secret_env("JOBSERVICE_SECRET", jobservice.clone(), "secret"),
                env("CORE_URL", self.config.topology.core_url.clone()),
                env(
                    "ADMINSERVER_URL",
                    self.config.topology.adminserver_url.clone(),
                ),
            ]),
            volume_mounts: Some(vec![mount(
                "jobservice-config",
                "/etc/jobservice/config.yml",
                Some("config.yml"),
            )]),
            ..Default::default()
        };

        let pod_spec = PodSpec {
            containers: vec![container],
            volumes: Some(vec![config_map_volume("jobservice-config", jobservice)]),
            ..Default::default()
        };

        self.deployment(COMPONENT_JOBSERVICE, pod_spec)
    }

    /// Service in front of the job service
    pub fn build_jobservice_service(&self) -> Service {
        self.service(COMPONENT_JOBSERVICE, vec![service_port("http", 80, 8080)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DerivedConfig;
    use crate::crd::fixtures::instance;
    use crate::resources::test_support::{container, pod_spec, secret_string};

    #[test]
    fn test_jobservice_secret() {
        let harbor = instance("demo", "http://demo.example.com");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let builder = ResourceBuilder::new(&harbor, &config).unwrap();

        let secret = builder.build_jobservice_secret();
        assert_eq!(secret.metadata.name.as_deref(), Some("demo-jobservice"));
        assert_eq!(
            secret_string(&secret, "secret"),
            config.identity.jobservice_secret
        );
    }

    #[test]
    fn test_jobservice_deployment_mounts_config() {
        let harbor = instance("demo", "http://demo.example.com");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let builder = ResourceBuilder::new(&harbor, &config).unwrap();

        let cm = builder.build_jobservice_config_map().unwrap();
        assert!(cm.data.unwrap().contains_key("config.yml"));

        let dep = builder.build_jobservice_deployment();
        assert_eq!(
            container(&dep).image.as_deref(),
            Some("goharbor/harbor-jobservice:v1.6.0")
        );
        let volume = &pod_spec(&dep).volumes.as_ref().unwrap()[0];
        assert_eq!(volume.config_map.as_ref().unwrap().name, "demo-jobservice");
    }
}

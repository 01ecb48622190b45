//! Portal: web UI deployment and service

use super::{service_port, ResourceBuilder, COMPONENT_PORTAL};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort, HTTPGetAction, PodSpec, Probe, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

fn http_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::Int(80),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(1),
        period_seconds: Some(10),
        ..Default::default()
    }
}

impl ResourceBuilder<'_> {
    /// Portal deployment
    pub fn build_portal_deployment(&self) -> Deployment {
        let container = Container {
            name: "portal".to_string(),
            image: Some(self.image("harbor-portal")),
            ports: Some(vec![ContainerPort {
                name: Some("http".to_string()),
                container_port: 80,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            liveness_probe: Some(http_probe()),
            readiness_probe: Some(http_probe()),
            ..Default::default()
        };

        self.deployment(
            COMPONENT_PORTAL,
            PodSpec {
                containers: vec![container],
                ..Default::default()
            },
        )
    }

    /// Service in front of the portal
    pub fn build_portal_service(&self) -> Service {
        self.service(COMPONENT_PORTAL, vec![service_port("http", 80, 80)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DerivedConfig;
    use crate::crd::fixtures::instance;
    use crate::resources::test_support::container;

    #[test]
    fn test_portal() {
        let harbor = instance("demo", "http://demo.example.com");
        let config = DerivedConfig::generate("demo", &harbor.spec).unwrap();
        let builder = ResourceBuilder::new(&harbor, &config).unwrap();

        let dep = builder.build_portal_deployment();
        let portal = container(&dep);
        assert_eq!(portal.image.as_deref(), Some("goharbor/harbor-portal:v1.6.0"));
        let probe = portal.readiness_probe.as_ref().unwrap();
        assert_eq!(
            probe.http_get.as_ref().unwrap().path.as_deref(),
            Some("/")
        );

        let svc = builder.build_portal_service();
        assert_eq!(svc.metadata.name.as_deref(), Some("demo-portal"));
        assert_eq!(svc.spec.unwrap().ports.unwrap()[0].port, 80);
    }
}

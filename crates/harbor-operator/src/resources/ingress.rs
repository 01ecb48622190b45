//! Ingress: TLS material and HTTP routing to the portal and core

use super::{ResourceBuilder, COMPONENT_CORE, COMPONENT_INGRESS, COMPONENT_PORTAL};
use crate::error::Result;
use crate::pki::CertificateAuthority;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};

/// Paths served by core; everything else goes to the portal
const CORE_PATHS: [&str; 5] = ["/c/", "/chartrepo/", "/v2/", "/service/", "/api/"];

fn route(path: &str, service: String) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path.to_string()),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service,
                port: Some(ServiceBackendPort {
                    number: Some(80),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    }
}

impl ResourceBuilder<'_> {
    /// DNS names of the ingress root certificate
    pub fn ingress_root_dns_names(&self) -> Vec<String> {
        match self.harbor.spec.external_host() {
            "" => Vec::new(),
            host => vec![
                host.to_string(),
                format!("notary.{}", host),
                format!("registry.{}", host),
            ],
        }
    }

    /// TLS secret with a new root and a server certificate it signed.
    ///
    /// Issues new key pairs on every call; only invoke it when the secret does
    /// not exist yet.
    pub fn build_ingress_secret(&self, ca: &CertificateAuthority) -> Result<Secret> {
        let root = ca.issue_root(&self.ingress_root_dns_names())?;
        let server = ca.issue_leaf(&root)?;
        let mut secret = self.secret(
            COMPONENT_INGRESS,
            [
                ("tls.crt", server.cert_pem),
                ("tls.key", server.key_pem),
                ("ca.crt", root.cert_pem),
            ],
        );
        secret.type_ = Some("kubernetes.io/tls".to_string());
        Ok(secret)
    }

    /// Ingress rule routing the external host to portal and core
    pub fn build_ingress(&self) -> Ingress {
        let host = self.harbor.spec.external_host();
        let core = self.resource_name(COMPONENT_CORE);

        let mut paths = vec![route("/", self.resource_name(COMPONENT_PORTAL))];
        paths.extend(CORE_PATHS.iter().map(|path| route(path, core.clone())));

        let tls = if self.harbor.spec.config.ext_url.starts_with("https://") && !host.is_empty() {
            Some(vec![IngressTLS {
                hosts: Some(vec![host.to_string()]),
                secret_name: Some(self.resource_name(COMPONENT_INGRESS)),
            }])
        } else {
            None
        };

        let mut metadata = self.metadata(COMPONENT_INGRESS);
        metadata.name = Some(format!("{}-ing", self.name));

        Ingress {
            metadata,
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: (!host.is_empty()).then(|| host.to_string()),
                    http: Some(HTTPIngressRuleValue { paths }),
                }]),
                tls,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

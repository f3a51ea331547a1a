//! cert-manager: a self-signed Issuer and a Certificate per deployment,
//! with the CA injected through `cert-manager.io/inject-ca-from`

use serde_json::json;

use super::{CertSecretInfo, CertificateConfig, CertificateProvider};
use crate::error::Result;
use crate::manifest::TemplateObject;
use crate::naming::name_with_suffix;
use crate::parametrize::{Instruction, quote};

const INJECT_CA_ANNOTATION: &str = "cert-manager.io/inject-ca-from";
const API_VERSION: &str = "cert-manager.io/v1";

/// Two years, renewed a day before expiry
const DURATION: &str = "17520h";
const RENEW_BEFORE: &str = "24h";

#[derive(Debug, Clone, Copy, Default)]
pub struct CertManager;

impl CertManager {
    fn inject_ca(&self, object: &mut TemplateObject, config: &CertificateConfig) {
        object.set_annotation_expr(
            INJECT_CA_ANNOTATION,
            &format!(
                "(release.namespace ~ {}) | tojson",
                quote(&format!("/{}", config.cert_name))
            ),
        );
    }
}

/// `"<service>" ~ "." ~ release.namespace ~ "<suffix>"` as a YAML scalar
fn dns_name(service: &str, suffix: &str) -> String {
    format!(
        "({} ~ release.namespace ~ {}) | tojson",
        quote(&format!("{}.", service)),
        quote(suffix)
    )
}

impl CertificateProvider for CertManager {
    fn name(&self) -> &str {
        "cert-manager"
    }

    fn modify_validating_webhook(&self, webhook: &mut TemplateObject, config: &CertificateConfig) {
        self.inject_ca(webhook, config);
    }

    fn modify_mutating_webhook(&self, webhook: &mut TemplateObject, config: &CertificateConfig) {
        self.inject_ca(webhook, config);
    }

    fn modify_crd(&self, crd: &mut TemplateObject, config: &CertificateConfig) {
        self.inject_ca(crd, config);
    }

    fn additional_objects(&self, config: &CertificateConfig) -> Result<Vec<TemplateObject>> {
        let issuer_name = name_with_suffix(&config.cert_name, "selfsigned-issuer");
        let service = &config.webhook_service_name;

        let issuer = TemplateObject::new(json!({
            "apiVersion": API_VERSION,
            "kind": "Issuer",
            "metadata": {"name": issuer_name},
            "spec": {"selfSigned": {}}
        }))
        .in_release_namespace();

        let certificate = TemplateObject::new(json!({
            "apiVersion": API_VERSION,
            "kind": "Certificate",
            "metadata": {"name": config.cert_name},
            "spec": {
                "secretName": config.cert_name,
                "commonName": "",
                "usages": ["server auth"],
                "isCA": false,
                "dnsNames": ["", "", ""],
                "issuerRef": {"name": issuer_name},
                "duration": DURATION,
                "renewBefore": RENEW_BEFORE
            }
        }))
        .in_release_namespace()
        .with(Instruction::value(dns_name(service, ""), "spec.commonName"))
        .with(Instruction::value(dns_name(service, ""), "spec.dnsNames.0"))
        .with(Instruction::value(dns_name(service, ".svc"), "spec.dnsNames.1"))
        .with(Instruction::value(
            dns_name(service, ".svc.cluster.local"),
            "spec.dnsNames.2",
        ));

        Ok(vec![issuer, certificate])
    }

    fn cert_secret_info(&self, config: &CertificateConfig) -> CertSecretInfo {
        CertSecretInfo {
            secret_name: config.cert_name.clone(),
            certificate_key: "tls.crt".to_string(),
            private_key_key: "tls.key".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CertificateConfig {
        CertificateConfig::new("memcached.v0.1.0", "memcached-webhook")
    }

    #[test]
    fn test_inject_ca_annotation() {
        let mut webhook = TemplateObject::new(json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "ValidatingWebhookConfiguration",
            "metadata": {"name": "vmemcached.kb.io"}
        }));

        CertManager.modify_validating_webhook(&mut webhook, &config());
        let text = webhook.render().unwrap();

        assert!(text.contains(
            "cert-manager.io/inject-ca-from: {{ (release.namespace ~ \"/memcached.v0.1.0-memcached-webhook-cert\") | tojson }}"
        ));
    }

    #[test]
    fn test_additional_objects() {
        let objects = CertManager.additional_objects(&config()).unwrap();

        let kinds: Vec<&str> = objects.iter().map(TemplateObject::kind).collect();
        assert_eq!(kinds, vec!["Issuer", "Certificate"]);
        assert_eq!(
            objects[0].name(),
            "memcached.v0.1.0-memcached-webhook-cert-selfsigned-issuer"
        );

        let certificate = objects[1].render().unwrap();
        assert!(certificate.contains(
            "- {{ (\"memcached-webhook-service.\" ~ release.namespace ~ \".svc\") | tojson }}"
        ));
        assert!(certificate.contains("duration: 17520h"));
        assert!(certificate.contains("secretName: memcached.v0.1.0-memcached-webhook-cert"));
    }

    #[test]
    fn test_secret_info() {
        let info = CertManager.cert_secret_info(&config());
        assert_eq!(info.secret_name, config().cert_name);
        assert_eq!(info.certificate_key, "tls.crt");
        assert_eq!(info.private_key_key, "tls.key");
    }
}

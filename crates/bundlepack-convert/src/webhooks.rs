//! Webhook services and admission webhook registrations
//!
//! Every deployment serving webhooks gets one Service, named after the
//! deployment, and the certificate provider's objects. Registrations are
//! cluster scoped and named after the webhook's `generateName`, so two
//! bundles can never register the same webhook twice.

use bundlepack_core::{ClusterServiceVersion, WebhookAdmissionType, WebhookDescription};
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, ServiceReference, ValidatingWebhook,
    ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use crate::certprovider::{CertSecretInfo, CertificateConfig, CertificateProvider};
use crate::deployment::defaults_expr;
use crate::error::{ConvertError, Result};
use crate::helpers::{DEPLOYMENT_DEFAULTS, DEPLOYMENTS_TPL};
use crate::manifest::{RELEASE_NAMESPACE, TemplateFile, TemplateObject};
use crate::parametrize::Instruction;

/// `sideEffects` is mandatory in admissionregistration.k8s.io/v1
const DEFAULT_SIDE_EFFECTS: &str = "None";

/// Webhook descriptions grouped by the deployment serving them
pub fn by_deployment(csv: &ClusterServiceVersion) -> BTreeMap<&str, Vec<&WebhookDescription>> {
    let mut grouped: BTreeMap<&str, Vec<&WebhookDescription>> = BTreeMap::new();
    for webhook in &csv.spec.webhook_definitions {
        grouped
            .entry(webhook.deployment_name.as_str())
            .or_default()
            .push(webhook);
    }
    grouped
}

/// Serving certificate secret of every webhook-serving deployment
pub fn certificate_secrets(
    csv: &ClusterServiceVersion,
    provider: &dyn CertificateProvider,
) -> BTreeMap<String, CertSecretInfo> {
    by_deployment(csv)
        .into_keys()
        .map(|deployment| {
            let config = CertificateConfig::new(csv.name(), deployment);
            (deployment.to_string(), provider.cert_secret_info(&config))
        })
        .collect()
}

/// Services, provider objects and admission registrations
pub fn webhook_files(
    csv: &ClusterServiceVersion,
    provider: &dyn CertificateProvider,
) -> Result<Vec<TemplateFile>> {
    let mut files = Vec::new();
    let mut errors = Vec::new();

    for (deployment, webhooks) in by_deployment(csv) {
        let config = CertificateConfig::new(csv.name(), deployment);

        match service_file(csv, deployment, &webhooks, &config, provider) {
            Ok(file) => files.push(file),
            Err(e) => errors.push(e),
        }

        match provider.additional_objects(&config) {
            Ok(objects) => {
                for object in objects {
                    match object.into_file() {
                        Ok(file) => files.push(file),
                        Err(e) => errors.push(e),
                    }
                }
            }
            Err(e) => errors.push(e),
        }

        for webhook in webhooks {
            let registration = match webhook.webhook_type {
                WebhookAdmissionType::ValidatingAdmissionWebhook => {
                    validating_webhook(webhook, &config, provider)
                }
                WebhookAdmissionType::MutatingAdmissionWebhook => {
                    mutating_webhook(webhook, &config, provider)
                }
                // Conversion webhooks are wired into their CRDs
                WebhookAdmissionType::ConversionWebhook => continue,
            };
            match registration.and_then(TemplateObject::into_file) {
                Ok(file) => files.push(file),
                Err(e) => errors.push(e),
            }
        }
    }

    ConvertError::collect(errors)?;
    Ok(files)
}

fn service_file(
    csv: &ClusterServiceVersion,
    deployment: &str,
    webhooks: &[&WebhookDescription],
    config: &CertificateConfig,
    provider: &dyn CertificateProvider,
) -> Result<TemplateFile> {
    let spec = csv
        .deployments()
        .iter()
        .find(|d| d.name == deployment)
        .ok_or_else(|| ConvertError::InvalidObject {
            kind: "Service".to_string(),
            name: config.webhook_service_name.clone(),
            message: format!("webhooks reference missing deployment {:?}", deployment),
        })?;

    let mut ports: Vec<ServicePort> = Vec::new();
    for webhook in webhooks {
        let port = ServicePort {
            name: Some(webhook.service_port().to_string()),
            port: webhook.service_port(),
            target_port: Some(webhook.target_port()),
            ..Default::default()
        };
        if !ports.contains(&port) {
            ports.push(port);
        }
    }
    ports.sort_by(|a, b| a.name.cmp(&b.name));

    let service = Service {
        metadata: ObjectMeta {
            name: Some(config.webhook_service_name.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(spec.spec.selector.match_labels.clone().unwrap_or_default()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let selector = format!(
        "((values.selector | default(none)) or {}.selector).matchLabels | default({{}}) | toyaml | nindent(4)",
        defaults_expr(deployment)
    );
    let mut object = TemplateObject::from_resource(&service)?
        .in_release_namespace()
        .with(Instruction::value(selector, "spec.selector"));
    provider.modify_service(&mut object, config);

    Ok(object.into_file()?.importing(DEPLOYMENTS_TPL, &[DEPLOYMENT_DEFAULTS]))
}

fn client_config(webhook: &WebhookDescription, config: &CertificateConfig) -> WebhookClientConfig {
    WebhookClientConfig {
        service: Some(ServiceReference {
            name: config.webhook_service_name.clone(),
            namespace: String::new(),
            path: webhook.webhook_path.clone(),
            port: Some(webhook.service_port()),
        }),
        ..Default::default()
    }
}

fn registration_metadata(webhook: &WebhookDescription) -> ObjectMeta {
    ObjectMeta {
        name: Some(webhook.generate_name.clone()),
        ..Default::default()
    }
}

fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    (!items.is_empty()).then(|| items.to_vec())
}

fn validating_webhook(
    webhook: &WebhookDescription,
    config: &CertificateConfig,
    provider: &dyn CertificateProvider,
) -> Result<TemplateObject> {
    let registration = ValidatingWebhookConfiguration {
        metadata: registration_metadata(webhook),
        webhooks: Some(vec![ValidatingWebhook {
            name: webhook.generate_name.clone(),
            rules: non_empty(&webhook.rules),
            failure_policy: webhook.failure_policy.clone(),
            match_policy: webhook.match_policy.clone(),
            object_selector: webhook.object_selector.clone(),
            side_effects: webhook
                .side_effects
                .clone()
                .unwrap_or_else(|| DEFAULT_SIDE_EFFECTS.to_string()),
            timeout_seconds: webhook.timeout_seconds,
            admission_review_versions: webhook.admission_review_versions.clone(),
            client_config: client_config(webhook, config),
            ..Default::default()
        }]),
    };

    let mut object = TemplateObject::from_resource(&registration)?.with(Instruction::value(
        RELEASE_NAMESPACE,
        "webhooks.0.clientConfig.service.namespace",
    ));
    provider.modify_validating_webhook(&mut object, config);
    Ok(object)
}

fn mutating_webhook(
    webhook: &WebhookDescription,
    config: &CertificateConfig,
    provider: &dyn CertificateProvider,
) -> Result<TemplateObject> {
    let registration = MutatingWebhookConfiguration {
        metadata: registration_metadata(webhook),
        webhooks: Some(vec![MutatingWebhook {
            name: webhook.generate_name.clone(),
            rules: non_empty(&webhook.rules),
            failure_policy: webhook.failure_policy.clone(),
            match_policy: webhook.match_policy.clone(),
            object_selector: webhook.object_selector.clone(),
            side_effects: webhook
                .side_effects
                .clone()
                .unwrap_or_else(|| DEFAULT_SIDE_EFFECTS.to_string()),
            timeout_seconds: webhook.timeout_seconds,
            admission_review_versions: webhook.admission_review_versions.clone(),
            client_config: client_config(webhook, config),
            reinvocation_policy: webhook.reinvocation_policy.clone(),
            ..Default::default()
        }]),
    };

    let mut object = TemplateObject::from_resource(&registration)?.with(Instruction::value(
        RELEASE_NAMESPACE,
        "webhooks.0.clientConfig.service.namespace",
    ));
    provider.modify_mutating_webhook(&mut object, config);
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certprovider::CertManager;

    fn csv() -> ClusterServiceVersion {
        serde_yaml::from_str(
            r#"
metadata:
  name: webhook-operator.v0.0.1
spec:
  install:
    strategy: deployment
    spec:
      deployments:
      - name: webhook-operator.webhook
        spec:
          selector:
            matchLabels:
              app: webhook
          template:
            spec:
              containers:
              - name: manager
                image: quay.io/example/webhook-operator:v0.0.1
  webhookdefinitions:
  - generateName: vwebhooktest.kb.io
    type: ValidatingAdmissionWebhook
    deploymentName: webhook-operator.webhook
    containerPort: 8443
    sideEffects: None
    admissionReviewVersions: [v1]
    webhookPath: /validate
    rules:
    - operations: [CREATE]
      apiGroups: [webhook.operators.coreos.io]
      apiVersions: [v1]
      resources: [webhooktests]
  - generateName: mwebhooktest.kb.io
    type: MutatingAdmissionWebhook
    deploymentName: webhook-operator.webhook
    containerPort: 8443
    admissionReviewVersions: [v1]
    reinvocationPolicy: IfNeeded
  - generateName: cwebhooktest.kb.io
    type: ConversionWebhook
    deploymentName: webhook-operator.webhook
    containerPort: 443
    targetPort: 4343
    admissionReviewVersions: [v1]
    conversionCRDs: [webhooktests.webhook.operators.coreos.io]
"#,
        )
        .unwrap()
    }

    fn file<'a>(files: &'a [TemplateFile], path: &str) -> &'a TemplateFile {
        files
            .iter()
            .find(|f| f.path == path)
            .unwrap_or_else(|| panic!("missing {}", path))
    }

    #[test]
    fn test_files_per_deployment() {
        let files = webhook_files(&csv(), &CertManager).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(
            paths,
            vec![
                "templates/core.Service-webhook-operator-webhook-service.yaml",
                "templates/cert-manager.io.Issuer-webhook-operator.v0.0.1-webhook-operator.webh-selfsigned-issuer.yaml",
                "templates/cert-manager.io.Certificate-webhook-operator.v0.0.1-webhook-operator.webhook-cert.yaml",
                "templates/admissionregistration.k8s.io.ValidatingWebhookConfiguration-vwebhooktest.kb.io.yaml",
                "templates/admissionregistration.k8s.io.MutatingWebhookConfiguration-mwebhooktest.kb.io.yaml",
            ]
        );
    }

    #[test]
    fn test_service_ports_are_sorted_and_unique() {
        let files = webhook_files(&csv(), &CertManager).unwrap();
        let service = &file(&files, "templates/core.Service-webhook-operator-webhook-service.yaml").content;

        let port_443 = service.find("name: '443'").unwrap();
        let port_8443 = service.find("name: '8443'").unwrap();
        assert!(port_443 < port_8443);
        assert_eq!(service.matches("name: '8443'").count(), 1);
        assert!(service.contains("targetPort: 4343"));
        assert!(service.starts_with(
            "{%- from \"_helpers.deployments.tpl\" import deployment_defaults %}\n"
        ));
        assert!(service.contains(
            "  selector: {{ ((values.selector | default(none)) or (deployment_defaults(\"webhook-operator.webhook\") | fromyaml).selector).matchLabels | default({}) | toyaml | nindent(4) }}"
        ));
    }

    #[test]
    fn test_registrations() {
        let files = webhook_files(&csv(), &CertManager).unwrap();
        let validating = &file(
            &files,
            "templates/admissionregistration.k8s.io.ValidatingWebhookConfiguration-vwebhooktest.kb.io.yaml",
        )
        .content;
        assert!(validating.contains("namespace: {{ release.namespace | tojson }}"));
        assert!(validating.contains("path: /validate"));
        assert!(validating.contains("cert-manager.io/inject-ca-from: {{"));

        let mutating = &file(
            &files,
            "templates/admissionregistration.k8s.io.MutatingWebhookConfiguration-mwebhooktest.kb.io.yaml",
        )
        .content;
        assert!(mutating.contains("reinvocationPolicy: IfNeeded"));
        assert!(mutating.contains("sideEffects: None"));
    }

    #[test]
    fn test_certificate_secrets() {
        let secrets = certificate_secrets(&csv(), &CertManager);
        assert_eq!(
            secrets["webhook-operator.webhook"].secret_name,
            "webhook-operator.v0.0.1-webhook-operator.webhook-cert"
        );
    }
}

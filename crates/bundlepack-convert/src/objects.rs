//! Objects shipped in the bundle: CRDs and static manifests

use bundlepack_core::{Bundle, WebhookAdmissionType, WebhookDescription};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceConversion, CustomResourceDefinition, ServiceReference, WebhookClientConfig,
    WebhookConversion,
};
use serde_json::Value as JsonValue;

use crate::certprovider::{CertificateConfig, CertificateProvider};
use crate::error::{ConvertError, Result};
use crate::manifest::{RELEASE_NAMESPACE, TemplateFile, TemplateObject};
use crate::parametrize::Instruction;

const WEBHOOK_CONVERSION: &str = "Webhook";
const CONVERSION_SERVICE_NAMESPACE: &str = "spec.conversion.webhook.clientConfig.service.namespace";

/// Drop server-populated fields and the namespace, which the installer sets
fn clean(object: &mut JsonValue) {
    if let Some(map) = object.as_object_mut() {
        map.remove("status");
    }
    if let Some(metadata) = object.get_mut("metadata").and_then(JsonValue::as_object_mut) {
        metadata.remove("namespace");
        metadata.remove("creationTimestamp");
    }
}

/// Static manifests, passed through as they are
pub fn passthrough_files(bundle: &Bundle) -> Result<Vec<TemplateFile>> {
    let mut files = Vec::with_capacity(bundle.others.len());
    let mut errors = Vec::new();
    for object in &bundle.others {
        let mut object = object.clone();
        clean(&mut object);
        match TemplateObject::new(object).into_file() {
            Ok(file) => files.push(file),
            Err(e) => errors.push(e),
        }
    }
    ConvertError::collect(errors)?;
    Ok(files)
}

/// The conversion webhook targeting `crd`, if any
fn conversion_webhook<'a>(bundle: &'a Bundle, crd: &str) -> Option<&'a WebhookDescription> {
    bundle.csv.spec.webhook_definitions.iter().find(|w| {
        w.webhook_type == WebhookAdmissionType::ConversionWebhook
            && w.conversion_crds.iter().any(|c| c == crd)
    })
}

/// CRDs, with conversion webhooks pointed at the generated service
///
/// A provider is required as soon as one CRD gets a conversion webhook.
pub fn crd_files(bundle: &Bundle, provider: Option<&dyn CertificateProvider>) -> Result<Vec<TemplateFile>> {
    let mut errors = missing_conversion_crds(bundle);
    let mut files = Vec::with_capacity(bundle.crds.len());

    for crd in &bundle.crds {
        match crd_file(bundle, crd, provider) {
            Ok(file) => files.push(file),
            Err(e) => errors.push(e),
        }
    }

    ConvertError::collect(errors)?;
    Ok(files)
}

fn crd_file(
    bundle: &Bundle,
    crd: &CustomResourceDefinition,
    provider: Option<&dyn CertificateProvider>,
) -> Result<TemplateFile> {
    let name = crd.metadata.name.clone().unwrap_or_default();
    let mut crd = crd.clone();
    let webhook = conversion_webhook(bundle, &name);

    if let Some(webhook) = webhook {
        if crd.spec.preserve_unknown_fields == Some(true) {
            return Err(ConvertError::InvalidObject {
                kind: "CustomResourceDefinition".to_string(),
                name,
                message: "spec.preserveUnknownFields is true; it must be false for the API server \
                          to call the conversion webhook"
                    .to_string(),
            });
        }
        crd.spec.conversion = Some(webhook_conversion(bundle, webhook));
    }

    let has_webhook_service = crd.spec.conversion.as_ref().is_some_and(|c| {
        c.strategy == WEBHOOK_CONVERSION
            && c.webhook
                .as_ref()
                .and_then(|w| w.client_config.as_ref())
                .is_some_and(|c| c.service.is_some())
    });

    let mut value = serde_json::to_value(&crd)?;
    clean(&mut value);
    let mut object = TemplateObject::new(value);
    if has_webhook_service {
        object.push(Instruction::value(RELEASE_NAMESPACE, CONVERSION_SERVICE_NAMESPACE));
    }

    if let Some(webhook) = webhook {
        let provider = provider.ok_or_else(|| ConvertError::MissingCertificateProvider {
            deployment: webhook.deployment_name.clone(),
        })?;
        let config = CertificateConfig::new(bundle.csv.name(), &webhook.deployment_name);
        provider.modify_crd(&mut object, &config);
        tracing::debug!(crd = %name, webhook = %webhook.generate_name, "wired conversion webhook");
    }

    object.into_file()
}

fn webhook_conversion(bundle: &Bundle, webhook: &WebhookDescription) -> CustomResourceConversion {
    let config = CertificateConfig::new(bundle.csv.name(), &webhook.deployment_name);
    CustomResourceConversion {
        strategy: WEBHOOK_CONVERSION.to_string(),
        webhook: Some(WebhookConversion {
            client_config: Some(WebhookClientConfig {
                service: Some(ServiceReference {
                    name: config.webhook_service_name,
                    namespace: String::new(),
                    path: Some(webhook.webhook_path.clone().unwrap_or_else(|| "/".to_string())),
                    port: Some(webhook.service_port()),
                }),
                ..Default::default()
            }),
            conversion_review_versions: webhook.admission_review_versions.clone(),
        }),
    }
}

/// Conversion targets that are not owned CRDs of the bundle
fn missing_conversion_crds(bundle: &Bundle) -> Vec<ConvertError> {
    let owned = &bundle.csv.spec.custom_resource_definitions.owned;
    bundle
        .csv
        .spec
        .webhook_definitions
        .iter()
        .filter(|w| w.webhook_type == WebhookAdmissionType::ConversionWebhook)
        .flat_map(|w| w.conversion_crds.iter().map(move |crd| (w, crd)))
        .filter(|(_, crd)| {
            let shipped = bundle
                .crds
                .iter()
                .any(|c| c.metadata.name.as_deref() == Some(crd.as_str()));
            !shipped || !owned.iter().any(|o| &o.name == *crd)
        })
        .map(|(webhook, crd)| ConvertError::InvalidObject {
            kind: "CustomResourceDefinition".to_string(),
            name: crd.clone(),
            message: format!(
                "targeted by conversion webhook {:?} but not an owned CRD of the bundle",
                webhook.generate_name
            ),
        })
        .collect()
}

//! Operator deployments
//!
//! The fields cluster administrators commonly override are moved out of the
//! deployment literal into the `deployment_defaults` helper, and merged back
//! at render time through `deployment_overrides`, which lets user values win.

use bundlepack_core::{ClusterServiceVersion, StrategyDeploymentSpec};
use k8s_openapi::api::core::v1::{KeyToPath, PodSpec, SecretVolumeSource, Volume, VolumeMount};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;

use crate::certprovider::CertSecretInfo;
use crate::error::{ConvertError, Result};
use crate::helpers::{
    DEPLOYMENT_DEFAULTS, DEPLOYMENT_OVERRIDES, DEPLOYMENTS_TPL, TARGET_NAMESPACES,
    TARGET_NAMESPACES_EXPR, TARGET_NAMESPACES_TPL,
};
use crate::manifest::{TemplateFile, TemplateObject};
use crate::parametrize::{Instruction, quote};

/// Pod template annotation listing the watched namespaces
pub const TARGET_NAMESPACES_ANNOTATION: &str = "olm.targetNamespaces";

/// Pod spec fields resolved through `deployment_defaults`
pub const POD_OVERRIDES: [&str; 4] = ["affinity", "nodeSelector", "tolerations", "volumes"];

/// Container fields resolved through `deployment_defaults`
pub const CONTAINER_OVERRIDES: [&str; 4] = ["env", "envFrom", "resources", "volumeMounts"];

const APISERVICE_CERT_VOLUME: &str = "apiservice-cert";
const APISERVICE_CERT_PATH: &str = "/apiserver.local.config/certificates";
const WEBHOOK_CERT_VOLUME: &str = "webhook-cert";
const WEBHOOK_CERT_PATH: &str = "/tmp/k8s-webhook-server/serving-certs";

/// Deployment templates plus the defaults the helper must carry
#[derive(Debug, Default)]
pub struct Deployments {
    pub files: Vec<TemplateFile>,
    /// Overridable literal values, by deployment name
    pub defaults: BTreeMap<String, JsonValue>,
}

/// Expression yielding the merged overrides for deployment `name`
pub fn overrides_expr(name: &str) -> String {
    format!(
        "{}(values, {}({}) | fromyaml, {}) | fromyaml",
        DEPLOYMENT_OVERRIDES,
        DEPLOYMENT_DEFAULTS,
        quote(name),
        TARGET_NAMESPACES_EXPR
    )
}

/// Expression yielding the literal defaults of deployment `name`
pub fn defaults_expr(name: &str) -> String {
    format!("({}({}) | fromyaml)", DEPLOYMENT_DEFAULTS, quote(name))
}

/// Build every deployment of the CSV
///
/// `certificates` holds the serving certificate secret of each deployment
/// that serves webhooks.
pub fn deployment_files(
    csv: &ClusterServiceVersion,
    certificates: &BTreeMap<String, CertSecretInfo>,
) -> Result<Deployments> {
    let mut deployments = Deployments::default();
    let mut errors = Vec::new();

    for deployment in csv.deployments() {
        let built = deployment_file(csv, deployment, certificates.get(&deployment.name));
        match built {
            Ok((file, defaults)) => {
                deployments.files.push(file);
                deployments.defaults.insert(deployment.name.clone(), defaults);
            }
            Err(e) => errors.push(e),
        }
    }

    ConvertError::collect(errors)?;
    Ok(deployments)
}

fn deployment_file(
    csv: &ClusterServiceVersion,
    deployment: &StrategyDeploymentSpec,
    certificate: Option<&CertSecretInfo>,
) -> Result<(TemplateFile, JsonValue)> {
    let mut spec = deployment.spec.clone();
    spec.revision_history_limit = Some(1);

    let pod_metadata = spec.template.metadata.get_or_insert_with(Default::default);
    let mut annotations = csv.annotations();
    annotations.extend(pod_metadata.annotations.take().unwrap_or_default());
    annotations.remove(TARGET_NAMESPACES_ANNOTATION);
    pod_metadata.annotations = Some(annotations);

    let pod = spec.template.spec.get_or_insert_with(Default::default);
    if let Some(certificate) = certificate {
        inject_certificate(pod, certificate);
    }

    let mut defaults = Map::new();
    defaults.insert("selector".to_string(), serde_json::to_value(&spec.selector)?);
    insert_some(&mut defaults, "affinity", pod.affinity.take())?;
    insert_some(&mut defaults, "nodeSelector", pod.node_selector.take())?;
    insert_some(&mut defaults, "tolerations", pod.tolerations.take())?;
    insert_some(&mut defaults, "volumes", pod.volumes.take())?;
    defaults.insert("containers".to_string(), serde_json::to_value(&pod.containers)?);

    for container in &mut pod.containers {
        container.env = None;
        container.env_from = None;
        container.resources = None;
        container.volume_mounts = None;
    }

    let mut spec = serde_json::to_value(&spec)?;
    if let Some(spec) = spec.as_object_mut() {
        spec.remove("selector");
    }

    let mut metadata = json!({"name": deployment.name});
    if !deployment.label.is_empty() {
        metadata["labels"] = serde_json::to_value(&deployment.label)?;
    }
    let object = TemplateObject::new(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata,
        "spec": spec
    }))
    .in_release_namespace()
    .with(Instruction::merge(overrides_expr(&deployment.name), "spec"));

    let file = object
        .into_file()?
        .importing(TARGET_NAMESPACES_TPL, &[TARGET_NAMESPACES])
        .importing(DEPLOYMENTS_TPL, &[DEPLOYMENT_DEFAULTS, DEPLOYMENT_OVERRIDES]);

    tracing::debug!(deployment = %deployment.name, path = %file.path, "generated deployment template");
    Ok((file, JsonValue::Object(defaults)))
}

fn insert_some<T: Serialize>(map: &mut Map<String, JsonValue>, key: &str, value: Option<T>) -> Result<()> {
    if let Some(value) = value {
        map.insert(key.to_string(), serde_json::to_value(value)?);
    }
    Ok(())
}

/// Mount the serving certificate where operator SDK based webhooks look for it
fn inject_certificate(pod: &mut PodSpec, certificate: &CertSecretInfo) {
    let secret_volume = |name: &str, cert_path: &str, key_path: &str| Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(certificate.secret_name.clone()),
            items: Some(vec![
                KeyToPath {
                    key: certificate.certificate_key.clone(),
                    path: cert_path.to_string(),
                    ..Default::default()
                },
                KeyToPath {
                    key: certificate.private_key_key.clone(),
                    path: key_path.to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mount = |name: &str, path: &str| VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    };

    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    volumes.retain(|v| v.name != APISERVICE_CERT_VOLUME && v.name != WEBHOOK_CERT_VOLUME);
    volumes.push(secret_volume(APISERVICE_CERT_VOLUME, "apiserver.crt", "apiserver.key"));
    volumes.push(secret_volume(WEBHOOK_CERT_VOLUME, "tls.crt", "tls.key"));

    for container in &mut pod.containers {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        mounts.retain(|m| m.name != APISERVICE_CERT_VOLUME && m.name != WEBHOOK_CERT_VOLUME);
        mounts.push(mount(APISERVICE_CERT_VOLUME, APISERVICE_CERT_PATH));
        mounts.push(mount(WEBHOOK_CERT_VOLUME, WEBHOOK_CERT_PATH));
    }
}

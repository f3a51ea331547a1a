//! registry+v1 operator bundle model
//!
//! A bundle is a `ClusterServiceVersion` (the service-version descriptor),
//! the custom resource definitions it owns, and any other static manifests
//! shipped next to them. Only the descriptor fields the conversion reads are
//! modelled; everything else is ignored when deserializing.

use k8s_openapi::api::admissionregistration::v1::RuleWithOperations;
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::rbac::v1::PolicyRule;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Annotation holding the JSON-encoded property list of a bundle
pub const PROPERTIES_ANNOTATION: &str = "olm.properties";

/// An already-loaded registry+v1 bundle
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Package name from `metadata/annotations.yaml`
    pub package_name: String,

    /// The service-version descriptor
    pub csv: ClusterServiceVersion,

    /// Custom resource definitions shipped in `manifests/`
    pub crds: Vec<CustomResourceDefinition>,

    /// Every other manifest, kept unstructured
    pub others: Vec<JsonValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersion {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ClusterServiceVersionSpec,
}

impl ClusterServiceVersion {
    /// Descriptor name, empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Descriptor annotations, empty when unset
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.metadata.annotations.clone().unwrap_or_default()
    }

    /// Install modes flagged as supported, in declaration order, without duplicates
    pub fn supported_install_modes(&self) -> Vec<InstallModeType> {
        let mut modes = Vec::new();
        for mode in &self.spec.install_modes {
            if mode.supported && !modes.contains(&mode.mode_type) {
                modes.push(mode.mode_type);
            }
        }
        modes
    }

    pub fn deployments(&self) -> &[StrategyDeploymentSpec] {
        &self.spec.install.spec.deployments
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub maintainers: Vec<Maintainer>,

    #[serde(default)]
    pub provider: Option<AppProvider>,

    #[serde(default)]
    pub links: Vec<AppLink>,

    #[serde(default)]
    pub min_kube_version: Option<String>,

    #[serde(default)]
    pub install_modes: Vec<InstallMode>,

    #[serde(default)]
    pub install: NamedInstallStrategy,

    #[serde(default, rename = "customresourcedefinitions")]
    pub custom_resource_definitions: CustomResourceDefinitions,

    #[serde(default, rename = "apiservicedefinitions")]
    pub api_service_definitions: ApiServiceDefinitions,

    #[serde(default, rename = "webhookdefinitions")]
    pub webhook_definitions: Vec<WebhookDescription>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppProvider {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppLink {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// One of the four namespace-scoping regimes an operator can support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstallModeType {
    AllNamespaces,
    OwnNamespace,
    SingleNamespace,
    MultiNamespace,
}

impl fmt::Display for InstallModeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallModeType::AllNamespaces => "AllNamespaces",
            InstallModeType::OwnNamespace => "OwnNamespace",
            InstallModeType::SingleNamespace => "SingleNamespace",
            InstallModeType::MultiNamespace => "MultiNamespace",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallMode {
    #[serde(rename = "type")]
    pub mode_type: InstallModeType,
    #[serde(default)]
    pub supported: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedInstallStrategy {
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub spec: StrategyDetailsDeployment,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDetailsDeployment {
    #[serde(default)]
    pub deployments: Vec<StrategyDeploymentSpec>,
    #[serde(default)]
    pub permissions: Vec<StrategyDeploymentPermissions>,
    #[serde(default)]
    pub cluster_permissions: Vec<StrategyDeploymentPermissions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDeploymentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub label: BTreeMap<String, String>,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDeploymentPermissions {
    pub service_account_name: String,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomResourceDefinitions {
    #[serde(default)]
    pub owned: Vec<CrdDescription>,
    #[serde(default)]
    pub required: Vec<CrdDescription>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrdDescription {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

/// API service definitions are parsed only so they can be rejected
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiServiceDefinitions {
    #[serde(default)]
    pub owned: Vec<JsonValue>,
    #[serde(default)]
    pub required: Vec<JsonValue>,
}

impl ApiServiceDefinitions {
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty() && self.required.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WebhookAdmissionType {
    ValidatingAdmissionWebhook,
    MutatingAdmissionWebhook,
    ConversionWebhook,
}

impl fmt::Display for WebhookAdmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WebhookAdmissionType::ValidatingAdmissionWebhook => "ValidatingAdmissionWebhook",
            WebhookAdmissionType::MutatingAdmissionWebhook => "MutatingAdmissionWebhook",
            WebhookAdmissionType::ConversionWebhook => "ConversionWebhook",
        };
        f.write_str(s)
    }
}

/// A webhook the operator's deployment serves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDescription {
    pub generate_name: String,

    #[serde(rename = "type")]
    pub webhook_type: WebhookAdmissionType,

    pub deployment_name: String,

    #[serde(default)]
    pub container_port: Option<i32>,

    #[serde(default)]
    pub target_port: Option<IntOrString>,

    #[serde(default)]
    pub rules: Vec<RuleWithOperations>,

    #[serde(default)]
    pub failure_policy: Option<String>,

    #[serde(default)]
    pub match_policy: Option<String>,

    #[serde(default)]
    pub object_selector: Option<LabelSelector>,

    #[serde(default)]
    pub side_effects: Option<String>,

    #[serde(default)]
    pub timeout_seconds: Option<i32>,

    #[serde(default)]
    pub admission_review_versions: Vec<String>,

    #[serde(default)]
    pub reinvocation_policy: Option<String>,

    #[serde(default)]
    pub webhook_path: Option<String>,

    #[serde(default, rename = "conversionCRDs")]
    pub conversion_crds: Vec<String>,
}

impl WebhookDescription {
    /// Port the webhook service listens on
    pub fn service_port(&self) -> i32 {
        match self.container_port {
            Some(port) if port > 0 => port,
            _ => 443,
        }
    }

    /// Container port the service forwards to
    pub fn target_port(&self) -> IntOrString {
        self.target_port
            .clone()
            .unwrap_or(IntOrString::Int(self.service_port()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = r#"
apiVersion: operators.coreos.com/v1alpha1
kind: ClusterServiceVersion
metadata:
  name: memcached-operator.v0.0.1
  annotations:
    capabilities: Basic Install
spec:
  version: 0.0.1
  installModes:
  - type: OwnNamespace
    supported: true
  - type: SingleNamespace
    supported: false
  - type: AllNamespaces
    supported: true
  install:
    strategy: deployment
    spec:
      deployments:
      - name: memcached-operator-controller-manager
        spec:
          selector:
            matchLabels:
              control-plane: controller-manager
          template:
            metadata:
              labels:
                control-plane: controller-manager
            spec:
              containers:
              - name: manager
                image: quay.io/example/memcached-operator:v0.0.1
      permissions:
      - serviceAccountName: memcached-operator-controller-manager
        rules:
        - apiGroups: [""]
          resources: [configmaps]
          verbs: [get, list]
  webhookdefinitions:
  - generateName: vmemcached.kb.io
    type: ValidatingAdmissionWebhook
    deploymentName: memcached-operator-controller-manager
    containerPort: 9443
    admissionReviewVersions: [v1]
"#;

    #[test]
    fn test_parse_csv() {
        let csv: ClusterServiceVersion = serde_yaml::from_str(CSV).unwrap();

        assert_eq!(csv.name(), "memcached-operator.v0.0.1");
        assert_eq!(csv.spec.version.as_deref(), Some("0.0.1"));
        assert_eq!(
            csv.supported_install_modes(),
            vec![InstallModeType::OwnNamespace, InstallModeType::AllNamespaces]
        );
        assert_eq!(csv.deployments().len(), 1);
        assert_eq!(csv.spec.install.spec.permissions[0].rules[0].verbs, vec!["get", "list"]);
        assert_eq!(
            csv.annotations().get("capabilities").map(String::as_str),
            Some("Basic Install")
        );
    }

    #[test]
    fn test_webhook_ports() {
        let csv: ClusterServiceVersion = serde_yaml::from_str(CSV).unwrap();
        let webhook = &csv.spec.webhook_definitions[0];

        assert_eq!(webhook.webhook_type, WebhookAdmissionType::ValidatingAdmissionWebhook);
        assert_eq!(webhook.service_port(), 9443);
        assert_eq!(webhook.target_port(), IntOrString::Int(9443));

        let mut defaulted = webhook.clone();
        defaulted.container_port = None;
        assert_eq!(defaulted.service_port(), 443);
    }

    #[test]
    fn test_install_mode_display() {
        assert_eq!(InstallModeType::MultiNamespace.to_string(), "MultiNamespace");
    }
}

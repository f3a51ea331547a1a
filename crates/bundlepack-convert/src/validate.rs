//! Bundle checks run before any template is generated
//!
//! Every check runs; their failures are reported together.

use bundlepack_core::{Bundle, InstallModeType, WebhookAdmissionType, WebhookDescription};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConvertError, Result};

/// Kinds a bundle may ship besides its CSV and CRDs
pub const SUPPORTED_KINDS: &[&str] = &[
    "ClusterRole",
    "ClusterRoleBinding",
    "PriorityClass",
    "ConsoleYAMLSample",
    "ConsoleQuickStart",
    "ConsoleCLIDownload",
    "ConsoleLink",
    "ConsolePlugin",
    "Secret",
    "ConfigMap",
    "ServiceAccount",
    "Service",
    "Role",
    "RoleBinding",
    "PrometheusRule",
    "ServiceMonitor",
    "PodDisruptionBudget",
    "VerticalPodAutoscaler",
    "NetworkPolicy",
];

const MAX_SUBDOMAIN_LENGTH: usize = 253;

static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS-1123 subdomain regex compiles")
});

const FORBIDDEN_RULE_GROUPS: &[&str] = &["*", "olm.operatorframework.io"];

const ADMISSION_REGISTRATION_GROUP: &str = "admissionregistration.k8s.io";

const FORBIDDEN_ADMISSION_RESOURCES: &[&str] = &[
    "*",
    "mutatingwebhookconfiguration",
    "mutatingwebhookconfigurations",
    "validatingwebhookconfiguration",
    "validatingwebhookconfigurations",
];

type Check = fn(&Bundle) -> Vec<String>;

const CHECKS: &[Check] = &[
    deployment_names_unique,
    deployment_names_valid,
    owned_crds_exist,
    crds_unique,
    package_name_present,
    webhook_deployments_exist,
    webhook_names_unique,
    webhook_names_valid,
    conversion_webhooks_own_crds,
    conversion_crds_unique,
    webhook_rules_allowed,
    conversion_webhook_install_modes,
    no_api_services,
];

/// Run every check on `bundle`
pub fn validate(bundle: &Bundle) -> Result<()> {
    let mut errors: Vec<ConvertError> = CHECKS
        .iter()
        .flat_map(|check| check(bundle))
        .map(ConvertError::InvalidBundle)
        .collect();
    errors.extend(unsupported_kinds(bundle));

    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), "bundle failed validation");
    }
    ConvertError::collect(errors)
}

/// Problems with `name` as a DNS-1123 subdomain, empty when valid
pub fn dns1123_subdomain_errors(name: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if name.len() > MAX_SUBDOMAIN_LENGTH {
        errors.push(format!("must be no more than {} characters", MAX_SUBDOMAIN_LENGTH));
    }
    if !DNS1123_SUBDOMAIN.is_match(name) {
        errors.push(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, \
             '-' or '.', and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    errors
}

fn duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    names.into_iter().filter(|name| !seen.insert(*name)).collect()
}

fn deployment_names_unique(bundle: &Bundle) -> Vec<String> {
    duplicates(bundle.csv.deployments().iter().map(|d| d.name.as_str()))
        .into_iter()
        .map(|name| format!("cluster service version contains duplicate strategy deployment spec {:?}", name))
        .collect()
}

fn deployment_names_valid(bundle: &Bundle) -> Vec<String> {
    let names: BTreeSet<&str> = bundle.csv.deployments().iter().map(|d| d.name.as_str()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let errors = dns1123_subdomain_errors(name);
            (!errors.is_empty()).then(|| {
                format!(
                    "invalid cluster service version strategy deployment name {:?}: {}",
                    name,
                    errors.join(", ")
                )
            })
        })
        .collect()
}

fn crd_names(bundle: &Bundle) -> impl Iterator<Item = &str> {
    bundle.crds.iter().filter_map(|crd| crd.metadata.name.as_deref())
}

fn owned_crds_exist(bundle: &Bundle) -> Vec<String> {
    let shipped: BTreeSet<&str> = crd_names(bundle).collect();
    let missing: BTreeSet<&str> = bundle
        .csv
        .spec
        .custom_resource_definitions
        .owned
        .iter()
        .map(|crd| crd.name.as_str())
        .filter(|name| !shipped.contains(name))
        .collect();
    missing
        .into_iter()
        .map(|name| {
            format!(
                "cluster service version references owned custom resource definition {:?} not found in bundle",
                name
            )
        })
        .collect()
}

fn crds_unique(bundle: &Bundle) -> Vec<String> {
    duplicates(crd_names(bundle))
        .into_iter()
        .map(|name| format!("bundle contains duplicate custom resource definition {:?}", name))
        .collect()
}

fn package_name_present(bundle: &Bundle) -> Vec<String> {
    if bundle.package_name.is_empty() {
        vec!["package name is empty".to_string()]
    } else {
        Vec::new()
    }
}

fn sorted_webhooks(bundle: &Bundle) -> Vec<&WebhookDescription> {
    let mut webhooks: Vec<&WebhookDescription> = bundle.csv.spec.webhook_definitions.iter().collect();
    webhooks.sort_by(|a, b| {
        (a.webhook_type, &a.generate_name).cmp(&(b.webhook_type, &b.generate_name))
    });
    webhooks
}

fn webhook_deployments_exist(bundle: &Bundle) -> Vec<String> {
    let deployments: BTreeSet<&str> = bundle.csv.deployments().iter().map(|d| d.name.as_str()).collect();
    let mut dangling: Vec<&WebhookDescription> = sorted_webhooks(bundle)
        .into_iter()
        .filter(|w| !deployments.contains(w.deployment_name.as_str()))
        .collect();
    dangling.sort_by(|a, b| a.deployment_name.cmp(&b.deployment_name));
    dangling
        .into_iter()
        .map(|w| {
            format!(
                "webhook of type {} with name {:?} references non-existent deployment {:?}",
                w.webhook_type, w.generate_name, w.deployment_name
            )
        })
        .collect()
}

fn webhook_names_unique(bundle: &Bundle) -> Vec<String> {
    let mut by_type: BTreeMap<WebhookAdmissionType, Vec<&str>> = BTreeMap::new();
    for webhook in &bundle.csv.spec.webhook_definitions {
        by_type
            .entry(webhook.webhook_type)
            .or_default()
            .push(webhook.generate_name.as_str());
    }
    by_type
        .into_iter()
        .flat_map(|(webhook_type, names)| {
            duplicates(names)
                .into_iter()
                .map(move |name| format!("duplicate webhook {:?} of type {}", name, webhook_type))
        })
        .collect()
}

fn webhook_names_valid(bundle: &Bundle) -> Vec<String> {
    sorted_webhooks(bundle)
        .into_iter()
        .filter_map(|w| {
            let errors = dns1123_subdomain_errors(&w.generate_name);
            (!errors.is_empty()).then(|| {
                format!(
                    "webhook of type {} has invalid name {:?}: {}",
                    w.webhook_type,
                    w.generate_name,
                    errors.join(", ")
                )
            })
        })
        .collect()
}

fn conversion_webhooks(bundle: &Bundle) -> impl Iterator<Item = &WebhookDescription> {
    sorted_webhooks(bundle)
        .into_iter()
        .filter(|w| w.webhook_type == WebhookAdmissionType::ConversionWebhook)
}

fn conversion_webhooks_own_crds(bundle: &Bundle) -> Vec<String> {
    let owned: BTreeSet<&str> = bundle
        .csv
        .spec
        .custom_resource_definitions
        .owned
        .iter()
        .map(|crd| crd.name.as_str())
        .collect();
    conversion_webhooks(bundle)
        .flat_map(|w| {
            let crds: BTreeSet<&str> = w.conversion_crds.iter().map(String::as_str).collect();
            crds.into_iter()
                .filter(|crd| !owned.contains(crd))
                .map(move |crd| {
                    format!(
                        "conversion webhook {:?} references custom resource definition {:?} not owned by the bundle",
                        w.generate_name, crd
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn conversion_crds_unique(bundle: &Bundle) -> Vec<String> {
    let mut webhooks_by_crd: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for webhook in conversion_webhooks(bundle) {
        for crd in &webhook.conversion_crds {
            webhooks_by_crd
                .entry(crd.as_str())
                .or_default()
                .insert(webhook.generate_name.as_str());
        }
    }
    webhooks_by_crd
        .into_iter()
        .filter(|(_, webhooks)| webhooks.len() > 1)
        .map(|(crd, webhooks)| {
            format!(
                "conversion webhooks [{}] reference the same custom resource definition {:?}",
                webhooks.into_iter().collect::<Vec<_>>().join(","),
                crd
            )
        })
        .collect()
}

fn webhook_rules_allowed(bundle: &Bundle) -> Vec<String> {
    let mut errors = Vec::new();
    for webhook in &bundle.csv.spec.webhook_definitions {
        if webhook.webhook_type == WebhookAdmissionType::ConversionWebhook {
            continue;
        }
        for rule in &webhook.rules {
            for group in rule.api_groups.iter().flatten() {
                if FORBIDDEN_RULE_GROUPS.contains(&group.as_str()) {
                    errors.push(format!(
                        "webhook {:?} contains forbidden rule: admission webhook rules cannot reference API group {:?}",
                        webhook.generate_name, group
                    ));
                }
                if group != ADMISSION_REGISTRATION_GROUP {
                    continue;
                }
                for resource in rule.resources.iter().flatten() {
                    if FORBIDDEN_ADMISSION_RESOURCES.contains(&resource.to_lowercase().as_str()) {
                        errors.push(format!(
                            "webhook {:?} contains forbidden rule: admission webhook rules cannot reference resource {:?} for API group {:?}",
                            webhook.generate_name, resource, group
                        ));
                    }
                }
            }
        }
    }
    errors
}

/// Conversion webhooks serve the whole cluster
fn conversion_webhook_install_modes(bundle: &Bundle) -> Vec<String> {
    let modes: BTreeSet<InstallModeType> = bundle.csv.supported_install_modes().into_iter().collect();
    if modes.len() == 1 && modes.contains(&InstallModeType::AllNamespaces) {
        return Vec::new();
    }
    let modes = modes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
    bundle
        .csv
        .spec
        .webhook_definitions
        .iter()
        .filter(|w| w.webhook_type == WebhookAdmissionType::ConversionWebhook)
        .map(|w| {
            format!(
                "bundle contains conversion webhook {:?} and supports install modes [{}]: \
                 conversion webhooks are only supported for bundles that only support AllNamespaces install mode",
                w.generate_name, modes
            )
        })
        .collect()
}

fn no_api_services(bundle: &Bundle) -> Vec<String> {
    if bundle.csv.spec.api_service_definitions.is_empty() {
        Vec::new()
    } else {
        vec!["apiServiceDefinitions are not supported".to_string()]
    }
}

fn unsupported_kinds(bundle: &Bundle) -> Vec<ConvertError> {
    bundle
        .others
        .iter()
        .filter_map(|object| {
            let kind = object.get("kind").and_then(|k| k.as_str()).unwrap_or_default();
            (!SUPPORTED_KINDS.contains(&kind)).then(|| ConvertError::UnsupportedKind {
                kind: kind.to_string(),
                name: object
                    .pointer("/metadata/name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlepack_core::ClusterServiceVersion;
    use serde_json::json;

    fn csv(yaml: &str) -> ClusterServiceVersion {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn bundle(csv: ClusterServiceVersion) -> Bundle {
        Bundle {
            package_name: "example".to_string(),
            csv,
            crds: Vec::new(),
            others: Vec::new(),
        }
    }

    const VALID: &str = r#"
metadata:
  name: example.v1.0.0
spec:
  installModes:
  - type: AllNamespaces
    supported: true
  install:
    strategy: deployment
    spec:
      deployments:
      - name: example-controller
        spec:
          selector:
            matchLabels:
              app: example
          template:
            spec:
              containers:
              - name: manager
                image: example:v1
"#;

    fn messages(err: ConvertError) -> String {
        err.to_string()
    }

    #[test]
    fn test_valid_bundle() {
        validate(&bundle(csv(VALID))).unwrap();
    }

    #[test]
    fn test_dns1123_subdomain() {
        assert!(dns1123_subdomain_errors("my-operator.v1").is_empty());
        assert!(!dns1123_subdomain_errors("My_Operator").is_empty());
        assert!(!dns1123_subdomain_errors("-leading").is_empty());
        assert_eq!(dns1123_subdomain_errors(&"a".repeat(254)).len(), 1);
    }

    #[test]
    fn test_deployment_checks() {
        let mut csv = csv(VALID);
        let mut deployment = csv.spec.install.spec.deployments[0].clone();
        csv.spec.install.spec.deployments.push(deployment.clone());
        deployment.name = "Bad_Name".to_string();
        csv.spec.install.spec.deployments.push(deployment);

        let err = messages(validate(&bundle(csv)).unwrap_err());
        assert!(err.contains("duplicate strategy deployment spec \"example-controller\""));
        assert!(err.contains("invalid cluster service version strategy deployment name \"Bad_Name\""));
    }

    #[test]
    fn test_missing_package_name_and_crd() {
        let mut csv = csv(VALID);
        csv.spec.custom_resource_definitions.owned = serde_yaml::from_str(
            "- {name: widgets.example.com, version: v1, kind: Widget}",
        )
        .unwrap();
        let mut bundle = bundle(csv);
        bundle.package_name.clear();

        let err = messages(validate(&bundle).unwrap_err());
        assert!(err.contains("package name is empty"));
        assert!(err.contains("\"widgets.example.com\" not found in bundle"));
    }

    #[test]
    fn test_webhook_checks() {
        let mut csv = csv(VALID);
        csv.spec.webhook_definitions = serde_yaml::from_str(
            r#"
- generateName: vwidget.example.com
  type: ValidatingAdmissionWebhook
  deploymentName: missing-controller
  admissionReviewVersions: [v1]
- generateName: vwidget.example.com
  type: ValidatingAdmissionWebhook
  deploymentName: example-controller
  admissionReviewVersions: [v1]
  rules:
  - apiGroups: ["*"]
    apiVersions: [v1]
    operations: [CREATE]
    resources: [widgets]
  - apiGroups: [admissionregistration.k8s.io]
    apiVersions: [v1]
    operations: [CREATE]
    resources: [ValidatingWebhookConfigurations]
"#,
        )
        .unwrap();

        let err = messages(validate(&bundle(csv)).unwrap_err());
        assert!(err.contains("references non-existent deployment \"missing-controller\""));
        assert!(err.contains("duplicate webhook \"vwidget.example.com\" of type ValidatingAdmissionWebhook"));
        assert!(err.contains("cannot reference API group \"*\""));
        assert!(err.contains("cannot reference resource \"ValidatingWebhookConfigurations\""));
    }

    #[test]
    fn test_conversion_webhook_checks() {
        let mut csv = csv(VALID);
        csv.spec.install_modes = serde_yaml::from_str(
            "[{type: AllNamespaces, supported: true}, {type: OwnNamespace, supported: true}]",
        )
        .unwrap();
        csv.spec.webhook_definitions = serde_yaml::from_str(
            r#"
- generateName: cwidget.example.com
  type: ConversionWebhook
  deploymentName: example-controller
  conversionCRDs: [widgets.example.com]
- generateName: cwidget2.example.com
  type: ConversionWebhook
  deploymentName: example-controller
  conversionCRDs: [widgets.example.com]
"#,
        )
        .unwrap();

        let err = messages(validate(&bundle(csv)).unwrap_err());
        assert!(err.contains("supports install modes [AllNamespaces, OwnNamespace]"));
        assert!(err.contains("references custom resource definition \"widgets.example.com\" not owned"));
        assert!(err.contains(
            "conversion webhooks [cwidget.example.com,cwidget2.example.com] reference the same custom resource definition"
        ));
    }

    #[test]
    fn test_unsupported_kind() {
        let mut bundle = bundle(csv(VALID));
        bundle.others.push(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {"name": "migrate"}
        }));
        bundle.others.push(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings"}
        }));

        let err = validate(&bundle).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnsupportedKind { ref kind, ref name } if kind == "Job" && name == "migrate"
        ));
    }
}

//! Shared helper templates
//!
//! Two helper files are generated for every chart:
//!
//! - `_helpers.target_namespaces.tpl` resolves, at render time, the
//!   namespaces the operator watches (a comma separated list, empty for all
//!   namespaces) and fails on values the bundle cannot honour;
//! - `_helpers.deployments.tpl` holds the literal defaults of every
//!   deployment's overridable fields and the macro merging them with the
//!   user's values.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::manifest::TemplateFile;
use crate::parametrize::quote;
use crate::scoping::{MAX_WATCH_NAMESPACES, ScopingConfig, ScopingField, TargetDefault};

pub const TARGET_NAMESPACES_TPL: &str = "_helpers.target_namespaces.tpl";
pub const DEPLOYMENTS_TPL: &str = "_helpers.deployments.tpl";

pub const TARGET_NAMESPACES: &str = "target_namespaces";
pub const DEPLOYMENT_DEFAULTS: &str = "deployment_defaults";
pub const DEPLOYMENT_OVERRIDES: &str = "deployment_overrides";

/// Expression evaluating to the resolved target namespace list
pub const TARGET_NAMESPACES_EXPR: &str = "target_namespaces(values, release) | trim";

fn helper_path(name: &str) -> String {
    format!("templates/{}", name)
}

/// `_helpers.target_namespaces.tpl` for a scoping configuration
pub fn target_namespaces(config: &ScopingConfig) -> TemplateFile {
    let body = match config.field {
        None => match config.default {
            TargetDefault::ReleaseNamespace => "{{- release.namespace -}}\n".to_string(),
            _ => String::new(),
        },
        Some(ScopingField::InstallMode) => install_mode_body(config),
        Some(ScopingField::WatchNamespace) => watch_namespace_body(config),
        Some(ScopingField::WatchNamespaces) => watch_namespaces_body(config),
    };

    TemplateFile::new(
        helper_path(TARGET_NAMESPACES_TPL),
        format!(
            "{{%- macro {}(values, release) -%}}\n{}{{%- endmacro %}}\n",
            TARGET_NAMESPACES, body
        ),
    )
}

fn install_mode_body(config: &ScopingConfig) -> String {
    let fallback = match config.default {
        TargetDefault::ReleaseNamespace => "OwnNamespace",
        _ => "AllNamespaces",
    };
    format!(
        r#"{{%- set mode = values.installMode | default(none) or {fallback} -%}}
{{%- if mode == "AllNamespaces" -%}}
{{%- elif mode == "OwnNamespace" -%}}
{{{{- release.namespace -}}}}
{{%- else -%}}
{{{{- fail("Unsupported install mode: " ~ mode ~ ", expected AllNamespaces or OwnNamespace") -}}}}
{{%- endif -%}}
"#,
        fallback = quote(fallback)
    )
}

fn watch_namespace_body(config: &ScopingConfig) -> String {
    let mut body = String::new();
    match config.default {
        TargetDefault::AllNamespaces => body.push_str(
            "{%- set ns = values.watchNamespace | default(none) or \"\" -%}\n",
        ),
        TargetDefault::ReleaseNamespace => body.push_str(
            "{%- set ns = values.watchNamespace | default(none) or release.namespace -%}\n",
        ),
        TargetDefault::Required => body.push_str(concat!(
            "{%- set ns = values.watchNamespace | default(none) -%}\n",
            "{%- if not ns -%}\n",
            "{{- fail(\"watchNamespace is required\") -}}\n",
            "{%- endif -%}\n",
        )),
    }
    if !config.allow_release_namespace {
        body.push_str(concat!(
            "{%- if ns == release.namespace -%}\n",
            "{{- fail(\"OwnNamespace mode is not supported: watchNamespace cannot be set to the install namespace \" ~ release.namespace) -}}\n",
            "{%- endif -%}\n",
        ));
    }
    body.push_str("{{- ns -}}\n");
    body
}

fn watch_namespaces_body(config: &ScopingConfig) -> String {
    let mut body = String::new();
    match config.default {
        TargetDefault::AllNamespaces => body.push_str(
            "{%- set nss = values.watchNamespaces | default(none) or [\"\"] -%}\n",
        ),
        TargetDefault::ReleaseNamespace => body.push_str(
            "{%- set nss = values.watchNamespaces | default(none) or [release.namespace] -%}\n",
        ),
        TargetDefault::Required => body.push_str(concat!(
            "{%- set nss = values.watchNamespaces | default(none) -%}\n",
            "{%- if not nss -%}\n",
            "{{- fail(\"watchNamespaces is required\") -}}\n",
            "{%- endif -%}\n",
        )),
    }
    body.push_str(&format!(
        concat!(
            "{{%- if nss | length > {max} -%}}\n",
            "{{{{- fail(\"watchNamespaces may contain at most {max} namespaces\") -}}}}\n",
            "{{%- endif -%}}\n",
        ),
        max = MAX_WATCH_NAMESPACES
    ));
    if !config.allow_release_namespace {
        body.push_str(concat!(
            "{%- if release.namespace in nss -%}\n",
            "{{- fail(\"OwnNamespace mode is not supported: watchNamespaces cannot include the install namespace \" ~ release.namespace) -}}\n",
            "{%- endif -%}\n",
        ));
    }
    body.push_str("{{- nss | join(\",\") -}}\n");
    body
}

/// `_helpers.deployments.tpl`
///
/// `defaults` maps deployment names to the literal values of their
/// overridable fields: `selector`, `affinity`, `nodeSelector`,
/// `tolerations`, `volumes` and the full `containers` list.
pub fn deployments(defaults: &BTreeMap<String, JsonValue>) -> Result<TemplateFile> {
    let mut content = format!("{{%- macro {}(name) -%}}\n", DEPLOYMENT_DEFAULTS);
    for (i, (name, literal)) in defaults.iter().enumerate() {
        let keyword = if i == 0 { "if" } else { "elif" };
        content.push_str(&format!("{{%- {} name == {} -%}}\n", keyword, quote(name)));
        content.push_str(&format!(
            "{{{{- {} -}}}}\n",
            quote(&serde_json::to_string(literal)?)
        ));
    }
    if !defaults.is_empty() {
        content.push_str("{%- endif -%}\n");
    }
    content.push_str("{%- endmacro %}\n\n");
    content.push_str(DEPLOYMENT_OVERRIDES_MACRO);

    Ok(TemplateFile::new(helper_path(DEPLOYMENTS_TPL), content))
}

/// User values merged over a deployment's literal defaults
///
/// Lists keyed by `name` keep user entries first and append defaults whose
/// name the user did not set; maps and `resources` are replaced whole.
const DEPLOYMENT_OVERRIDES_MACRO: &str = r#"{%- macro deployment_overrides(values, defaults, target_namespaces) -%}
{%- set ns = namespace(containers=[]) -%}
{%- for c in defaults.containers | default([]) -%}
{%- set overrides = {
    "env": values.env | default(none) | merge_by_name(c.env | default(none)),
    "envFrom": values.envFrom | default(none) | merge_by_name(c.envFrom | default(none)),
    "resources": values.resources | default(none) or c.resources | default(none),
    "volumeMounts": values.volumeMounts | default(none) | merge_by_name(c.volumeMounts | default(none))
} -%}
{%- set ns.containers = ns.containers | concat([c | merge_overwrite(overrides | compact)]) -%}
{%- endfor -%}
{%- set pod = {
    "affinity": values.affinity | default(none) or defaults.affinity | default(none),
    "nodeSelector": values.nodeSelector | default(none) or defaults.nodeSelector | default(none),
    "tolerations": values.tolerations | default(none) | merge_by_name(defaults.tolerations | default(none)),
    "volumes": values.volumes | default(none) | merge_by_name(defaults.volumes | default(none)),
    "containers": ns.containers
} -%}
{{- {
    "selector": values.selector | default(none) or defaults.selector | default(none),
    "template": {
        "metadata": {"annotations": {"olm.targetNamespaces": target_namespaces}},
        "spec": pod | compact
    }
} | compact | tojson -}}
{%- endmacro %}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoping::resolve;
    use bundlepack_core::InstallModeType::*;
    use serde_json::json;

    #[test]
    fn test_implicit_all_namespaces() {
        let file = target_namespaces(&resolve(&[AllNamespaces]).unwrap());
        assert_eq!(file.path, "templates/_helpers.target_namespaces.tpl");
        assert_eq!(
            file.content,
            "{%- macro target_namespaces(values, release) -%}\n{%- endmacro %}\n"
        );
    }

    #[test]
    fn test_implicit_own_namespace() {
        let file = target_namespaces(&resolve(&[OwnNamespace]).unwrap());
        assert!(file.content.contains("{{- release.namespace -}}"));
    }

    #[test]
    fn test_required_watch_namespace() {
        let file = target_namespaces(&resolve(&[SingleNamespace]).unwrap());
        assert!(file.content.contains("watchNamespace is required"));
        assert!(file.content.contains("cannot be set to the install namespace"));
    }

    #[test]
    fn test_watch_namespaces_own_allowed() {
        let file = target_namespaces(&resolve(&[OwnNamespace, MultiNamespace]).unwrap());
        assert!(file.content.contains("or [release.namespace]"));
        assert!(!file.content.contains("cannot include the install namespace"));
        assert!(file.content.contains("at most 10 namespaces"));
    }

    #[test]
    fn test_deployment_defaults_macro() {
        let mut defaults = BTreeMap::new();
        defaults.insert("a".to_string(), json!({"containers": []}));
        defaults.insert("b".to_string(), json!({"containers": [{"name": "x"}]}));

        let file = deployments(&defaults).unwrap();

        assert_eq!(file.path, "templates/_helpers.deployments.tpl");
        assert!(file.content.contains("{%- if name == \"a\" -%}\n{{- \"{\\\"containers\\\":[]}\" -}}\n"));
        assert!(file.content.contains("{%- elif name == \"b\" -%}"));
        assert!(file.content.contains("{%- macro deployment_overrides("));
    }
}

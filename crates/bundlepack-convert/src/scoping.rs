//! Scoping resolver
//!
//! Maps the install modes a bundle supports to the single user-facing value
//! (if any) that selects the namespaces the operator watches, and to how that
//! value is resolved when the user leaves it unset.

use bundlepack_core::InstallModeType;
use serde_json::{Value as JsonValue, json};

use crate::error::{ConvertError, Result};

/// DNS-1123 subdomain, the shape of a namespace name
pub const NAMESPACE_PATTERN: &str =
    r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";

/// Upper bound on `watchNamespaces` entries
pub const MAX_WATCH_NAMESPACES: usize = 10;

/// The user-facing scoping value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopingField {
    /// `installMode`: `AllNamespaces` or `OwnNamespace`
    InstallMode,
    /// `watchNamespace`: a single namespace
    WatchNamespace,
    /// `watchNamespaces`: a list of namespaces
    WatchNamespaces,
}

impl ScopingField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstallMode => "installMode",
            Self::WatchNamespace => "watchNamespace",
            Self::WatchNamespaces => "watchNamespaces",
        }
    }
}

/// What the operator watches when the scoping value is unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDefault {
    /// Every namespace
    AllNamespaces,
    /// The namespace the chart is installed into
    ReleaseNamespace,
    /// Nothing: the value is required
    Required,
}

/// Resolved scoping behaviour for one bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopingConfig {
    /// Field exposed to the user, `None` when scoping is implicit
    pub field: Option<ScopingField>,
    /// Whether the field must be set
    pub required: bool,
    /// Whether the install namespace may be selected as a watched namespace
    pub allow_release_namespace: bool,
    /// Fallback when the field is absent
    pub default: TargetDefault,
}

impl ScopingConfig {
    const fn implicit(default: TargetDefault) -> Self {
        Self {
            field: None,
            required: false,
            allow_release_namespace: true,
            default,
        }
    }

    const fn optional(field: ScopingField, allow_release_namespace: bool, default: TargetDefault) -> Self {
        Self {
            field: Some(field),
            required: false,
            allow_release_namespace,
            default,
        }
    }

    const fn required(field: ScopingField) -> Self {
        Self {
            field: Some(field),
            required: true,
            allow_release_namespace: false,
            default: TargetDefault::Required,
        }
    }

    /// JSON schema of the user-facing field, if there is one
    pub fn field_schema(&self) -> Option<JsonValue> {
        let namespace = json!({
            "type": "string",
            "description": "A namespace that the extension should watch.",
            "pattern": NAMESPACE_PATTERN,
            "minLength": 1,
            "maxLength": 63
        });

        self.field.map(|field| match field {
            ScopingField::InstallMode => json!({
                "type": "string",
                "enum": ["AllNamespaces", "OwnNamespace"]
            }),
            ScopingField::WatchNamespace => namespace,
            ScopingField::WatchNamespaces => json!({
                "type": "array",
                "items": namespace,
                "minItems": 1,
                "maxItems": MAX_WATCH_NAMESPACES
            }),
        })
    }
}

/// Resolve the scoping configuration for a set of supported install modes
///
/// Every one of the fifteen non-empty combinations maps to exactly one
/// configuration; an empty set is rejected.
pub fn resolve(modes: &[InstallModeType]) -> Result<ScopingConfig> {
    use ScopingField::*;
    use TargetDefault::*;

    let all = modes.contains(&InstallModeType::AllNamespaces);
    let own = modes.contains(&InstallModeType::OwnNamespace);
    let single = modes.contains(&InstallModeType::SingleNamespace);
    let multi = modes.contains(&InstallModeType::MultiNamespace);

    let config = match (all, own, single, multi) {
        (false, false, false, false) => return Err(ConvertError::NoSupportedInstallModes),

        (true, false, false, false) => ScopingConfig::implicit(AllNamespaces),
        (true, true, false, false) => ScopingConfig::optional(InstallMode, true, AllNamespaces),
        (true, true, true, false) => ScopingConfig::optional(WatchNamespace, true, AllNamespaces),
        (true, true, false, true) | (true, true, true, true) => {
            ScopingConfig::optional(WatchNamespaces, true, AllNamespaces)
        }
        (true, false, true, false) => ScopingConfig::optional(WatchNamespace, false, AllNamespaces),
        (true, false, true, true) | (true, false, false, true) => {
            ScopingConfig::optional(WatchNamespaces, false, AllNamespaces)
        }

        (false, true, false, false) => ScopingConfig::implicit(ReleaseNamespace),
        (false, true, true, false) => {
            ScopingConfig::optional(WatchNamespace, true, ReleaseNamespace)
        }
        (false, true, true, true) | (false, true, false, true) => {
            ScopingConfig::optional(WatchNamespaces, true, ReleaseNamespace)
        }

        (false, false, true, false) => ScopingConfig::required(WatchNamespace),
        (false, false, true, true) | (false, false, false, true) => {
            ScopingConfig::required(WatchNamespaces)
        }
    };

    tracing::debug!(?modes, ?config, "resolved scoping configuration");
    Ok(config)
}

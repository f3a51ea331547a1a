//! CLI commands

pub mod convert;
pub mod inspect;
pub mod template;

use bundlepack_convert::{ScopingConfig, TargetDefault};

/// One-line description of how a chart is scoped
pub fn describe_scoping(scoping: &ScopingConfig) -> String {
    let default = match scoping.default {
        TargetDefault::AllNamespaces => "all namespaces",
        TargetDefault::ReleaseNamespace => "the install namespace",
        TargetDefault::Required => "none",
    };

    match scoping.field {
        None => format!("watches {}", default),
        Some(field) if scoping.required => format!("{} (required)", field.name()),
        Some(field) => format!("{} (optional, defaults to {})", field.name(), default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlepack_convert::resolve;
    use bundlepack_core::InstallModeType::{self, *};

    fn describe(modes: &[InstallModeType]) -> String {
        describe_scoping(&resolve(modes).unwrap())
    }

    #[test]
    fn test_describe_scoping() {
        assert_eq!(describe(&[AllNamespaces]), "watches all namespaces");
        assert_eq!(describe(&[OwnNamespace]), "watches the install namespace");
        assert_eq!(describe(&[SingleNamespace]), "watchNamespace (required)");
        assert_eq!(
            describe(&[AllNamespaces, OwnNamespace]),
            "installMode (optional, defaults to all namespaces)"
        );
        assert_eq!(
            describe(&[OwnNamespace, MultiNamespace]),
            "watchNamespaces (optional, defaults to the install namespace)"
        );
    }
}

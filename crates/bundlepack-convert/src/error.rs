//! Error types for the converter

use thiserror::Error;

/// Converter error
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("bundle supports no install modes; at least one must be supported")]
    NoSupportedInstallModes,

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("{kind} {name:?}: {message}")]
    InvalidObject {
        kind: String,
        name: String,
        message: String,
    },

    #[error("unsupported object kind {kind} ({name:?})")]
    UnsupportedKind { kind: String, name: String },

    #[error(
        "bundle defines webhooks for deployment {deployment:?} but no certificate provider is \
         configured; pass a certificate provider name (e.g. \"cert-manager\")"
    )]
    MissingCertificateProvider { deployment: String },

    #[error("unknown certificate provider {name:?} (available: {available})")]
    UnknownCertificateProvider { name: String, available: String },

    #[error("invalid version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("create template for {kind} {name:?}: {source}")]
    Parametrize {
        kind: String,
        name: String,
        #[source]
        source: ParametrizeError,
    },

    #[error("{}", join_errors(.0))]
    Multiple(Vec<ConvertError>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Core(#[from] bundlepack_core::CoreError),
}

impl ConvertError {
    pub fn invalid_bundle(message: impl Into<String>) -> Self {
        Self::InvalidBundle(message.into())
    }

    /// Collapse collected errors: none is success, one is returned as is
    pub fn collect(mut errors: Vec<ConvertError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[ConvertError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors from the parametrize engine
#[derive(Debug, Error)]
pub enum ParametrizeError {
    #[error("empty field path")]
    EmptyPath,

    #[error("serialize document: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

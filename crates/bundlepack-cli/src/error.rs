//! CLI error types with exit code handling
//!
//! Every command returns [`CliError`], which maps the failure to one of the
//! [`exit_codes`](crate::exit_codes) and renders as a miette diagnostic.

use bundlepack_convert::ConvertError;
use bundlepack_core::CoreError;
use bundlepack_engine::{EngineError, TemplateError};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Values rejected by the chart's schema
    #[error("Validation failed: {message}")]
    #[diagnostic(code(bundlepack::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Template rendering failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(TemplateError),

    /// The bundle could not be turned into a chart
    #[error("Conversion failed: {error}")]
    #[diagnostic(code(bundlepack::cli::convert))]
    Convert {
        error: ConvertError,
        #[help]
        help: Option<String>,
    },

    /// Loading or writing a bundle or chart failed
    #[error(transparent)]
    #[diagnostic(code(bundlepack::cli::load))]
    Core(#[from] CoreError),

    /// Output already present
    #[error("{path} already exists")]
    #[diagnostic(code(bundlepack::cli::output_exists), help("pass --force to overwrite it"))]
    OutputExists { path: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(bundlepack::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(bundlepack::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Template(_) => exit_codes::TEMPLATE_ERROR,
            CliError::Convert { error, .. } => match error {
                ConvertError::InvalidBundle(_) | ConvertError::Multiple(_) => {
                    exit_codes::VALIDATION_ERROR
                }
                _ => exit_codes::ERROR,
            },
            CliError::Core(CoreError::Io(_))
            | CliError::Core(CoreError::BundleNotFound { .. })
            | CliError::Core(CoreError::ChartNotFound { .. }) => exit_codes::IO_ERROR,
            CliError::Core(_) => exit_codes::ERROR,
            CliError::OutputExists { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a validation error with help text
    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an IO error naming the path it happened at
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", path.display(), err),
        }
    }
}

impl From<ConvertError> for CliError {
    fn from(error: ConvertError) -> Self {
        let help = match &error {
            ConvertError::MissingCertificateProvider { .. } => {
                Some("pass --cert-provider cert-manager".to_string())
            }
            ConvertError::UnknownCertificateProvider { .. } => {
                Some("the built-in provider is cert-manager".to_string())
            }
            _ => None,
        };
        CliError::Convert { error, help }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template { source, .. } => CliError::Template(source),
            EngineError::Core(core) => CliError::Core(core),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error in {template}: {source}")]
    Template {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] bundlepack_core::CoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// The underlying template error, if any
    pub fn template_error(&self) -> Option<&TemplateError> {
        match self {
            EngineError::Template { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    /// Raised by the template itself, e.g. through `fail()`
    InvalidOperation,
    Other,
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(bundlepack::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,
}

impl TemplateError {
    /// Build from a MiniJinja error and the source of the failing template
    pub fn from_minijinja(err: &minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let (kind, message) = categorize_minijinja_error(err);
        let span = err
            .line()
            .and_then(|line_num| calculate_span(template_source, line_num));

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
        }
    }

    /// Create a simple error without source mapping
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            src: NamedSource::new("<unknown>", String::new()),
            span: None,
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn categorize_minijinja_error(err: &minijinja::Error) -> (TemplateErrorKind, String) {
    let kind = match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    };

    // Errors raised inside imported helpers keep their own message; the
    // detail is the part users need to see.
    let message = err
        .detail()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
        .replace("invalid operation: ", "")
        .replace("syntax error: ", "")
        .replace("undefined value", "undefined variable");

    (kind, message)
}

fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (current_line, line) in (1..).zip(source.lines()) {
        if current_line == line_num {
            return Some(SourceSpan::new(offset.into(), line.len().into()));
        }
        offset += line.len() + 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_span() {
        let source = "a: 1\nb: {{ x }}\n";
        let span = calculate_span(source, 2).unwrap();
        assert_eq!(span.offset(), 5);
        assert_eq!(span.len(), 10);
        assert!(calculate_span(source, 9).is_none());
    }

    #[test]
    fn test_unknown_function_kind() {
        let env = minijinja::Environment::new();
        let source = "{{ undefined_fn() }}";
        let err = env.render_str(source, ()).unwrap_err();
        let template_error = TemplateError::from_minijinja(&err, "t.yaml", source);
        assert_eq!(template_error.kind(), TemplateErrorKind::UnknownFunction);
    }

    #[test]
    fn test_raised_message_is_kept() {
        let mut env = minijinja::Environment::new();
        env.add_function("fail", crate::functions::fail);
        let source = "{{ fail(\"watchNamespace is required\") }}";
        let err = env.render_str(source, ()).unwrap_err();
        let template_error = TemplateError::from_minijinja(&err, "t.yaml", source);
        assert_eq!(template_error.kind(), TemplateErrorKind::InvalidOperation);
        assert_eq!(template_error.message, "watchNamespace is required");
    }
}

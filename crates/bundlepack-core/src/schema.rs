//! Values validation against a chart's JSON schema

use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result, ValidationErrorInfo};

/// Result of validating values
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationErrorInfo>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<ValidationErrorInfo>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Compiled validator for a values schema
pub struct SchemaValidator {
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile `schema`
    pub fn new(schema: &JsonValue) -> Result<Self> {
        let compiled = jsonschema::validator_for(schema).map_err(|e| CoreError::InvalidSchema {
            message: format!("Invalid schema: {}", e),
        })?;
        Ok(Self { compiled })
    }

    /// Validate values against the schema, collecting every error
    pub fn validate(&self, values: &JsonValue) -> ValidationResult {
        if self.compiled.is_valid(values) {
            return ValidationResult::success();
        }

        let errors = self
            .compiled
            .iter_errors(values)
            .map(|e| {
                let path = e.instance_path.to_string();
                ValidationErrorInfo {
                    path: if path.is_empty() {
                        "(root)".to_string()
                    } else {
                        path
                    },
                    message: format_validation_error(&e),
                }
            })
            .collect();

        ValidationResult::failure(errors)
    }
}

fn format_validation_error(error: &jsonschema::ValidationError) -> String {
    error.to_string().replace('"', "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> JsonValue {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "watchNamespace": {"type": "string", "minLength": 1, "maxLength": 63}
            },
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_values() {
        let validator = SchemaValidator::new(&schema()).unwrap();
        let result = validator.validate(&json!({"watchNamespace": "team-a"}));
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let validator = SchemaValidator::new(&schema()).unwrap();
        let result = validator.validate(&json!({"replicas": 3}));
        assert!(!result.valid);
        assert_eq!(result.errors[0].path, "(root)");
    }

    #[test]
    fn test_error_path() {
        let validator = SchemaValidator::new(&schema()).unwrap();
        let result = validator.validate(&json!({"watchNamespace": ""}));
        assert!(!result.valid);
        assert_eq!(result.errors[0].path, "/watchNamespace");
    }

    #[test]
    fn test_invalid_schema() {
        assert!(SchemaValidator::new(&json!({"type": 12})).is_err());
    }
}

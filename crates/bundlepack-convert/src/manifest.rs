//! Objects on their way to becoming template files

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{ConvertError, Result};
use crate::naming::file_name_for_object;
use crate::parametrize::{self, Instruction, join_path};

/// Expression rendering the install namespace as a YAML scalar
pub const RELEASE_NAMESPACE: &str = "release.namespace | tojson";

/// A concrete object plus the instructions that parametrize it
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateObject {
    pub object: JsonValue,
    pub instructions: Vec<Instruction>,
}

impl TemplateObject {
    pub fn new(object: JsonValue) -> Self {
        Self {
            object,
            instructions: Vec::new(),
        }
    }

    /// Wrap any serializable resource, e.g. a `k8s-openapi` type
    pub fn from_resource<T: Serialize>(resource: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(resource)?))
    }

    pub fn api_version(&self) -> &str {
        self.object["apiVersion"].as_str().unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.object["kind"].as_str().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.object["metadata"]["name"].as_str().unwrap_or_default()
    }

    /// Chart-relative path the object is written to on its own
    pub fn file_name(&self) -> String {
        file_name_for_object(self.api_version(), self.kind(), self.name())
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    #[must_use]
    pub fn with(mut self, instruction: Instruction) -> Self {
        self.push(instruction);
        self
    }

    /// Render `metadata.namespace` as the install namespace
    #[must_use]
    pub fn in_release_namespace(mut self) -> Self {
        self.set(&["metadata", "namespace"], JsonValue::String(String::new()));
        self.with(Instruction::value(
            RELEASE_NAMESPACE,
            join_path(&["metadata", "namespace"]),
        ))
    }

    /// Set a literal annotation
    pub fn set_annotation(&mut self, key: &str, value: &str) {
        self.set(
            &["metadata", "annotations", key],
            JsonValue::String(value.to_string()),
        );
    }

    /// Set an annotation whose value is computed at render time
    pub fn set_annotation_expr(&mut self, key: &str, expression: &str) {
        self.set_annotation(key, "");
        self.push(Instruction::value(
            expression,
            join_path(&["metadata", "annotations", key]),
        ));
    }

    /// Set a field, creating intermediate maps as needed
    pub fn set(&mut self, path: &[&str], value: JsonValue) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = &mut self.object;
        for segment in parents {
            if !current.get(*segment).is_some_and(JsonValue::is_object) {
                if let Some(map) = current.as_object_mut() {
                    map.insert((*segment).to_string(), JsonValue::Object(Map::new()));
                }
            }
            current = match current.get_mut(*segment) {
                Some(child) => child,
                None => return,
            };
        }
        if let Some(map) = current.as_object_mut() {
            map.insert((*last).to_string(), value);
        }
    }

    /// The object as template text
    pub fn render(&self) -> Result<String> {
        parametrize::execute(&self.object, &self.instructions).map_err(|source| {
            ConvertError::Parametrize {
                kind: self.kind().to_string(),
                name: self.name().to_string(),
                source,
            }
        })
    }

    /// A standalone template file holding just this object
    pub fn into_file(self) -> Result<TemplateFile> {
        let path = self.file_name();
        let content = self.render()?;
        Ok(TemplateFile::new(path, content))
    }
}

/// One generated template file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Chart-relative path, `templates/...`
    pub path: String,
    pub content: String,
}

impl TemplateFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Prepend `{%- from "<template>" import <names> %}`
    #[must_use]
    pub fn importing(mut self, template: &str, names: &[&str]) -> Self {
        self.content = format!("{}{}", import(template, names), self.content);
        self
    }
}

/// Import statement for macros of a helper template
pub fn import(template: &str, names: &[&str]) -> String {
    format!(
        "{{%- from {} import {} %}}\n",
        parametrize::quote(template),
        names.join(", ")
    )
}

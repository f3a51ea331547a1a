//! JSON schema for the chart's values
//!
//! Only the overridable deployment fields and the scoping field are
//! accepted. Field schemas are taken from the Kubernetes API types, along
//! with the definitions they reference.

use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::core::v1::{Container, PodSpec};
use schemars::JsonSchema;
use schemars::r#gen::{SchemaGenerator, SchemaSettings};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::{BTreeSet, VecDeque};

use crate::deployment::{CONTAINER_OVERRIDES, POD_OVERRIDES};
use crate::error::{ConvertError, Result};
use crate::scoping::ScopingConfig;

pub const SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Build the values schema for a scoping configuration
pub fn values_schema(scoping: &ScopingConfig) -> Result<JsonValue> {
    let mut generator = SchemaSettings::draft07().into_generator();

    let mut properties = Map::new();
    pick_properties::<DeploymentSpec>(&mut generator, &["selector"], &mut properties)?;
    pick_properties::<PodSpec>(&mut generator, &POD_OVERRIDES, &mut properties)?;
    pick_properties::<Container>(&mut generator, &CONTAINER_OVERRIDES, &mut properties)?;

    let available = serde_json::to_value(generator.definitions())?;
    let definitions = referenced_definitions(&properties, &available);

    let mut schema = json!({
        "$schema": SCHEMA_DRAFT,
        "type": "object",
        "additionalProperties": false,
    });

    if let Some(field) = scoping.field {
        if let Some(field_schema) = scoping.field_schema() {
            properties.insert(field.name().to_string(), field_schema);
        }
        if scoping.required {
            schema["required"] = json!([field.name()]);
        }
    }

    schema["properties"] = JsonValue::Object(properties);
    if !definitions.is_empty() {
        schema["definitions"] = JsonValue::Object(definitions);
    }
    Ok(schema)
}

/// Copy the schemas of `fields` of `T` into `properties`
fn pick_properties<T: JsonSchema>(
    generator: &mut SchemaGenerator,
    fields: &[&str],
    properties: &mut Map<String, JsonValue>,
) -> Result<()> {
    let root = serde_json::to_value(generator.root_schema_for::<T>().schema)?;
    for field in fields {
        let schema = root
            .pointer(&format!("/properties/{}", field))
            .ok_or_else(|| {
                ConvertError::invalid_bundle(format!(
                    "no schema for field {:?} of {}",
                    field,
                    T::schema_name()
                ))
            })?;
        properties.insert(field.to_string(), schema.clone());
    }
    Ok(())
}

/// Definitions reachable from `properties` through `$ref`
fn referenced_definitions(properties: &Map<String, JsonValue>, available: &JsonValue) -> Map<String, JsonValue> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&JsonValue> = properties.values().collect();
    let mut definitions = Map::new();

    while let Some(schema) = queue.pop_front() {
        let mut refs = Vec::new();
        collect_refs(schema, &mut refs);
        for name in refs {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(definition) = available.get(&name) {
                definitions.insert(name, definition.clone());
                queue.push_back(definition);
            }
        }
    }

    definitions
}

fn collect_refs(schema: &JsonValue, refs: &mut Vec<String>) {
    match schema {
        JsonValue::Object(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("$ref", JsonValue::String(target)) => {
                        if let Some(name) = target.strip_prefix(DEFINITIONS_PREFIX) {
                            refs.push(name.to_string());
                        }
                    }
                    _ => collect_refs(value, refs),
                }
            }
        }
        JsonValue::Array(items) => items.iter().for_each(|item| collect_refs(item, refs)),
        _ => {}
    }
}

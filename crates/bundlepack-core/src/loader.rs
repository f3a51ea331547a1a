//! Loading registry+v1 bundles from a directory
//!
//! Expected layout:
//!
//! ```text
//! <bundle>/
//!   metadata/annotations.yaml   # package name
//!   metadata/properties.yaml    # optional extra properties
//!   manifests/                  # flat directory of YAML manifests
//! ```

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::bundle::{Bundle, ClusterServiceVersion, PROPERTIES_ANNOTATION};
use crate::error::{CoreError, Result};

const PACKAGE_ANNOTATION: &str = "operators.operatorframework.io.bundle.package.v1";
const MANIFESTS_DIR: &str = "manifests";

#[derive(Debug, Deserialize)]
struct AnnotationsFile {
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PropertiesFile {
    #[serde(default)]
    properties: Vec<JsonValue>,
}

/// Load a bundle from `dir`
pub fn load_bundle(dir: impl AsRef<Path>) -> Result<Bundle> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(CoreError::BundleNotFound {
            path: dir.display().to_string(),
        });
    }

    let annotations_path = dir.join("metadata").join("annotations.yaml");
    let annotations: AnnotationsFile =
        serde_yaml::from_str(&std::fs::read_to_string(&annotations_path).map_err(|e| {
            CoreError::InvalidBundle {
                message: format!("failed to read {}: {}", annotations_path.display(), e),
            }
        })?)?;
    let package_name = annotations
        .annotations
        .get(PACKAGE_ANNOTATION)
        .cloned()
        .unwrap_or_default();

    let manifests = dir.join(MANIFESTS_DIR);
    if !manifests.is_dir() {
        return Err(CoreError::InvalidBundle {
            message: format!("missing {:?} directory", MANIFESTS_DIR),
        });
    }

    let mut csv: Option<ClusterServiceVersion> = None;
    let mut crds = Vec::new();
    let mut others = Vec::new();

    let mut entries: Vec<_> = WalkDir::new(&manifests)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<Vec<_>, walkdir::Error>>()
        .map_err(|e| CoreError::Io(e.into()))?;
    entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    for entry in entries {
        let path = entry.path();
        if entry.file_type().is_dir() {
            return Err(CoreError::InvalidBundle {
                message: format!(
                    "subdirectories are not allowed within the {:?} directory of the bundle: found {:?}",
                    MANIFESTS_DIR,
                    path.strip_prefix(dir).unwrap_or(path)
                ),
            });
        }

        let content = std::fs::read_to_string(path)?;
        for document in serde_yaml::Deserializer::from_str(&content) {
            let value = JsonValue::deserialize(document).map_err(|e| CoreError::InvalidBundle {
                message: format!("error parsing objects in {}: {}", path.display(), e),
            })?;
            if value.is_null() {
                continue;
            }

            let kind = value
                .get("kind")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            match kind.as_str() {
                "ClusterServiceVersion" => {
                    if csv.is_some() {
                        return Err(CoreError::InvalidBundle {
                            message: format!("more than one ClusterServiceVersion found in {:?}", MANIFESTS_DIR),
                        });
                    }
                    csv = Some(serde_json::from_value(value).map_err(|e| CoreError::InvalidBundle {
                        message: format!("invalid ClusterServiceVersion in {}: {}", path.display(), e),
                    })?);
                }
                "CustomResourceDefinition" => {
                    crds.push(serde_json::from_value(value).map_err(|e| CoreError::InvalidBundle {
                        message: format!("invalid CustomResourceDefinition in {}: {}", path.display(), e),
                    })?);
                }
                "" => {
                    return Err(CoreError::InvalidBundle {
                        message: format!("object without kind in {}", path.display()),
                    });
                }
                _ => {
                    let named = value
                        .pointer("/metadata/name")
                        .and_then(JsonValue::as_str)
                        .is_some_and(|n| !n.is_empty());
                    if value.get("apiVersion").is_none() || !named {
                        return Err(CoreError::InvalidBundle {
                            message: format!(
                                "{} object in {} must set apiVersion and metadata.name",
                                kind,
                                path.display()
                            ),
                        });
                    }
                    others.push(value);
                }
            }
        }
    }

    let mut csv = csv.ok_or_else(|| CoreError::InvalidBundle {
        message: format!("no ClusterServiceVersion found in {:?}", MANIFESTS_DIR),
    })?;

    let properties_path = dir.join("metadata").join("properties.yaml");
    if properties_path.is_file() {
        let properties: PropertiesFile =
            serde_yaml::from_str(&std::fs::read_to_string(&properties_path)?)?;
        merge_properties(&mut csv, properties.properties)?;
    }

    tracing::debug!(
        package = %package_name,
        csv = %csv.name(),
        crds = crds.len(),
        others = others.len(),
        "loaded bundle"
    );

    Ok(Bundle {
        package_name,
        csv,
        crds,
        others,
    })
}

/// Append `extra` to the descriptor's property annotation, keeping existing entries first
pub fn merge_properties(csv: &mut ClusterServiceVersion, extra: Vec<JsonValue>) -> Result<()> {
    if extra.is_empty() {
        return Ok(());
    }

    let annotations = csv.metadata.annotations.get_or_insert_with(BTreeMap::new);
    let mut properties: Vec<JsonValue> = match annotations.get(PROPERTIES_ANNOTATION) {
        Some(existing) => serde_json::from_str(existing).map_err(|e| CoreError::InvalidBundle {
            message: format!(
                "failed to unmarshal csv.metadata.annotations['{}']: {}",
                PROPERTIES_ANNOTATION, e
            ),
        })?,
        None => Vec::new(),
    };
    properties.extend(extra);

    annotations.insert(
        PROPERTIES_ANNOTATION.to_string(),
        serde_json::to_string(&properties)?,
    );
    Ok(())
}

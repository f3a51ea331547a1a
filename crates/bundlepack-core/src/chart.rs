//! Chart definition, writing and loading
//!
//! A chart is the installable output of a conversion: metadata, a JSON
//! schema for its values and a set of MiniJinja template files. On disk it
//! uses the usual layout (`Chart.yaml`, `values.yaml`, `values.schema.json`,
//! `templates/`).

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::values::Values;

pub const CHART_FILE: &str = "Chart.yaml";
pub const VALUES_FILE: &str = "values.yaml";
pub const SCHEMA_FILE: &str = "values.schema.json";
pub const TEMPLATES_DIR: &str = "templates";

/// Chart metadata (`Chart.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Always `v2`
    pub api_version: String,

    pub name: String,

    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Kubernetes version constraint, e.g. `>= 1.25.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<ChartMaintainer>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ChartMetadata {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            api_version: "v2".to_string(),
            name: name.into(),
            version,
            description: None,
            kube_version: None,
            home: None,
            sources: Vec::new(),
            keywords: Vec::new(),
            maintainers: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMaintainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A file of the chart, addressed by its chart-relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub path: String,
    pub data: Vec<u8>,
}

impl ChartFile {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// File name without directories
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Helper templates are imported by other templates, never rendered on their own
    pub fn is_helper(&self) -> bool {
        self.file_name().starts_with('_')
    }

    /// Data as text (templates are always UTF-8)
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.data).map_err(|e| CoreError::InvalidChart {
            message: format!("{} is not valid UTF-8: {}", self.path, e),
        })
    }
}

/// A complete chart
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Default values (`values.yaml`)
    pub values: Values,

    /// JSON schema for the values (`values.schema.json`)
    pub values_schema: JsonValue,

    /// Template files under `templates/`, in output order
    pub templates: Vec<ChartFile>,
}

impl Chart {
    /// Find a template by chart-relative path
    pub fn template(&self, path: &str) -> Option<&ChartFile> {
        self.templates.iter().find(|f| f.path == path)
    }

    /// Rendered `Chart.yaml`
    pub fn chart_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.metadata)?)
    }

    /// Rendered `values.schema.json`
    pub fn schema_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.values_schema)?;
        json.push('\n');
        Ok(json)
    }

    /// Rendered `values.yaml`
    pub fn values_yaml(&self) -> Result<String> {
        if self.values.is_empty() {
            return Ok("{}\n".to_string());
        }
        Ok(serde_yaml::to_string(&self.values)?)
    }

    /// Every file of the chart with its chart-relative path, in a stable order
    pub fn files(&self) -> Result<Vec<ChartFile>> {
        let mut files = vec![
            ChartFile::new(CHART_FILE, self.chart_yaml()?),
            ChartFile::new(VALUES_FILE, self.values_yaml()?),
            ChartFile::new(SCHEMA_FILE, self.schema_json()?),
        ];
        files.extend(self.templates.iter().cloned());
        Ok(files)
    }

    /// Write the chart into `dir`, creating it if needed
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        for file in self.files()? {
            let path = dir.join(&file.path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &file.data)?;
        }
        tracing::debug!(path = %dir.display(), "wrote chart");
        Ok(dir.to_path_buf())
    }

    /// Load a chart from a directory
    pub fn load(dir: &Path) -> Result<Self> {
        let chart_yaml = dir.join(CHART_FILE);
        if !chart_yaml.exists() {
            return Err(CoreError::ChartNotFound {
                path: dir.display().to_string(),
            });
        }

        let metadata: ChartMetadata =
            serde_yaml::from_str(&std::fs::read_to_string(&chart_yaml)?).map_err(|e| {
                CoreError::InvalidChart {
                    message: format!("{}: {}", CHART_FILE, e),
                }
            })?;

        let values_path = dir.join(VALUES_FILE);
        let values = if values_path.exists() {
            Values::from_file(&values_path)?
        } else {
            Values::new()
        };

        let schema_path = dir.join(SCHEMA_FILE);
        let values_schema = if schema_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&schema_path)?)?
        } else {
            JsonValue::Null
        };

        let mut templates = Vec::new();
        let templates_dir = dir.join(TEMPLATES_DIR);
        if templates_dir.is_dir() {
            for entry in WalkDir::new(&templates_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                templates.push(ChartFile::new(rel, std::fs::read(entry.path())?));
            }
        }

        Ok(Self {
            metadata,
            values,
            values_schema,
            templates,
        })
    }

    /// Default archive file name: `<name>-<version>.tgz`
    #[must_use]
    pub fn default_archive_name(&self) -> String {
        format!("{}-{}.tgz", self.metadata.name, self.metadata.version)
    }
}

//! bundlepack core - shared types for converting operator bundles into charts
//!
//! This crate provides the foundational types used throughout bundlepack:
//! - `Bundle`: a loaded registry+v1 operator bundle
//! - `Chart`: the generated, installable chart and its on-disk form
//! - `Values`: configuration values with deep merge support
//! - `RenderContext`: template rendering context
//! - `SchemaValidator`: values schema validation

pub mod archive;
pub mod bundle;
pub mod chart;
pub mod context;
pub mod error;
pub mod loader;
pub mod schema;
pub mod values;

pub use bundle::{
    Bundle, ClusterServiceVersion, InstallModeType, StrategyDeploymentPermissions,
    StrategyDeploymentSpec, WebhookAdmissionType, WebhookDescription,
};
pub use chart::{Chart, ChartFile, ChartMaintainer, ChartMetadata};
pub use context::{ChartInfo, ReleaseInfo, RenderContext};
pub use error::{CoreError, ValidationErrorInfo};
pub use loader::load_bundle;
pub use schema::{SchemaValidator, ValidationResult};
pub use values::{Values, parse_set_values};

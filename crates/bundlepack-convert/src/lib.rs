//! bundlepack convert - registry+v1 operator bundle to chart converter
//!
//! An operator bundle describes one fixed deployment topology. The chart
//! produced here lets it be installed under any scoping regime the bundle
//! supports, and lets cluster administrators override infrastructure
//! settings without losing the author's defaults:
//!
//! | bundle                            | chart                                        |
//! |-----------------------------------|----------------------------------------------|
//! | supported install modes           | `installMode` / `watchNamespace(s)` value    |
//! | `permissions`                     | Role per watched namespace, or a ClusterRole |
//! | deployment tolerations, env, ...  | literal defaults merged with user values     |
//! | webhook definitions               | Service, registrations, certificate objects  |
//!
//! # Example
//!
//! ```no_run
//! use bundlepack_convert::{ConvertOptions, convert};
//!
//! let bundle = bundlepack_core::load_bundle("./memcached-operator").unwrap();
//! let options = ConvertOptions::new().certificate_provider("cert-manager");
//! let chart = convert(&bundle, options).unwrap();
//!
//! chart.write_to_dir(std::path::Path::new("./memcached-operator-chart")).unwrap();
//! ```
//!
//! # Templates
//!
//! Objects are turned into templates by the [`parametrize`] engine: fields
//! that depend on install-time values are marked, the object is serialized
//! once, and the marks are replaced by MiniJinja expressions. Decisions
//! that depend on values, like promoting namespaced RBAC to cluster scope,
//! are emitted into the templates and taken when the chart is rendered.

pub mod certprovider;
pub mod converter;
pub mod deployment;
pub mod error;
pub mod helpers;
pub mod manifest;
pub mod naming;
pub mod objects;
pub mod parametrize;
pub mod rbac;
pub mod scoping;
pub mod validate;
pub mod values_schema;
pub mod webhooks;

// Re-exports
pub use certprovider::{
    CertManager, CertSecretInfo, CertificateConfig, CertificateProvider, CertificateProviders,
};
pub use converter::{ConvertOptions, Converter, convert};
pub use error::{ConvertError, ParametrizeError, Result};
pub use parametrize::{Instruction, InstructionKind, execute};
pub use scoping::{ScopingConfig, ScopingField, TargetDefault, resolve};

//! bundlepack engine - renders generated charts
//!
//! This crate provides a MiniJinja-based template engine with:
//! - the filters generated chart templates rely on (`toyaml`, `fromyaml`,
//!   `merge_overwrite`, `merge_by_name`, ...)
//! - human-readable template errors with source spans

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;

pub use engine::{Engine, EngineBuilder, RenderResult};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};

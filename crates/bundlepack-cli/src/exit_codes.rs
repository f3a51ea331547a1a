//! Standard exit codes for CLI operations

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - the bundle could not be converted, or another failure
pub const ERROR: i32 = 1;

/// Validation error - values rejected by the chart's schema, or an invalid bundle
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - chart rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 4;

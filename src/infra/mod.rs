//! Infrastructure layer: config, logging, errors and the replay backend.

pub mod config;
pub mod contracts;
pub mod error;
pub mod logging;
pub mod replay;

/// Returns the infra module name for smoke checks.
pub fn module_name() -> &'static str {
    "infra"
}

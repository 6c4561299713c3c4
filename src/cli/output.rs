//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::GuardError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &GuardError) -> String {
    match e {
        GuardError::ReplayError { .. } | GuardError::PeriodError(_) => e.to_string(),
        GuardError::ConfigError(msg) => format!("Configuration error: {}", msg),
        other => format!("Error: {}", other),
    }
}

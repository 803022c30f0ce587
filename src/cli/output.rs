//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output, with a hint where one helps.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Unauthenticated => format!(
            "{}\nHint: pass --caller <id> or set `caller` in config/config.toml",
            e
        ),
        ApiError::ProviderNotConfigured(_) => format!(
            "{}\nHint: add a [providers.<name>] table and set generation.provider in config/config.toml",
            e
        ),
        ApiError::GenerationInFlight { .. } => format!(
            "{}\nHint: check the running job with `coachgen job list --status generating`",
            e
        ),
        _ => e.to_string(),
    }
}

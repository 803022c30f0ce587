//! Error types for the coaching generation core.

use crate::types::JobId;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store operation failed on {tree}: {message}")]
    Backend { tree: &'static str, message: String },

    #[error("Failed to encode record for {tree}: {message}")]
    Encode { tree: &'static str, message: String },

    #[error("Failed to decode record from {tree}: {message}")]
    Decode { tree: &'static str, message: String },
}

/// Errors surfaced by the library API
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Authentication required: caller identity is missing")]
    Unauthenticated,

    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Prompt template not found: {0}")]
    TemplateNotFound(String),

    #[error("Prompt template '{template}' is missing the '{section}' message")]
    MissingTemplateSection {
        template: String,
        section: &'static str,
    },

    #[error("Prompt template references unknown variable '{{{{{name}}}}}'")]
    UnknownTemplateVariable { name: String },

    #[error("Invalid prompt template: {0}")]
    InvalidTemplate(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Response failed validation: {0}")]
    ResponseValidation(String),

    #[error("Invalid job transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: &'static str,
        to: &'static str,
    },

    #[error("A {kind} job is already in flight for subject {subject_id}")]
    GenerationInFlight { kind: String, subject_id: String },

    #[error("Generation task aborted: {0}")]
    TaskAborted(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::StorageError(err.to_string())
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl ApiError {
    /// True for errors raised by the external generation provider.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            ApiError::ProviderError(_)
                | ApiError::ProviderNotConfigured(_)
                | ApiError::ProviderRequestFailed(_)
                | ApiError::ProviderAuthFailed(_)
                | ApiError::ProviderRateLimit(_)
                | ApiError::ProviderModelNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_variable_message_shows_placeholder_syntax() {
        let err = ApiError::UnknownTemplateVariable {
            name: "athleteName".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Prompt template references unknown variable '{{athleteName}}'"
        );
    }

    #[test]
    fn storage_errors_convert_to_api_errors() {
        let err: ApiError = StorageError::Backend {
            tree: "jobs",
            message: "disk full".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::StorageError(msg) if msg.contains("disk full")));
    }
}

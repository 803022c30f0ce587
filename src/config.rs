//! Configuration System
//!
//! Layered configuration: built-in defaults, the global user file, workspace
//! files, then `COACHGEN__*` environment overrides. See [`ConfigLoader`].

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod env;
    pub mod global_file;
    pub mod workspace_file;
}

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Caller identity used by the CLI when `--caller` is not given.
    #[serde(default)]
    pub caller: Option<String>,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the resolver treats related ids that do not resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextResolution {
    /// Reject the request with `NotFound` before anything is written.
    Strict,
    /// Log and create the job anyway; the worker substitutes fallbacks.
    #[default]
    Lenient,
}

/// Policy for a second request while a job of the same kind runs for the same subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InFlightPolicy {
    /// Both run; whichever terminal write lands last wins.
    #[default]
    Allow,
    /// Refuse with `GenerationInFlight`.
    RejectDuplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Name of the entry in `[providers]` used for generation.
    #[serde(default)]
    pub provider: Option<String>,

    /// Directory searched for `<kind>.yaml` before the built-in templates.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    #[serde(default)]
    pub context_resolution: ContextResolution,

    #[serde(default)]
    pub in_flight: InFlightPolicy,

    /// Most recent session logs included in prompts.
    #[serde(default = "default_recent_sessions")]
    pub recent_sessions: usize,

    /// Notification bus buffer per subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_recent_sessions() -> usize {
    10
}

fn default_event_capacity() -> usize {
    crate::notify::DEFAULT_CAPACITY
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: None,
            templates_dir: None,
            context_resolution: ContextResolution::default(),
            in_flight: InFlightPolicy::default(),
            recent_sessions: default_recent_sessions(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory, relative paths resolve against the workspace.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".coachgen/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolve(&self, workspace_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workspace_root.join(&self.path)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String, String),
    Generation(String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (name, provider) in &self.providers {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(name.clone(), e));
            }
        }

        if let Some(provider) = &self.generation.provider {
            if !self.providers.contains_key(provider) {
                errors.push(ValidationError::Generation(format!(
                    "provider '{}' is not defined under [providers]",
                    provider
                )));
            }
        }
        if self.generation.event_capacity == 0 {
            errors.push(ValidationError::Generation(
                "event_capacity must be greater than zero".to_string(),
            ));
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("path cannot be empty".to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

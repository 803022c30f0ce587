//! Config loading entry points.

use super::merge::merge_policy;
use super::sources::{env, global_file, workspace_file};
use super::AppConfig;
use crate::error::ApiError;
use config::{Config, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for a workspace.
    ///
    /// Precedence, lowest first: defaults, global file, `config/config.toml`,
    /// `config/{COACHGEN_ENV}.toml`, `COACHGEN__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<AppConfig, ApiError> {
        Self::load_with_override(workspace_root, None)
    }

    /// Like [`ConfigLoader::load`], with an explicit file layered above the
    /// workspace files and below the environment.
    pub fn load_with_override(
        workspace_root: &Path,
        override_file: Option<&Path>,
    ) -> Result<AppConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let mut builder = workspace_file::add_to_builder(builder, workspace_root)?;
        if let Some(path) = override_file {
            if !path.exists() {
                return Err(ApiError::ConfigError(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        let builder = env::add_to_builder(builder);

        let config: AppConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace = %workspace_root.display(),
            providers = config.providers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load a single file on top of the defaults, ignoring every other layer.
    pub fn load_from_file(path: &Path) -> Result<AppConfig, ApiError> {
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// Defaults only.
    pub fn defaults() -> Result<AppConfig, ApiError> {
        let config = Config::builder().build()?.try_deserialize()?;
        Ok(config)
    }
}

//! Configuration System
//!
//! Stack configuration loaded from a TOML file with `CTXSTACK__*` environment
//! overrides (e.g. `CTXSTACK__STORE_PATH`, `CTXSTACK__LOGGING__LEVEL`).
//! Relative paths are resolved against the configuration file's directory.

use crate::error::StackError;
use crate::logging::LoggingConfig;
use crate::stack::StackOptions;
use crate::store::{StoreOptions, StoreType};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Model definition (TOML)
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Store location; required for durable stores
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub store_type: StoreType,

    /// Delete and recreate the store once if it fails to open
    #[serde(default)]
    pub erase_on_open_failure: bool,

    #[serde(default = "default_true")]
    pub flush_on_commit: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model.toml")
}

fn default_true() -> bool {
    true
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            store_path: None,
            store_type: StoreType::default(),
            erase_on_open_failure: false,
            flush_on_commit: default_true(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StackConfig {
    pub fn validate(&self) -> Result<(), StackError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(StackError::Configuration(
                "model_path cannot be empty".to_string(),
            ));
        }
        if self.store_type == StoreType::Sled && self.store_path.is_none() {
            return Err(StackError::Configuration(
                "store_path is required for a sled store".to_string(),
            ));
        }
        Ok(())
    }

    /// Anchor relative paths at `base`.
    pub fn resolve_relative(&mut self, base: &Path) {
        if self.model_path.is_relative() {
            self.model_path = base.join(&self.model_path);
        }
        if let Some(store) = &self.store_path {
            if store.is_relative() {
                self.store_path = Some(base.join(store));
            }
        }
    }

    pub fn stack_options(&self) -> StackOptions {
        StackOptions {
            model_path: self.model_path.clone(),
            store_path: self.store_path.clone(),
            store_type: self.store_type,
            erase_on_open_failure: self.erase_on_open_failure,
            store: StoreOptions {
                flush_on_commit: self.flush_on_commit,
                ..StoreOptions::default()
            },
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `path`, layer environment overrides, validate.
    pub fn load_from_file(path: &Path) -> Result<StackConfig, StackError> {
        let built = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(Self::environment())
            .build()?;
        let mut config: StackConfig = built.try_deserialize()?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides only.
    pub fn load_from_env() -> Result<StackConfig, StackError> {
        let built = Config::builder().add_source(Self::environment()).build()?;
        let config: StackConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("CTXSTACK")
            .separator("__")
            .try_parsing(true)
    }
}

//! # Host configuration
//!
//! Layered: defaults, then an optional JSON file, then the environment.
//! Command-line flags are applied last by the binary.

use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding [`HostConfig::store_dir`]
pub const STORE_DIR_ENV: &str = "MPT_STORE_DIR";

/// Largest value the host accepts unless configured otherwise
pub const DEFAULT_MAX_VALUE_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Directory holding `nodes/` and `root.json`
    pub store_dir: PathBuf,
    /// Create the directory on open instead of failing
    pub create_if_missing: bool,
    /// Values longer than this are rejected on insert
    pub max_value_size: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".mpt"),
            create_if_missing: true,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl HostConfig {
    /// Read a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| error::io_error("read", path, e))?;
        let config: HostConfig = serde_json::from_str(&json).map_err(|e| {
            error::config_invalid(format!("failed to parse {}: {}", path.display(), e))
                .with_context("path", path.display().to_string())
                .set_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults or the given file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_from(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(STORE_DIR_ENV).filter(|d| !d.is_empty()) {
            tracing::debug!(dir = %dir, "store directory from environment");
            self.store_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_dir.as_os_str().is_empty() {
            return Err(error::config_invalid("store_dir must not be empty"));
        }
        if self.max_value_size == 0 {
            return Err(error::config_invalid("max_value_size must be positive"));
        }
        Ok(())
    }
}

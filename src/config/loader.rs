// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;
use crate::types::ExecutionMode;

/// Values from the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_cores: Option<u32>,
    pub execution: Option<ExecutionMode>,
    pub no_render: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, raw: &mut RawConfigFile) {
        if let Some(cores) = self.max_cores {
            raw.config.max_cores = cores;
        }
        if let Some(mode) = self.execution {
            raw.config.execution = mode;
        }
        if self.no_render {
            raw.config.render_cmd = None;
        }
    }
}

/// Load a configuration file and return the raw, unvalidated `RawConfigFile`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load, apply command-line overrides and validate.
///
/// Validation covers thread roots, spawn references, job dependencies, core
/// requests against the budget, durations and the spawn graph shape.
pub fn load_and_validate(path: impl AsRef<Path>, overrides: &ConfigOverrides) -> Result<ConfigFile> {
    let mut raw_config = load_from_path(&path)?;
    overrides.apply(&mut raw_config);
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Nprsched.toml")
}

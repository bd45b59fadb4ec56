//! Top-level alignment configuration.

use std::path::Path;

use common::FileFormat;
use serde::{Deserialize, Serialize};

use crate::chain::ChainConfig;
use crate::error::ConfigError;
use crate::preprocess::PreprocessConfig;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub scheduler: SchedulerConfig,
    pub chain: ChainConfig,
    pub preprocess: PreprocessConfig,
}

impl AlignConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.chain.validate()?;
        self.preprocess.validate()
    }

    /// Reads a YAML or JSON config, chosen by extension, and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = FileFormat::from_path(path)?;
        if !format.is_text() {
            return Err(ConfigError::Invalid(format!(
                "config must be YAML or JSON: {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            common::serde::deserialize(&bytes, format).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }
}

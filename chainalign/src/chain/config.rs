use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Chain resolution and rejection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Multiplicative score discount per additional hop, in `(0, 1]`.
    pub chain_penalty: f64,
    /// Frames whose chain score falls below this are dropped from the final
    /// result. `None` keeps every resolved frame.
    pub rejection_threshold: Option<f64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_penalty: 0.95,
            rejection_threshold: Some(0.45),
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.chain_penalty > 0.0 && self.chain_penalty <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "chain_penalty must be in (0, 1], got {}",
                self.chain_penalty
            )));
        }
        if let Some(threshold) = self.rejection_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Invalid(format!(
                    "rejection_threshold must be in [0, 1], got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

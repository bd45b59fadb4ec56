use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How registration work for a block pair is split into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One task per reference frame, reusing a reference session for all its targets.
    #[default]
    OneToMany,
    /// One task per frame pair.
    Pairwise,
}

/// Block-windowed scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Frames per contiguous block (the last block may be shorter).
    pub block_size: usize,
    /// Block pairs further apart than this are never registered.
    pub block_skip_distance: usize,
    /// Sampling step at block distance `d` is `density_decay_factor^d`.
    pub density_decay_factor: f64,
    /// Concurrent registration workers.
    pub max_workers: usize,
    /// Per-task timeout in seconds. A timed-out task leaves its pairs absent.
    pub task_timeout_secs: Option<f64>,
    pub dispatch: DispatchMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            block_size: 24,
            block_skip_distance: 8,
            density_decay_factor: 1.35,
            max_workers: 4,
            task_timeout_secs: Some(300.0),
            dispatch: DispatchMode::OneToMany,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if !(self.density_decay_factor.is_finite() && self.density_decay_factor >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "density_decay_factor must be >= 1, got {}",
                self.density_decay_factor
            )));
        }
        if !self.sampling_step(self.block_skip_distance).is_finite() {
            return Err(ConfigError::Invalid(format!(
                "density_decay_factor {} overflows at block distance {}",
                self.density_decay_factor, self.block_skip_distance
            )));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be positive".into()));
        }
        if let Some(secs) = self.task_timeout_secs {
            if secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "task_timeout_secs must be a positive representable duration, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// `None` when unset or not representable as a [`Duration`].
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Sampling step for block pairs `distance` blocks apart.
    pub fn sampling_step(&self, distance: usize) -> f64 {
        self.density_decay_factor.powi(distance as i32)
    }
}

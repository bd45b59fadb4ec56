//! Chainalign - per-frame alignment of image feeds from noisy pairwise registrations.
//!
//! A feed is an ordered sequence of frames. Pairwise registrations between a
//! block-windowed sample of frame pairs are run in parallel, and the resulting
//! sparse matrix is resolved into one best transform chain per frame toward a
//! reference frame:
//! - [`Scheduler`] decides which pairs to register and runs the registration
//!   delegate on a bounded worker pool
//! - [`ChainResolver`] finds the optimal chains and composes their transforms
//! - [`TransformChainCache`] stores the per-feed result
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chainalign::{AlignConfig, Pipeline};
//!
//! let config = AlignConfig::load("align.yaml".as_ref())?;
//! let mut pipeline = Pipeline::new(config, Arc::new(MyRegistrar::new()))?;
//! let transforms = pipeline.align_feed("cam_north", 0, &preprocessor, &raw_frames).await?;
//! pipeline.cache().save("chains.json".as_ref(), None)?;
//! ```

mod cache;
pub mod chain;
mod config;
mod error;
mod matrix;
mod pipeline;
mod preprocess;
mod progress;
mod registration;
pub mod scheduler;
mod transform;

// ============================================================================
// Core types
// ============================================================================

pub use matrix::{MatrixRecord, RegistrationMatrix, RegistrationResults};
pub use transform::{Transform, TransformRecord};

// ============================================================================
// Configuration
// ============================================================================

pub use chain::ChainConfig;
pub use config::AlignConfig;
pub use preprocess::{Preprocess, PreprocessConfig, ResolutionGeometry};
pub use scheduler::{DispatchMode, SchedulerConfig};

// ============================================================================
// Registration scheduling
// ============================================================================

pub use progress::{progress_callback, ProgressCallback, RegistrationProgress};
pub use registration::{ReferenceSession, Registrar};
pub use scheduler::{RegistrationPlan, ScheduleOutput, Scheduler, SchedulerReport};

// ============================================================================
// Chain resolution
// ============================================================================

pub use cache::{CacheRecord, FeedTransforms, TransformChainCache, CACHE_FORMAT_VERSION};
pub use chain::{ChainResolver, OptimalChainTable, ResolvedChains};
pub use pipeline::{FeedInput, FeedOutcome, Pipeline};

// ============================================================================
// Errors
// ============================================================================

pub use error::{
    CacheError, ConfigError, Error, FeedProcessingFailure, MatrixError, RegistrationFailure,
    ResolveError,
};

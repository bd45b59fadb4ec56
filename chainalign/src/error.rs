//! Error types for registration scheduling, chain resolution and caching.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single pairwise or reference-batch registration call failed.
///
/// Always absorbed by the scheduler as an absent matrix entry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistrationFailure {
    #[error("registration delegate failed: {0}")]
    Delegate(String),

    #[error("registration timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("registration worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("registration produced an invalid transform")]
    InvalidTransform,
}

/// Rejected insertion into a [`crate::RegistrationMatrix`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatrixError {
    #[error("frame {frame} cannot be registered against itself")]
    SelfPair { frame: usize },

    #[error("frame {frame} is outside the feed of {frame_count} frames")]
    FrameOutOfRange { frame: usize, frame_count: usize },

    #[error("transform for pair ({newer}, {older}) is not finite or has non-positive scale")]
    InvalidTransform { newer: usize, older: usize },

    #[error("pair ({newer}, {older}) is recorded in both directions")]
    DuplicatePair { newer: usize, older: usize },
}

/// Malformed input to one chain resolution.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("feed has no frames")]
    EmptyFeed,

    #[error("reference frame {reference} is outside the feed of {frame_count} frames")]
    ReferenceOutOfRange {
        reference: usize,
        frame_count: usize,
    },

    #[error("resolution geometry gives a non-finite or non-positive pixel scaler ({0})")]
    InvalidGeometry(f64),

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Failure while processing a whole feed. Carries the feed name for diagnosis.
#[derive(Debug, Error)]
#[error("Error processing feed '{feed}': {source}")]
pub struct FeedProcessingFailure {
    pub feed: String,
    #[source]
    pub source: Error,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    FileFormat(#[from] common::file_format::FileExtensionError),

    #[error("Failed to encode or decode '{path}': {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: common::serde::SerdeError,
    },

    #[error("Unsupported cache version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    FileFormat(#[from] common::file_format::FileExtensionError),

    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: common::serde::SerdeError,
    },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start registration runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to run parallel feed resolution: {0}")]
    Parallel(#[from] common::parallel::ParallelError),
}

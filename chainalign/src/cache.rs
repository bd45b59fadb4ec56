//! Durable per-feed store of resolved corrective transforms.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use common::FileFormat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CacheError;
use crate::transform::{Transform, TransformRecord};

/// Highest persisted record version this build reads.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// `frame -> corrective transform`, `None` where no usable chain was found.
pub type FeedTransforms = BTreeMap<usize, Option<Transform>>;

/// On-disk shape of the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub info: String,
    pub cache: BTreeMap<String, BTreeMap<usize, Option<TransformRecord>>>,
}

fn default_version() -> u32 {
    1
}

/// Feed name to resolved transforms. Loaded and saved as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformChainCache {
    feeds: BTreeMap<String, FeedTransforms>,
}

impl TransformChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> Result<Self, CacheError> {
        let mut cache = Self::new();
        cache.load(path)?;
        Ok(cache)
    }

    pub fn contains(&self, feed: &str) -> bool {
        self.feeds.contains_key(feed)
    }

    pub fn get(&self, feed: &str) -> Option<&FeedTransforms> {
        self.feeds.get(feed)
    }

    /// Returns the previous entry of `feed`, if any.
    pub fn insert(&mut self, feed: &str, transforms: FeedTransforms) -> Option<FeedTransforms> {
        self.feeds.insert(feed.to_string(), transforms)
    }

    pub fn feeds(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn to_record(&self, info: Option<&str>) -> CacheRecord {
        let cache = self
            .feeds
            .iter()
            .map(|(feed, transforms)| {
                let row = transforms
                    .iter()
                    .map(|(&frame, t)| (frame, t.map(TransformRecord::from)))
                    .collect();
                (feed.clone(), row)
            })
            .collect();

        CacheRecord {
            version: CACHE_FORMAT_VERSION,
            info: info.map_or_else(default_info, str::to_string),
            cache,
        }
    }

    /// Writes the whole cache. The format follows the file extension.
    pub fn save(&self, path: &Path, info: Option<&str>) -> Result<(), CacheError> {
        save_to_path(&self.to_record(info), path)?;
        info!(path = %path.display(), feeds = self.len(), "Saved transform chain cache");
        Ok(())
    }

    /// Replaces the whole content with the cache stored at `path`.
    pub fn load(&mut self, path: &Path) -> Result<(), CacheError> {
        let record: CacheRecord = load_from_path(path)?;
        if record.version > CACHE_FORMAT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                found: record.version,
                supported: CACHE_FORMAT_VERSION,
            });
        }

        self.feeds = record
            .cache
            .into_iter()
            .map(|(feed, row)| {
                let transforms = row
                    .into_iter()
                    .map(|(frame, t)| (frame, t.map(Transform::from)))
                    .collect();
                (feed, transforms)
            })
            .collect();
        info!(path = %path.display(), feeds = self.len(), info = %record.info, "Loaded transform chain cache");
        Ok(())
    }
}

fn default_info() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("Saved on {secs}.")
}

pub(crate) fn save_to_path<T: Serialize>(value: &T, path: &Path) -> Result<(), CacheError> {
    let format = FileFormat::from_path(path)?;
    let bytes = common::serde::serialize(value, format).map_err(|source| CacheError::Serde {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| CacheError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, CacheError> {
    let format = FileFormat::from_path(path)?;
    let bytes = fs::read(path).map_err(|source| CacheError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    common::serde::deserialize(&bytes, format).map_err(|source| CacheError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

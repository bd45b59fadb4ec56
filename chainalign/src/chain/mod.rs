//! Optimal transform chain resolution.
//!
//! Turns a sparse, noisy [`RegistrationMatrix`] into one corrective transform
//! per frame, relative to a reference frame:
//!
//! 1. [`OptimalChainTable`]: best next hop toward the reference for every frame,
//!    by multiplicative label-correcting relaxation ([`scoring`]).
//! 2. The parent links are inverted into a tree rooted at the reference and the
//!    pairwise transforms are composed along it.
//! 3. Translations are rescaled from the processed resolution to original pixels.
//!
//! Rejection by score threshold is a separate step, see
//! [`ResolvedChains::accepted`].

mod config;
mod scoring;
mod tree;


pub use config::ChainConfig;
pub use scoring::{
    combined_score, edge_score, OptimalChainTable, FLOOR_SCORE, HOP_EPSILON, REFERENCE_SCORE,
};

use tracing::{debug, info};

use crate::cache::{FeedTransforms, TransformChainCache};
use crate::error::{ConfigError, ResolveError};
use crate::matrix::RegistrationMatrix;
use crate::preprocess::ResolutionGeometry;
use crate::transform::Transform;

/// Result of resolving one feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChains {
    table: OptimalChainTable,
    chain_lengths: Vec<Option<usize>>,
    transforms: Vec<Option<Transform>>,
}

impl ResolvedChains {
    pub fn table(&self) -> &OptimalChainTable {
        &self.table
    }

    pub fn reference(&self) -> usize {
        self.table.reference()
    }

    pub fn frame_count(&self) -> usize {
        self.transforms.len()
    }

    /// Corrective transform of `frame` in original pixel units, `None` if no
    /// measured chain reaches it.
    pub fn transform(&self, frame: usize) -> Option<&Transform> {
        self.transforms.get(frame)?.as_ref()
    }

    pub fn transforms(&self) -> &[Option<Transform>] {
        &self.transforms
    }

    /// Hops from `frame` to the reference along the composed chain.
    pub fn chain_length(&self, frame: usize) -> Option<usize> {
        self.chain_lengths.get(frame).copied().flatten()
    }

    pub fn unresolved_count(&self) -> usize {
        self.transforms.iter().filter(|t| t.is_none()).count()
    }

    /// Per-frame result with every frame present as a key. Frames whose chain
    /// score is below `threshold` become absent; the reference always passes.
    pub fn accepted(&self, threshold: Option<f64>) -> FeedTransforms {
        let reference = self.reference();
        self.transforms
            .iter()
            .enumerate()
            .map(|(frame, transform)| {
                let passes = frame == reference
                    || match (threshold, self.table.score(frame)) {
                        (None, _) => true,
                        (Some(threshold), Some(score)) => score >= threshold,
                        (Some(_), None) => false,
                    };
                (frame, transform.filter(|_| passes))
            })
            .collect()
    }
}

/// Single-threaded, deterministic chain resolver.
#[derive(Debug, Clone, Default)]
pub struct ChainResolver {
    config: ChainConfig,
}

impl ChainResolver {
    pub fn new(config: ChainConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        matrix: &RegistrationMatrix,
        reference: usize,
        geometry: ResolutionGeometry,
    ) -> Result<ResolvedChains, ResolveError> {
        let frame_count = matrix.frame_count();
        if frame_count == 0 {
            return Err(ResolveError::EmptyFeed);
        }
        if reference >= frame_count {
            return Err(ResolveError::ReferenceOutOfRange {
                reference,
                frame_count,
            });
        }
        let px_scaler = geometry.pixel_scaler();
        if !(px_scaler.is_finite() && px_scaler > 0.0) {
            return Err(ResolveError::InvalidGeometry(px_scaler));
        }

        let table = OptimalChainTable::build(matrix, reference, self.config.chain_penalty);
        let composition = tree::compose(matrix, &table);
        let transforms: Vec<Option<Transform>> = composition
            .transforms
            .into_iter()
            .map(|t| t.map(|t| t.with_translation_scaled(px_scaler)))
            .collect();

        let resolved = ResolvedChains {
            table,
            chain_lengths: composition.chain_lengths,
            transforms,
        };
        debug!(
            frame_count,
            reference,
            rounds = resolved.table.rounds(),
            unresolved = resolved.unresolved_count(),
            "Resolved transform chains"
        );
        Ok(resolved)
    }

    /// Resolves and applies the configured rejection threshold.
    pub fn resolve_accepted(
        &self,
        matrix: &RegistrationMatrix,
        reference: usize,
        geometry: ResolutionGeometry,
    ) -> Result<FeedTransforms, ResolveError> {
        let resolved = self.resolve(matrix, reference, geometry)?;
        Ok(resolved.accepted(self.config.rejection_threshold))
    }

    /// Cache-aware entry point. An already cached feed is returned unchanged
    /// without resolving; otherwise the accepted result is stored in `cache`
    /// when `save_to_cache` is set.
    pub fn resolve_feed(
        &self,
        cache: &mut TransformChainCache,
        feed: &str,
        matrix: &RegistrationMatrix,
        reference: usize,
        geometry: ResolutionGeometry,
        save_to_cache: bool,
    ) -> Result<FeedTransforms, ResolveError> {
        if let Some(cached) = cache.get(feed) {
            debug!(feed, "Transform chains already cached");
            return Ok(cached.clone());
        }

        info!(
            feed,
            frame_count = matrix.frame_count(),
            reference,
            "Processing optimal chains"
        );
        let transforms = self.resolve_accepted(matrix, reference, geometry)?;
        if save_to_cache {
            cache.insert(feed, transforms.clone());
        }
        Ok(transforms)
    }
}

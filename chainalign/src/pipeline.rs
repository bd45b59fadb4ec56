//! Scheduler, resolver, rejection and cache wired together per feed.

use std::sync::Arc;

use common::parallel::par_map_bounded;
use tracing::{error, info};

use crate::cache::{FeedTransforms, TransformChainCache};
use crate::chain::ChainResolver;
use crate::config::AlignConfig;
use crate::error::{ConfigError, Error, FeedProcessingFailure};
use crate::matrix::{RegistrationMatrix, RegistrationResults};
use crate::preprocess::Preprocess;
use crate::progress::ProgressCallback;
use crate::registration::Registrar;
use crate::scheduler::{Scheduler, SchedulerReport};

/// A feed whose pairwise registrations are already computed.
#[derive(Debug, Clone)]
pub struct FeedInput {
    pub name: String,
    pub reference: usize,
    pub matrix: RegistrationMatrix,
}

/// Per-feed result of a multi-feed run. A failure carries the feed name.
pub type FeedOutcome = Result<FeedTransforms, FeedProcessingFailure>;

pub struct Pipeline<R: Registrar> {
    config: AlignConfig,
    scheduler: Scheduler<R>,
    resolver: ChainResolver,
    cache: TransformChainCache,
    registrations: RegistrationResults,
    last_report: Option<SchedulerReport>,
}

impl<R: Registrar> Pipeline<R> {
    pub fn new(config: AlignConfig, registrar: Arc<R>) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = Scheduler::new(config.scheduler.clone(), registrar)?;
        let resolver = ChainResolver::new(config.chain.clone())?;
        Ok(Self {
            config,
            scheduler,
            resolver,
            cache: TransformChainCache::new(),
            registrations: RegistrationResults::default(),
            last_report: None,
        })
    }

    pub fn with_cache(mut self, cache: TransformChainCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.scheduler = self.scheduler.with_progress(progress);
        self
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    pub fn cache(&self) -> &TransformChainCache {
        &self.cache
    }

    pub fn into_cache(self) -> TransformChainCache {
        self.cache
    }

    /// Pairwise matrices of the feeds registered by [`align_feed`](Self::align_feed).
    pub fn registrations(&self) -> &RegistrationResults {
        &self.registrations
    }

    /// Scheduler summary of the most recent registered feed.
    pub fn last_report(&self) -> Option<&SchedulerReport> {
        self.last_report.as_ref()
    }

    /// Registers, resolves and caches one feed. A cached feed is returned
    /// without touching `raw`.
    pub async fn align_feed<P>(
        &mut self,
        feed: &str,
        reference: usize,
        preprocessor: &P,
        raw: &[P::Raw],
    ) -> FeedOutcome
    where
        P: Preprocess<Frame = R::Frame>,
    {
        if let Some(cached) = self.cache.get(feed) {
            info!(feed, "Feed already aligned, using cached transforms");
            return Ok(cached.clone());
        }

        let frames: Arc<[R::Frame]> = preprocessor.preprocess(raw).into();
        info!(feed, frame_count = frames.len(), reference, "Aligning feed");
        let output = self.scheduler.run(frames).await;
        self.registrations.insert(feed, &output.matrix);
        self.last_report = Some(output.report);

        let geometry = preprocessor.config().geometry();
        self.resolver
            .resolve_feed(&mut self.cache, feed, &output.matrix, reference, geometry, true)
            .map_err(|e| feed_failure(feed, e.into()))
    }

    /// Resolves precomputed feeds in parallel, at most `max_workers` at a time.
    ///
    /// Feeds already in the cache are returned from it. Each failed feed is
    /// logged and reported in its own slot while the others complete and
    /// are cached. Outcomes are in input order.
    pub fn resolve_feeds(&mut self, feeds: &[FeedInput]) -> Result<Vec<FeedOutcome>, Error> {
        let geometry = self.config.preprocess.geometry();
        let resolver = &self.resolver;
        let cache = &self.cache;

        let outcomes = par_map_bounded(feeds, self.config.scheduler.max_workers, |input| {
            if let Some(cached) = cache.get(&input.name) {
                return Ok((cached.clone(), true));
            }
            resolver
                .resolve_accepted(&input.matrix, input.reference, geometry)
                .map(|transforms| (transforms, false))
                .map_err(|e| feed_failure(&input.name, e.into()))
        })?;

        let mut resolved = 0;
        let outcomes: Vec<FeedOutcome> = feeds
            .iter()
            .zip(outcomes)
            .map(|(input, outcome)| {
                outcome.map(|(transforms, cached)| {
                    if !cached {
                        resolved += 1;
                        self.cache.insert(&input.name, transforms.clone());
                    }
                    transforms
                })
            })
            .collect();

        info!(
            feeds = feeds.len(),
            resolved,
            failed = outcomes.iter().filter(|o| o.is_err()).count(),
            "Resolved feeds"
        );
        Ok(outcomes)
    }
}

fn feed_failure(feed: &str, source: Error) -> FeedProcessingFailure {
    let failure = FeedProcessingFailure {
        feed: feed.to_string(),
        source,
    };
    error!(feed, "{}", failure);
    failure
}

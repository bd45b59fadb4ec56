//! Bounded parallel map on a dedicated rayon pool.

use rayon::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum ParallelError {
    #[error("max_concurrent must be > 0")]
    ZeroConcurrency,
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Maps `f` over `items` with at most `max_concurrent` items in flight.
///
/// Runs on a private pool of `max_concurrent` threads, so the global rayon pool
/// is left untouched. Output order matches input order.
pub fn par_map_bounded<T, R, F>(
    items: &[T],
    max_concurrent: usize,
    f: F,
) -> Result<Vec<R>, ParallelError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if max_concurrent == 0 {
        return Err(ParallelError::ZeroConcurrency);
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_concurrent.min(items.len()))
        .thread_name(|i| format!("par-map-{i}"))
        .build()?;

    Ok(pool.install(|| items.par_iter().map(&f).collect()))
}

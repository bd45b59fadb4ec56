//! Progress reporting for registration scheduling.

use std::sync::Arc;

use common::SharedFn;

/// Reported after each block pair batch completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationProgress {
    pub completed_block_pairs: usize,
    pub total_block_pairs: usize,
    pub reference_block: usize,
    pub target_block: usize,
}

/// Callback type for progress reporting.
pub type ProgressCallback = SharedFn<dyn Fn(RegistrationProgress) + Send + Sync>;

pub fn progress_callback<F>(f: F) -> ProgressCallback
where
    F: Fn(RegistrationProgress) + Send + Sync + 'static,
{
    SharedFn::Some(Arc::new(f))
}

/// Report progress using the callback if set.
pub fn report_progress(callback: &ProgressCallback, progress: RegistrationProgress) {
    if let Some(f) = callback.as_ref() {
        f(progress);
    }
}

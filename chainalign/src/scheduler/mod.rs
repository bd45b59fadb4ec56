//! Block-windowed parallel registration scheduler.
//!
//! For each block pair of the [`RegistrationPlan`] a batch of independent jobs is
//! queued and drained by `max_workers` worker tasks. Each job runs the blocking
//! registration delegate on tokio's blocking pool under an optional timeout and
//! sends its outcomes over a channel. A delegate call holds one of `max_workers`
//! permits until it really returns, so calls that outlived their timeout still
//! count against the pool; the scheduler alone integrates them into the
//! [`RegistrationMatrix`] once the batch is done. A failed, timed-out or crashed
//! registration leaves its matrix entry absent and never aborts the feed.

mod config;
mod plan;

#[cfg(test)]
mod tests;

pub use config::{DispatchMode, SchedulerConfig};
pub use plan::{block_range, sample_range, BlockPairPlan, RegistrationPlan};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use common::Shared;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Error, RegistrationFailure};
use crate::matrix::RegistrationMatrix;
use crate::progress::{report_progress, ProgressCallback, RegistrationProgress};
use crate::registration::{ReferenceSession, Registrar};
use crate::transform::Transform;

/// Counts of what happened to the scheduled pairs of one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub block_pairs: usize,
    pub scheduled: usize,
    pub registered: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub crashed: usize,
}

impl SchedulerReport {
    pub fn absent(&self) -> usize {
        self.failed + self.timed_out + self.crashed
    }
}

/// Filled matrix of one feed plus the run summary.
#[derive(Debug, Clone)]
pub struct ScheduleOutput {
    pub matrix: RegistrationMatrix,
    pub report: SchedulerReport,
}

#[derive(Debug, Clone)]
enum Job {
    Row { reference: usize, targets: Vec<usize> },
    Pair { reference: usize, target: usize },
}

impl Job {
    fn pairs(&self) -> Vec<(usize, usize)> {
        match self {
            Job::Row { reference, targets } => targets.iter().map(|&t| (*reference, t)).collect(),
            Job::Pair { reference, target } => vec![(*reference, *target)],
        }
    }

    fn run<R: Registrar>(&self, registrar: &R, frames: &[R::Frame]) -> Vec<PairOutcome> {
        match *self {
            Job::Pair { reference, target } => vec![PairOutcome {
                reference,
                target,
                result: registrar.register_pair(&frames[reference], &frames[target]),
            }],
            Job::Row {
                reference,
                ref targets,
            } => match registrar.with_reference(&frames[reference]) {
                Ok(mut session) => targets
                    .iter()
                    .map(|&target| PairOutcome {
                        reference,
                        target,
                        result: session.register(&frames[target]),
                    })
                    .collect(),
                Err(failure) => PairOutcome::fail_all(&self.pairs(), failure),
            },
        }
    }
}

#[derive(Debug)]
struct PairOutcome {
    reference: usize,
    target: usize,
    result: Result<Transform, RegistrationFailure>,
}

impl PairOutcome {
    fn fail_all(pairs: &[(usize, usize)], failure: RegistrationFailure) -> Vec<PairOutcome> {
        pairs
            .iter()
            .map(|&(reference, target)| PairOutcome {
                reference,
                target,
                result: Err(failure.clone()),
            })
            .collect()
    }
}

/// Schedules and runs the pairwise registrations of a feed.
#[derive(Debug)]
pub struct Scheduler<R: Registrar> {
    config: SchedulerConfig,
    registrar: Arc<R>,
    progress: ProgressCallback,
}

impl<R: Registrar> Scheduler<R> {
    pub fn new(config: SchedulerConfig, registrar: Arc<R>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registrar,
            progress: ProgressCallback::default(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn plan(&self, frame_count: usize) -> RegistrationPlan {
        RegistrationPlan::new(frame_count, &self.config)
    }

    /// Registers all planned pairs of `frames` and returns the filled matrix.
    pub async fn run(&self, frames: Arc<[R::Frame]>) -> ScheduleOutput {
        let plan = self.plan(frames.len());
        let mut matrix = RegistrationMatrix::new(frames.len());
        let mut report = SchedulerReport {
            block_pairs: plan.block_pairs().len(),
            ..SchedulerReport::default()
        };

        info!(
            frame_count = frames.len(),
            block_count = plan.block_count(),
            block_pairs = plan.block_pairs().len(),
            pairs = plan.pair_count(),
            "Starting image registration"
        );

        let slots = Arc::new(Semaphore::new(self.config.max_workers));
        let total = plan.block_pairs().len();
        for (done, block_pair) in plan.block_pairs().iter().enumerate() {
            let outcomes = self.run_batch(block_pair, &frames, &slots).await;
            debug!(
                reference_block = block_pair.reference_block,
                target_block = block_pair.target_block,
                distance = block_pair.distance,
                outcomes = outcomes.len(),
                "Block pair registered"
            );
            for outcome in outcomes {
                integrate(&mut matrix, &mut report, outcome);
            }

            report_progress(
                &self.progress,
                RegistrationProgress {
                    completed_block_pairs: done + 1,
                    total_block_pairs: total,
                    reference_block: block_pair.reference_block,
                    target_block: block_pair.target_block,
                },
            );
        }

        info!(
            registered = report.registered,
            failed = report.failed,
            timed_out = report.timed_out,
            crashed = report.crashed,
            "Image registration completed"
        );
        ScheduleOutput { matrix, report }
    }

    /// Runs [`run`](Self::run) on a private multi-thread runtime.
    ///
    /// Must not be called from inside a tokio runtime. Blocking calls that
    /// outlived their timeout are left to finish in the background.
    pub fn run_blocking(&self, frames: Arc<[R::Frame]>) -> Result<ScheduleOutput, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_workers)
            .thread_name("registration")
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        let output = runtime.block_on(self.run(frames));
        runtime.shutdown_background();
        Ok(output)
    }

    fn jobs_for(&self, block_pair: &BlockPairPlan) -> VecDeque<Job> {
        match self.config.dispatch {
            DispatchMode::OneToMany => block_pair
                .reference_frames
                .iter()
                .filter_map(|&reference| {
                    let targets = block_pair.targets_for(reference);
                    (!targets.is_empty()).then_some(Job::Row { reference, targets })
                })
                .collect(),
            DispatchMode::Pairwise => block_pair
                .pairs()
                .map(|(reference, target)| Job::Pair { reference, target })
                .collect(),
        }
    }

    async fn run_batch(
        &self,
        block_pair: &BlockPairPlan,
        frames: &Arc<[R::Frame]>,
        slots: &Arc<Semaphore>,
    ) -> Vec<PairOutcome> {
        let jobs = self.jobs_for(block_pair);
        if jobs.is_empty() {
            return Vec::new();
        }

        let worker_count = self.config.max_workers.min(jobs.len());
        let queue = Shared::new(jobs);
        let (result_tx, mut result_rx) = unbounded_channel::<PairOutcome>();

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            workers.spawn(worker_loop(
                queue.clone(),
                result_tx.clone(),
                Arc::clone(&self.registrar),
                Arc::clone(frames),
                Arc::clone(slots),
                self.config.task_timeout(),
            ));
        }
        drop(result_tx);

        let mut outcomes = Vec::new();
        while let Some(outcome) = result_rx.recv().await {
            outcomes.push(outcome);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(
                    reference_block = block_pair.reference_block,
                    target_block = block_pair.target_block,
                    "Registration worker terminated abnormally: {}",
                    e
                );
            }
        }

        outcomes
    }
}

async fn worker_loop<R: Registrar>(
    queue: Shared<VecDeque<Job>>,
    results: UnboundedSender<PairOutcome>,
    registrar: Arc<R>,
    frames: Arc<[R::Frame]>,
    slots: Arc<Semaphore>,
    timeout: Option<Duration>,
) {
    loop {
        let Some(job) = queue.lock().await.pop_front() else {
            break;
        };
        for outcome in execute_job(job, &registrar, &frames, &slots, timeout).await {
            if results.send(outcome).is_err() {
                return;
            }
        }
    }
}

async fn execute_job<R: Registrar>(
    job: Job,
    registrar: &Arc<R>,
    frames: &Arc<[R::Frame]>,
    slots: &Arc<Semaphore>,
    timeout: Option<Duration>,
) -> Vec<PairOutcome> {
    let pairs = job.pairs();
    let permit = match Arc::clone(slots).acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            return PairOutcome::fail_all(&pairs, RegistrationFailure::WorkerCrashed(e.to_string()))
        }
    };
    let handle = {
        let registrar = Arc::clone(registrar);
        let frames = Arc::clone(frames);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job.run(registrar.as_ref(), &frames)
        })
    };

    let joined = match timeout {
        Some(after) => match tokio::time::timeout(after, handle).await {
            Ok(joined) => joined,
            Err(_) => return PairOutcome::fail_all(&pairs, RegistrationFailure::TimedOut { after }),
        },
        None => handle.await,
    };

    match joined {
        Ok(outcomes) => outcomes,
        Err(e) => PairOutcome::fail_all(&pairs, RegistrationFailure::WorkerCrashed(e.to_string())),
    }
}

fn integrate(matrix: &mut RegistrationMatrix, report: &mut SchedulerReport, outcome: PairOutcome) {
    report.scheduled += 1;
    let PairOutcome {
        reference,
        target,
        result,
    } = outcome;

    let failure = match result {
        Ok(transform) => match matrix.insert(reference, target, transform) {
            Ok(_) => {
                report.registered += 1;
                return;
            }
            Err(e) => {
                debug!(reference, target, "Discarding registration: {}", e);
                RegistrationFailure::InvalidTransform
            }
        },
        Err(failure) => failure,
    };

    match failure {
        RegistrationFailure::TimedOut { .. } => report.timed_out += 1,
        RegistrationFailure::WorkerCrashed(_) => {
            report.crashed += 1;
            warn!(reference, target, "Registration left absent: {}", failure);
            return;
        }
        RegistrationFailure::Delegate(_) | RegistrationFailure::InvalidTransform => {
            report.failed += 1
        }
    }
    debug!(reference, target, "Registration left absent: {}", failure);
}

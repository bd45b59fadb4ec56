use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::progress::progress_callback;

#[derive(Debug, Clone)]
struct Frame {
    index: usize,
    pose: Transform,
}

fn frames(count: usize) -> Arc<[Frame]> {
    (0..count)
        .map(|index| Frame {
            index,
            pose: Transform::new(
                index as f64 * 1.5,
                -(index as f64) * 0.25,
                1.0 + index as f64 * 0.001,
                index as f64 * 0.1,
                1.0,
            ),
        })
        .collect::<Vec<_>>()
        .into()
}

fn expected(reference: &Frame, target: &Frame) -> Transform {
    let mut t = reference.pose.inverse().compose(&target.pose);
    t.confidence = 0.9;
    t
}

#[derive(Debug, Default)]
struct FakeRegistrar {
    failing_pairs: HashSet<(usize, usize)>,
    panicking_references: HashSet<usize>,
    slow_references: HashSet<usize>,
    invalid_pairs: HashSet<(usize, usize)>,
    delay: Option<Duration>,
    sessions: AtomicUsize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRegistrar {
    fn compute(&self, reference: &Frame, target: &Frame) -> Result<Transform, RegistrationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.slow_references.contains(&reference.index) {
            std::thread::sleep(Duration::from_millis(400));
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking_references.contains(&reference.index) {
            panic!("delegate blew up on frame {}", reference.index);
        }
        let key = (reference.index, target.index);
        if self.failing_pairs.contains(&key) {
            return Err(RegistrationFailure::Delegate("no peak".to_string()));
        }
        if self.invalid_pairs.contains(&key) {
            return Ok(Transform::new(0.0, 0.0, 0.0, 0.0, 0.5));
        }
        Ok(expected(reference, target))
    }
}

struct FakeSession {
    registrar: Arc<FakeRegistrar>,
    reference: Frame,
}

impl ReferenceSession<Frame> for FakeSession {
    fn register(&mut self, target: &Frame) -> Result<Transform, RegistrationFailure> {
        self.registrar.compute(&self.reference, target)
    }
}

#[derive(Debug, Default)]
struct Delegate(Arc<FakeRegistrar>);

impl Registrar for Delegate {
    type Frame = Frame;
    type Session = FakeSession;

    fn register_pair(&self, reference: &Frame, target: &Frame) -> Result<Transform, RegistrationFailure> {
        self.0.compute(reference, target)
    }

    fn with_reference(&self, reference: &Frame) -> Result<FakeSession, RegistrationFailure> {
        self.0.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            registrar: Arc::clone(&self.0),
            reference: reference.clone(),
        })
    }
}

fn small_config() -> SchedulerConfig {
    SchedulerConfig {
        block_size: 8,
        block_skip_distance: 2,
        max_workers: 3,
        task_timeout_secs: None,
        ..SchedulerConfig::default()
    }
}

fn scheduler(config: SchedulerConfig, fake: FakeRegistrar) -> (Scheduler<Delegate>, Arc<FakeRegistrar>) {
    let fake = Arc::new(fake);
    let scheduler = Scheduler::new(config, Arc::new(Delegate(Arc::clone(&fake)))).unwrap();
    (scheduler, fake)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_planned_pair_is_registered() {
    let frames = frames(30);
    let (scheduler, fake) = scheduler(small_config(), FakeRegistrar::default());
    let plan = scheduler.plan(frames.len());

    let output = scheduler.run(Arc::clone(&frames)).await;

    assert_eq!(output.matrix.frame_count(), 30);
    assert_eq!(output.matrix.len(), plan.pair_count());
    assert_eq!(output.report.registered, plan.pair_count());
    assert_eq!(output.report.absent(), 0);
    for (r, t) in plan.pairs() {
        let stored = output.matrix.get(r, t).unwrap();
        assert!(stored.approx_eq(&expected(&frames[r], &frames[t]), 1e-9));
    }
    // One session per reference frame that had targets.
    let rows: usize = plan
        .block_pairs()
        .iter()
        .map(|bp| {
            bp.reference_frames
                .iter()
                .filter(|&&r| !bp.targets_for(r).is_empty())
                .count()
        })
        .sum();
    assert_eq!(fake.sessions.load(Ordering::SeqCst), rows);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pairwise_dispatch_matches_one_to_many() {
    let frames = frames(20);
    let (rows, _) = scheduler(small_config(), FakeRegistrar::default());
    let (pairs, fake) = scheduler(
        SchedulerConfig {
            dispatch: DispatchMode::Pairwise,
            ..small_config()
        },
        FakeRegistrar::default(),
    );

    let a = rows.run(Arc::clone(&frames)).await;
    let b = pairs.run(Arc::clone(&frames)).await;

    assert_eq!(a.matrix, b.matrix);
    assert_eq!(fake.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_pairs_are_left_absent() {
    let frames = frames(16);
    let fake = FakeRegistrar {
        failing_pairs: [(5, 2), (12, 4)].into_iter().collect(),
        invalid_pairs: [(7, 6)].into_iter().collect(),
        ..FakeRegistrar::default()
    };
    let (scheduler, _) = scheduler(small_config(), fake);
    let plan = scheduler.plan(frames.len());

    let output = scheduler.run(frames).await;

    assert!(!output.matrix.contains(5, 2));
    assert!(!output.matrix.contains(12, 4));
    assert!(!output.matrix.contains(7, 6));
    assert!(output.matrix.contains(5, 3));
    assert_eq!(output.report.failed, 3);
    assert_eq!(output.matrix.len(), plan.pair_count() - 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crashed_worker_only_loses_its_row() {
    let frames = frames(16);
    let fake = FakeRegistrar {
        panicking_references: [9].into_iter().collect(),
        ..FakeRegistrar::default()
    };
    let (scheduler, _) = scheduler(small_config(), fake);
    let plan = scheduler.plan(frames.len());
    let lost = plan.pairs().filter(|&(r, _)| r == 9).count();
    assert!(lost > 0);

    let output = scheduler.run(frames).await;

    assert_eq!(output.report.crashed, lost);
    assert_eq!(output.matrix.len(), plan.pair_count() - lost);
    assert!(output.matrix.iter().all(|((r, _), _)| r != 9));
    assert!(output.matrix.contains(10, 9));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timed_out_task_is_absent() {
    let frames = frames(6);
    let fake = FakeRegistrar {
        slow_references: [4].into_iter().collect(),
        ..FakeRegistrar::default()
    };
    let config = SchedulerConfig {
        task_timeout_secs: Some(0.05),
        ..small_config()
    };
    let (scheduler, _) = scheduler(config, fake);

    let output = scheduler.run(frames).await;

    assert_eq!(output.report.timed_out, 4);
    assert!((0..4).all(|t| !output.matrix.contains(4, t)));
    assert!(output.matrix.contains(5, 4));
    assert!(output.matrix.contains(3, 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_all_pairs_failing_gives_empty_matrix() {
    let frames = frames(10);
    let fake = FakeRegistrar {
        panicking_references: (0..10).collect(),
        ..FakeRegistrar::default()
    };
    let (scheduler, _) = scheduler(small_config(), fake);

    let output = scheduler.run(frames).await;

    assert!(output.matrix.is_empty());
    assert_eq!(output.matrix.frame_count(), 10);
    assert_eq!(output.report.registered, 0);
    assert_eq!(output.report.absent(), output.report.scheduled);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_count_is_bounded() {
    let frames = frames(24);
    let fake = FakeRegistrar {
        delay: Some(Duration::from_millis(5)),
        ..FakeRegistrar::default()
    };
    let config = SchedulerConfig {
        max_workers: 2,
        dispatch: DispatchMode::Pairwise,
        ..small_config()
    };
    let (scheduler, fake) = scheduler(config, fake);

    scheduler.run(frames).await;

    let max = fake.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 2, "max in-flight was {max}, expected <= 2");
    assert!(fake.calls.load(Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timed_out_calls_still_hold_their_worker_slot() {
    let frames = frames(5);
    let fake = FakeRegistrar {
        delay: Some(Duration::from_millis(60)),
        ..FakeRegistrar::default()
    };
    let config = SchedulerConfig {
        max_workers: 1,
        task_timeout_secs: Some(0.02),
        dispatch: DispatchMode::Pairwise,
        ..small_config()
    };
    let (scheduler, fake) = scheduler(config, fake);
    let pairs = scheduler.plan(frames.len()).pair_count();

    let output = scheduler.run(frames).await;

    assert_eq!(output.report.timed_out, pairs);
    assert!(output.matrix.is_empty());
    let max = fake.max_in_flight.load(Ordering::SeqCst);
    assert_eq!(max, 1, "max in-flight was {max}, expected 1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_progress_reports_every_block_pair() {
    let frames = frames(30);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (scheduler, _) = scheduler(small_config(), FakeRegistrar::default());
    let scheduler = scheduler.with_progress(progress_callback({
        let seen = Arc::clone(&seen);
        move |p| seen.lock().unwrap().push(p)
    }));
    let total = scheduler.plan(frames.len()).block_pairs().len();

    scheduler.run(frames).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), total);
    assert_eq!(seen.last().unwrap().completed_block_pairs, total);
    assert!(seen.iter().all(|p| p.total_block_pairs == total));
}

#[test]
fn test_run_blocking() {
    let frames = frames(12);
    let (scheduler, _) = scheduler(small_config(), FakeRegistrar::default());
    let expected_pairs = scheduler.plan(frames.len()).pair_count();

    let output = scheduler.run_blocking(frames).unwrap();

    assert_eq!(output.matrix.len(), expected_pairs);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SchedulerConfig {
        max_workers: 0,
        ..SchedulerConfig::default()
    };
    assert!(Scheduler::new(config, Arc::new(Delegate::default())).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_feed() {
    let (scheduler, fake) = scheduler(small_config(), FakeRegistrar::default());
    let output = scheduler.run(frames(0)).await;
    assert!(output.matrix.is_empty());
    assert_eq!(output.report, SchedulerReport::default());
    assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
}

//! Which frame pairs get registered.
//!
//! Frames are split into contiguous blocks. Block pairs at distance
//! `d <= block_skip_distance` are registered on a sampled subset of their frames,
//! with sampling step `density_decay_factor^d`: neighbouring blocks densely,
//! distant blocks sparsely. Total work stays far below `O(N^2)` while long-range
//! drift is still measured.

use std::ops::Range;

use crate::scheduler::config::SchedulerConfig;

/// Frame indices of `block`.
pub fn block_range(block: usize, block_size: usize, frame_count: usize) -> Range<usize> {
    let start = (block * block_size).min(frame_count);
    let end = ((block + 1) * block_size).min(frame_count);
    start..end
}

/// `start + floor(k * step)` for `k = 0, 1, ...` while inside `range`.
///
/// `step >= 1`, so the samples are strictly increasing. A non-empty range
/// always yields `range.start`, even for an infinite step.
pub fn sample_range(range: Range<usize>, step: f64) -> Vec<usize> {
    let len = range.len() as f64;
    std::iter::once(0.0)
        .chain((1usize..).map(|k| (k as f64 * step).floor()))
        .take_while(|&offset| offset < len)
        .map(|offset| range.start + offset as usize)
        .collect()
}

/// Registration work between two blocks. `reference_block >= target_block`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPairPlan {
    pub reference_block: usize,
    pub target_block: usize,
    pub distance: usize,
    pub reference_frames: Vec<usize>,
    pub target_frames: Vec<usize>,
}

impl BlockPairPlan {
    /// Sampled frames on both sides (a block paired with itself counts twice).
    pub fn sampled_count(&self) -> usize {
        self.reference_frames.len() + self.target_frames.len()
    }

    /// Targets registered against `reference`: only older frames, so a frame is
    /// never registered against itself and no pair is scheduled twice.
    pub fn targets_for(&self, reference: usize) -> Vec<usize> {
        self.target_frames
            .iter()
            .copied()
            .filter(|&t| t < reference)
            .collect()
    }

    /// `(reference, target)` pairs, `reference > target`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.reference_frames.iter().flat_map(move |&r| {
            self.target_frames
                .iter()
                .filter(move |&&t| t < r)
                .map(move |&t| (r, t))
        })
    }

    pub fn pair_count(&self) -> usize {
        self.pairs().count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationPlan {
    frame_count: usize,
    block_count: usize,
    block_pairs: Vec<BlockPairPlan>,
}

impl RegistrationPlan {
    /// Block pairs newest first: reference block descending, then target block
    /// ascending.
    pub fn new(frame_count: usize, config: &SchedulerConfig) -> Self {
        let block_size = config.block_size.max(1);
        let block_count = frame_count.div_ceil(block_size);

        let mut block_pairs = Vec::new();
        for i in (0..block_count).rev() {
            for j in 0..=i {
                let distance = i - j;
                if distance > config.block_skip_distance {
                    continue;
                }
                let step = config.sampling_step(distance);
                let reference_frames =
                    sample_range(block_range(i, block_size, frame_count), step);
                let target_frames = sample_range(block_range(j, block_size, frame_count), step);
                block_pairs.push(BlockPairPlan {
                    reference_block: i,
                    target_block: j,
                    distance,
                    reference_frames,
                    target_frames,
                });
            }
        }

        Self {
            frame_count,
            block_count,
            block_pairs,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn block_pairs(&self) -> &[BlockPairPlan] {
        &self.block_pairs
    }

    pub fn pair_count(&self) -> usize {
        self.block_pairs.iter().map(BlockPairPlan::pair_count).sum()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.block_pairs.iter().flat_map(BlockPairPlan::pairs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn config(block_size: usize, block_skip_distance: usize) -> SchedulerConfig {
        SchedulerConfig {
            block_size,
            block_skip_distance,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn test_block_range_last_block_is_shorter() {
        assert_eq!(block_range(0, 24, 100), 0..24);
        assert_eq!(block_range(4, 24, 100), 96..100);
        assert_eq!(block_range(5, 24, 100), 100..100);
    }

    #[test]
    fn test_sample_range() {
        assert_eq!(sample_range(10..15, 1.0), vec![10, 11, 12, 13, 14]);
        assert_eq!(sample_range(0..10, 1.35), vec![0, 1, 2, 4, 5, 6, 8, 9]);
        assert_eq!(sample_range(0..10, 4.0), vec![0, 4, 8]);
        assert!(sample_range(5..5, 1.0).is_empty());
    }

    #[test]
    fn test_sample_range_keeps_block_start_for_huge_steps() {
        assert_eq!(sample_range(8..12, f64::INFINITY), vec![8]);
        assert_eq!(sample_range(8..12, 1e300), vec![8]);
        assert!(sample_range(8..8, f64::INFINITY).is_empty());
    }

    #[test]
    fn test_steep_decay_still_samples_distant_blocks() {
        let config = SchedulerConfig {
            block_size: 4,
            density_decay_factor: 1e40,
            ..SchedulerConfig::default()
        };
        let plan = RegistrationPlan::new(40, &config);
        let distant: Vec<_> = plan.block_pairs().iter().filter(|bp| bp.distance == 8).collect();
        assert!(!distant.is_empty());
        for bp in distant {
            assert_eq!(bp.reference_frames, vec![bp.reference_block * 4]);
            assert_eq!(bp.target_frames, vec![bp.target_block * 4]);
            assert_eq!(bp.pair_count(), 1);
        }
    }

    #[test]
    fn test_blocks_beyond_skip_distance_are_never_scheduled() {
        let plan = RegistrationPlan::new(100, &config(24, 8));
        assert_eq!(plan.block_count(), 5);
        // 5 blocks, every distance <= 4 allowed: 5 + 4 + 3 + 2 + 1 pairs.
        assert_eq!(plan.block_pairs().len(), 15);
        assert!(plan.block_pairs().iter().all(|bp| bp.distance <= 8));

        let plan = RegistrationPlan::new(1000, &config(24, 8));
        assert!(plan
            .block_pairs()
            .iter()
            .all(|bp| bp.reference_block - bp.target_block <= 8));
        assert!(plan.block_pairs().iter().any(|bp| bp.distance == 8));
    }

    #[test]
    fn test_sampling_decays_with_distance() {
        let plan = RegistrationPlan::new(1000, &config(24, 8));
        // Full-sized blocks only, so block length does not mask the decay.
        let mut count_at: Vec<Option<usize>> = vec![None; 9];
        for bp in plan.block_pairs() {
            if bp.reference_block < 41 {
                let count = bp.sampled_count();
                match count_at[bp.distance] {
                    Some(c) => assert_eq!(c, count),
                    None => count_at[bp.distance] = Some(count),
                }
            }
        }
        let counts: Vec<usize> = count_at.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(counts[0], 48);
        for d in 1..counts.len() {
            assert!(
                counts[d] <= counts[d - 1],
                "distance {d}: {} > {}",
                counts[d],
                counts[d - 1]
            );
        }
        assert!(counts[8] < counts[0]);
    }

    #[test]
    fn test_pairs_are_unique_and_ordered() {
        let plan = RegistrationPlan::new(100, &config(24, 8));
        let mut seen = HashSet::new();
        for (r, t) in plan.pairs() {
            assert!(r > t, "pair ({r}, {t})");
            assert!(r < 100);
            assert!(seen.insert((r, t)), "pair ({r}, {t}) scheduled twice");
        }
        assert_eq!(seen.len(), plan.pair_count());
    }

    #[test]
    fn test_same_block_registers_all_older_frames() {
        let plan = RegistrationPlan::new(5, &config(24, 8));
        assert_eq!(plan.block_pairs().len(), 1);
        let bp = &plan.block_pairs()[0];
        assert_eq!(bp.distance, 0);
        assert_eq!(bp.pair_count(), 10);
        assert_eq!(bp.targets_for(3), vec![0, 1, 2]);
        assert!(bp.targets_for(0).is_empty());
    }

    #[test]
    fn test_newest_blocks_first() {
        let plan = RegistrationPlan::new(72, &config(24, 8));
        let order: Vec<(usize, usize)> = plan
            .block_pairs()
            .iter()
            .map(|bp| (bp.reference_block, bp.target_block))
            .collect();
        assert_eq!(order, vec![(2, 0), (2, 1), (2, 2), (1, 0), (1, 1), (0, 0)]);
    }

    #[test]
    fn test_empty_feed() {
        let plan = RegistrationPlan::new(0, &config(24, 8));
        assert_eq!(plan.block_count(), 0);
        assert!(plan.block_pairs().is_empty());
    }
}

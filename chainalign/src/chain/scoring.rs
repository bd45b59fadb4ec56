//! Best-chain scoring by label-correcting relaxation.
//!
//! Scores are products of per-hop confidences, each extra hop discounted by
//! `(1 - HOP_EPSILON) * chain_penalty`. Every pair is an edge: an unmeasured
//! pair scores [`FLOOR_SCORE`], so every frame ends up in the table.

use tracing::debug;

use crate::matrix::RegistrationMatrix;

/// Score of a pair with no matrix entry, and the lower clamp for measured ones.
pub const FLOOR_SCORE: f64 = 1e-4;

/// Fixed per-hop discount on top of the chain penalty.
pub const HOP_EPSILON: f64 = 1e-6;

/// Score of the reference frame itself.
pub const REFERENCE_SCORE: f64 = 1.0 - HOP_EPSILON;

pub fn edge_score(matrix: &RegistrationMatrix, a: usize, b: usize) -> f64 {
    match matrix.get(a, b) {
        Some(t) => t.confidence.clamp(FLOOR_SCORE, 1.0),
        None => FLOOR_SCORE,
    }
}

pub fn combined_score(to_next_hop: f64, next_hop_to_root: f64, chain_penalty: f64) -> f64 {
    to_next_hop * next_hop_to_root * (1.0 - HOP_EPSILON) * chain_penalty
}

/// Next hop toward the reference and accumulated score, per frame.
///
/// Scores strictly decrease along parent links, so the parent links always
/// form a tree rooted at the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimalChainTable {
    reference: usize,
    parent: Vec<usize>,
    score: Vec<f64>,
    rounds: usize,
}

impl OptimalChainTable {
    /// `reference` must be below `matrix.frame_count()`.
    pub(crate) fn build(matrix: &RegistrationMatrix, reference: usize, chain_penalty: f64) -> Self {
        let n = matrix.frame_count();
        let mut parent = vec![reference; n];
        let mut score: Vec<f64> = (0..n)
            .map(|k| {
                if k == reference {
                    REFERENCE_SCORE
                } else {
                    edge_score(matrix, k, reference)
                }
            })
            .collect();

        let mut frontier: Vec<usize> = (0..n).collect();
        let mut rounds = 0;
        while !frontier.is_empty() {
            rounds += 1;
            let mut changed = vec![false; n];
            for base in (0..n).filter(|&base| base != reference) {
                for &target in &frontier {
                    if target == base {
                        continue;
                    }
                    let candidate =
                        combined_score(edge_score(matrix, base, target), score[target], chain_penalty);
                    if candidate > score[base] {
                        score[base] = candidate;
                        parent[base] = target;
                        changed[base] = true;
                    }
                }
            }
            frontier = (0..n).filter(|&k| changed[k]).collect();
            debug!(round = rounds, changed = frontier.len(), "Chain relaxation round");
        }

        Self {
            reference,
            parent,
            score,
            rounds,
        }
    }

    pub fn reference(&self) -> usize {
        self.reference
    }

    pub fn frame_count(&self) -> usize {
        self.parent.len()
    }

    pub fn parent(&self, frame: usize) -> Option<usize> {
        self.parent.get(frame).copied()
    }

    pub fn score(&self, frame: usize) -> Option<f64> {
        self.score.get(frame).copied()
    }

    pub fn parents(&self) -> &[usize] {
        &self.parent
    }

    /// Relaxation rounds until no score changed.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Frames from `frame` up to and including the reference.
    ///
    /// `None` for an out-of-range frame or if the walk does not reach the
    /// reference within `frame_count` hops.
    pub fn chain_to_reference(&self, frame: usize) -> Option<Vec<usize>> {
        let mut chain = vec![frame];
        let mut current = frame;
        while current != self.reference {
            if chain.len() > self.frame_count() {
                return None;
            }
            current = self.parent(current)?;
            chain.push(current);
        }
        Some(chain)
    }
}

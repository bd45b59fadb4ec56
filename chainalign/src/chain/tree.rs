//! Composition of per-frame transforms along the chain tree.

use crate::chain::scoring::OptimalChainTable;
use crate::matrix::RegistrationMatrix;
use crate::transform::Transform;

/// `children[p]` lists the frames whose next hop is `p`, in ascending order.
pub(crate) fn children(table: &OptimalChainTable) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::new(); table.frame_count()];
    for (frame, &parent) in table.parents().iter().enumerate() {
        if frame != table.reference() {
            children[parent].push(frame);
        }
    }
    children
}

pub(crate) struct Composition {
    pub transforms: Vec<Option<Transform>>,
    pub chain_lengths: Vec<Option<usize>>,
}

/// Walks the tree from the reference with an explicit stack, composing
/// `child_to_parent * parent_to_reference` for each child.
///
/// A child whose link to its parent has no matrix entry stays unresolved, and
/// so does its whole subtree.
pub(crate) fn compose(matrix: &RegistrationMatrix, table: &OptimalChainTable) -> Composition {
    let n = table.frame_count();
    let children = children(table);
    let mut transforms = vec![None; n];
    let mut chain_lengths = vec![None; n];

    let reference = table.reference();
    transforms[reference] = Some(Transform::identity());
    chain_lengths[reference] = Some(0);

    let mut stack = vec![reference];
    while let Some(node) = stack.pop() {
        let (Some(to_reference), Some(length)) = (transforms[node], chain_lengths[node]) else {
            continue;
        };
        for &child in &children[node] {
            if let Some(direct) = matrix.transform_between(child, node) {
                transforms[child] = Some(direct * to_reference);
                chain_lengths[child] = Some(length + 1);
                stack.push(child);
            }
        }
    }

    Composition {
        transforms,
        chain_lengths,
    }
}

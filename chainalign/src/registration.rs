//! Pairwise registration delegate seam.
//!
//! How a transform is estimated (Fourier-Mellin, feature matching, ...) is up to
//! the implementor. The scheduler only needs the two call shapes below.

use crate::error::RegistrationFailure;
use crate::transform::Transform;

/// Computes the transform of `target` relative to `reference`, with its
/// confidence in [`Transform::confidence`].
///
/// Calls are blocking and may run concurrently on several worker threads.
pub trait Registrar: Send + Sync + 'static {
    type Frame: Send + Sync + 'static;
    type Session: ReferenceSession<Self::Frame> + Send;

    fn register_pair(
        &self,
        reference: &Self::Frame,
        target: &Self::Frame,
    ) -> Result<Transform, RegistrationFailure>;

    /// Prepares a reusable session bound to one reference frame, so that its
    /// per-reference work is done once for many targets.
    fn with_reference(&self, reference: &Self::Frame) -> Result<Self::Session, RegistrationFailure>;
}

pub trait ReferenceSession<F> {
    fn register(&mut self, target: &F) -> Result<Transform, RegistrationFailure>;
}

//! Similarity transform with a registration confidence.

use std::ops::Mul;

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// 2-D similarity transform (translation, uniform scale, rotation) annotated with
/// the confidence of the registration that produced it.
///
/// Maps a point as `p' = scale * R(rotation) * p + translation`. Rotation is in
/// degrees, counter-clockwise, matching what the registration delegate reports.
///
/// Composition follows matrix order: `a.compose(&b)` applies `b` first, so if `b`
/// maps `c -> b` and `a` maps `b -> a`, the result maps `c -> a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: DVec2,
    pub scale: f64,
    pub rotation: f64,
    /// Registration quality, nominally in `[0, 1]`.
    pub confidence: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Similarity(dx={:.2}, dy={:.2}, rot={:.3}°, scale={:.4}, confidence={:.3})",
            self.translation.x, self.translation.y, self.rotation, self.scale, self.confidence
        )
    }
}

impl Transform {
    pub fn new(x: f64, y: f64, scale: f64, rotation: f64, confidence: f64) -> Self {
        Self {
            translation: DVec2::new(x, y),
            scale,
            rotation,
            confidence,
        }
    }

    /// Zero translation and rotation, unit scale, full confidence.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 1.0, 0.0, 1.0)
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    /// Finite components and a strictly positive scale.
    pub fn is_valid(&self) -> bool {
        self.translation.is_finite()
            && self.rotation.is_finite()
            && self.confidence.is_finite()
            && self.scale.is_finite()
            && self.scale > 0.0
    }

    /// Linear part `scale * R(rotation)` applied to `v`.
    fn apply_linear(&self, v: DVec2) -> DVec2 {
        DVec2::from_angle(self.rotation.to_radians()).rotate(v) * self.scale
    }

    pub fn apply(&self, p: DVec2) -> DVec2 {
        self.apply_linear(p) + self.translation
    }

    /// Transform in the opposite frame direction, same confidence.
    ///
    /// Only meaningful for [`is_valid`](Self::is_valid) transforms.
    pub fn inverse(&self) -> Self {
        let scale = 1.0 / self.scale;
        let rotation = -self.rotation;
        let translation = -(DVec2::from_angle(rotation.to_radians()).rotate(self.translation) * scale);
        Self {
            translation,
            scale,
            rotation,
            confidence: self.confidence,
        }
    }

    /// `self * other`: apply `other` first, then `self`.
    ///
    /// Confidences multiply, so a composite chain carries the product of its
    /// per-hop confidences.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            translation: self.apply_linear(other.translation) + self.translation,
            scale: self.scale * other.scale,
            rotation: normalize_degrees(self.rotation + other.rotation),
            confidence: self.confidence * other.confidence,
        }
    }

    /// Rescales the translation into another pixel grid. Scale, rotation and
    /// confidence are resolution invariant.
    pub fn with_translation_scaled(&self, px_scaler: f64) -> Self {
        Self {
            translation: self.translation * px_scaler,
            ..*self
        }
    }

    /// Geometric distance from `other`, ignoring confidence.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.translation - other.translation).abs().max_element() <= tolerance
            && (self.scale - other.scale).abs() <= tolerance
            && normalize_degrees(self.rotation - other.rotation).abs() <= tolerance
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        self.compose(&rhs)
    }
}

impl Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Transform {
        self.compose(rhs)
    }
}

/// Wraps an angle in degrees into `(-180, 180]`.
fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Persisted form of a [`Transform`]. Field names match the registration
/// results and chain cache files (`response` is the confidence).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation: f64,
    pub response: f64,
}

impl From<Transform> for TransformRecord {
    fn from(t: Transform) -> Self {
        Self {
            x: t.translation.x,
            y: t.translation.y,
            scale: t.scale,
            rotation: t.rotation,
            response: t.confidence,
        }
    }
}

impl From<TransformRecord> for Transform {
    fn from(r: TransformRecord) -> Self {
        Transform::new(r.x, r.y, r.scale, r.rotation, r.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    fn samples() -> Vec<Transform> {
        vec![
            Transform::new(3.0, -2.0, 1.0, 0.0, 0.9),
            Transform::new(-14.5, 7.25, 1.08, 12.0, 0.6),
            Transform::new(120.0, 0.5, 0.93, -170.0, 0.3),
            Transform::new(0.0, 0.0, 2.0, 90.0, 1.0),
        ]
    }

    #[test]
    fn test_identity_transform() {
        let t = Transform::identity();
        let p = t.apply(DVec2::new(5.0, 7.0));
        assert!(approx_eq(p.x, 5.0));
        assert!(approx_eq(p.y, 7.0));
        assert!(approx_eq(t.confidence, 1.0));
    }

    #[test]
    fn test_rotation_90_degrees() {
        let t = Transform::new(0.0, 0.0, 1.0, 90.0, 1.0);
        let p = t.apply(DVec2::new(1.0, 0.0));
        assert!(approx_eq(p.x, 0.0));
        assert!(approx_eq(p.y, 1.0));
    }

    #[test]
    fn test_similarity_with_rotation_and_scale() {
        let t = Transform::new(5.0, 10.0, 2.0, 90.0, 1.0);
        let p = t.apply(DVec2::new(1.0, 0.0));
        // (1,0) -> rotate (0,1) -> scale (0,2) -> translate
        assert!(approx_eq(p.x, 5.0));
        assert!(approx_eq(p.y, 12.0));
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        for t in samples() {
            let forward = t.compose(&t.inverse());
            let backward = t.inverse().compose(&t);
            assert!(forward.approx_eq(&Transform::identity(), EPSILON), "{t}");
            assert!(backward.approx_eq(&Transform::identity(), EPSILON), "{t}");
        }
    }

    #[test]
    fn test_inverse_keeps_confidence() {
        let t = Transform::new(1.0, 2.0, 1.1, 5.0, 0.42);
        assert!(approx_eq(t.inverse().confidence, 0.42));
    }

    #[test]
    fn test_compose_is_associative() {
        let s = samples();
        for a in &s {
            for b in &s {
                for c in &s {
                    let left = (a * b) * *c;
                    let right = *a * (b * c);
                    assert!(left.approx_eq(&right, 1e-8), "{a} {b} {c}");
                    assert!(approx_eq(left.confidence, right.confidence));
                }
            }
        }
    }

    #[test]
    fn test_compose_matches_sequential_application() {
        let a = Transform::new(4.0, -1.0, 1.2, 30.0, 0.8);
        let b = Transform::new(-3.0, 6.0, 0.9, -75.0, 0.5);
        let p = DVec2::new(11.0, -4.0);
        let composed = (a * b).apply(p);
        let sequential = a.apply(b.apply(p));
        assert!(approx_eq(composed.x, sequential.x));
        assert!(approx_eq(composed.y, sequential.y));
        assert!(approx_eq((a * b).confidence, 0.4));
    }

    #[test]
    fn test_translation_rescale_keeps_other_components() {
        let t = Transform::new(10.0, -4.0, 1.05, 3.0, 0.7);
        let scaled = t.with_translation_scaled(0.8 * 1920.0 / 410.0);
        assert!((scaled.x() - 37.463_414_6).abs() < 1e-6);
        assert!(approx_eq(scaled.scale, 1.05));
        assert!(approx_eq(scaled.rotation, 3.0));
        assert!(approx_eq(scaled.confidence, 0.7));
    }

    #[test]
    fn test_is_valid() {
        assert!(Transform::new(1.0, 2.0, 1.5, 0.5, 0.9).is_valid());
        assert!(!Transform::new(1.0, 2.0, 0.0, 0.5, 0.9).is_valid());
        assert!(!Transform::new(f64::NAN, 2.0, 1.0, 0.5, 0.9).is_valid());
        assert!(!Transform::new(1.0, 2.0, 1.0, f64::INFINITY, 0.9).is_valid());
    }

    #[test]
    fn test_record_conversion() {
        let t = Transform::new(1.0, 2.0, 1.0, 0.0, 0.9);
        let record = TransformRecord::from(t);
        assert!(approx_eq(record.response, 0.9));
        assert_eq!(Transform::from(record), t);
    }
}

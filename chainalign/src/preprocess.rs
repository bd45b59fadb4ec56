//! Preprocessing geometry and the preprocessing delegate seam.
//!
//! Registration runs on frames that were resized so the shorter side equals
//! `max_dimension`, centre-cropped to a square of `max_dimension * crop_scale`
//! and subsampled by `scale_down_factor`. The pixel work is delegated; the
//! geometry lives here because translations found on the processed frames must
//! be rescaled back to original pixels.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Original frame size `(width, height)` in pixels.
    pub image_size: (u32, u32),
    /// Fraction of the resized frame kept by the centre crop.
    pub crop_scale: f64,
    /// Length of the shorter side after resizing.
    pub max_dimension: u32,
    /// Subsampling step applied to the crop.
    pub scale_down_factor: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: (1920, 1080),
            crop_scale: 0.8,
            max_dimension: 1024,
            scale_down_factor: 2,
        }
    }
}

impl PreprocessConfig {
    pub fn new(image_size: (u32, u32)) -> Self {
        Self {
            image_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (w, h) = self.image_size;
        if w == 0 || h == 0 {
            return Err(ConfigError::Invalid(format!(
                "image_size must be non-zero, got {w}x{h}"
            )));
        }
        if !(self.crop_scale > 0.0 && self.crop_scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "crop_scale must be in (0, 1], got {}",
                self.crop_scale
            )));
        }
        if self.max_dimension == 0 || self.scale_down_factor == 0 {
            return Err(ConfigError::Invalid(format!(
                "max_dimension and scale_down_factor must be positive, got {} and {}",
                self.max_dimension, self.scale_down_factor
            )));
        }
        Ok(())
    }

    /// Size after resizing, shorter side equal to `max_dimension`.
    pub fn frame_size(&self) -> (u32, u32) {
        let (w, h) = self.image_size;
        let max = self.max_dimension;
        if w < h {
            (max, (h as f64 / w as f64 * max as f64) as u32)
        } else {
            ((w as f64 / h as f64 * max as f64) as u32, max)
        }
    }

    /// Side of the square centre crop.
    pub fn crop_size(&self) -> u32 {
        (self.max_dimension as f64 * self.crop_scale) as u32
    }

    /// Top-left corner of the crop inside the resized frame.
    pub fn crop_origin(&self) -> (u32, u32) {
        let (w, h) = self.frame_size();
        let crop = self.crop_size();
        (w.saturating_sub(crop) / 2, h.saturating_sub(crop) / 2)
    }

    /// Resolution the registration delegate works at.
    pub fn processed_resolution(&self) -> (u32, u32) {
        let side = self.crop_size() / self.scale_down_factor + 1;
        (side, side)
    }

    pub fn geometry(&self) -> ResolutionGeometry {
        ResolutionGeometry {
            crop_scale: self.crop_scale,
            original_width: self.image_size.0,
            processed_width: self.processed_resolution().0,
        }
    }
}

/// What the chain resolver needs to map processed-frame translations back to
/// original pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionGeometry {
    pub crop_scale: f64,
    pub original_width: u32,
    pub processed_width: u32,
}

impl ResolutionGeometry {
    /// Identity scaling, for matrices already in original pixel units.
    pub fn unscaled() -> Self {
        Self {
            crop_scale: 1.0,
            original_width: 1,
            processed_width: 1,
        }
    }

    pub fn pixel_scaler(&self) -> f64 {
        self.crop_scale * self.original_width as f64 / self.processed_width as f64
    }
}

/// Preprocessing delegate: turns raw frames into processed frames at
/// [`PreprocessConfig::processed_resolution`].
pub trait Preprocess {
    type Raw;
    type Frame;

    fn config(&self) -> &PreprocessConfig;

    fn preprocess(&self, raw: &[Self::Raw]) -> Vec<Self::Frame>;
}

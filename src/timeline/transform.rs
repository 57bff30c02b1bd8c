//! Per-clip transform and picture-adjustment records.
//!
//! Project space stores a top-left origin plus a *signed* scale: the sign
//! encodes horizontal/vertical flip, the magnitude encodes size. Rotation is
//! radians, clockwise-positive. These are the two fields the playback core
//! reads every frame, so they live in plain copyable structs.

use serde::{Deserialize, Serialize};

/// Project-space placement of a clip's picture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipTransform {
    /// Top-left origin in project pixels.
    pub x: f64,
    pub y: f64,
    /// Signed scale; negative flips the axis.
    pub scale_x: f64,
    pub scale_y: f64,
    /// Radians, clockwise-positive.
    pub rotation: f64,
    /// 0.0 transparent .. 1.0 opaque.
    pub opacity: f32,
}

impl Default for ClipTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            opacity: 1.0,
        }
    }
}

impl ClipTransform {
    /// True when either axis is flipped (negative scale).
    pub fn is_flipped(&self) -> bool {
        self.scale_x < 0.0 || self.scale_y < 0.0
    }
}

/// Picture-adjustment parameters, applied when a frame is drawn into the
/// clip's canvas. Treated as an opaque per-clip lookup by the sync core;
/// the ranges follow the usual centered convention:
///
/// - `brightness`: -1.0 (black) to 1.0 (white), 0.0 = no change
/// - `contrast`: -1.0 (flat gray) to 1.0 (doubled), 0.0 = no change
/// - `saturation`: -1.0 (grayscale) to 1.0 (doubled), 0.0 = no change
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PictureAdjust {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl PictureAdjust {
    /// All parameters at their no-op values; lets the draw path skip the pass.
    pub fn is_neutral(&self) -> bool {
        self.brightness.abs() < 1e-4 && self.contrast.abs() < 1e-4 && self.saturation.abs() < 1e-4
    }
}

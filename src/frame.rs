//! Decoded media samples crossing the decode boundary.
//!
//! **Why**: The engine never touches codec state; it only sees timestamped,
//! already-converted RGBA pictures and interleaved f32 audio. Pixel data is
//! shared via `Arc` so a frame can sit in a prefetch slot, a worker result
//! channel and a canvas blit at the same time without copies.

use std::sync::Arc;

/// One decoded picture, RGBA8, tightly packed (`width * height * 4` bytes).
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// Presentation timestamp in source seconds.
    pub pts: f64,
    pub width: usize,
    pub height: usize,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(pts: f64, width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width * height * 4);
        Self {
            pts,
            width,
            height,
            data: data.into(),
        }
    }

    /// Uniform-color frame. Handy for placeholders and tests.
    pub fn solid(pts: f64, width: usize, height: usize, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self::new(pts, width, height, data)
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// One decoded audio buffer, interleaved f32 samples.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    /// Presentation timestamp of the first sample, in source seconds.
    pub pts: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Arc<[f32]>,
}

impl AudioBuffer {
    pub fn new(pts: f64, sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            pts,
            sample_rate,
            channels,
            samples: samples.into(),
        }
    }

    /// Duration covered by this buffer in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / self.channels as usize;
        frames as f64 / self.sample_rate as f64
    }
}

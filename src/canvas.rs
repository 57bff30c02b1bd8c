//! Offscreen composition canvas, one per visible clip.
//!
//! Allocated at the project's *logical* resolution (not the on-screen scaled
//! size) so pictures are resampled exactly once. Cheap-clone: all pixel data
//! sits behind `Arc<Mutex>`, so the engine draws into the same buffer the
//! rendering surface retains for its node.
//!
//! **Used by**: Clip Node Registry (allocation), resolver/scheduler (draws),
//! host surface implementation (presentation).

use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::filter::adjust_pixel;
use crate::frame::VideoFrame;
use crate::timeline::PictureAdjust;

struct CanvasData {
    width: usize,
    height: usize,
    pixels: Vec<u8>, // RGBA8
}

/// Shared offscreen RGBA canvas, reused across frames.
#[derive(Clone)]
pub struct PixelCanvas {
    data: Arc<Mutex<CanvasData>>,
}

impl PixelCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(CanvasData {
                width,
                height,
                pixels: vec![0; width * height * 4],
            })),
        }
    }

    pub fn size(&self) -> (usize, usize) {
        let d = self.lock();
        (d.width, d.height)
    }

    /// Fill with transparent black.
    pub fn clear(&self) {
        let mut d = self.lock();
        d.pixels.fill(0);
    }

    /// Copy of the pixel buffer (presentation, tests).
    pub fn pixels(&self) -> Vec<u8> {
        self.lock().pixels.clone()
    }

    /// Blit a decoded frame, fit-contain centered, applying the clip's
    /// picture adjustment on the way in. Nearest-neighbor sampling; the
    /// sink already delivered frames near project resolution.
    pub fn draw_frame(&self, frame: &VideoFrame, adjust: Option<&PictureAdjust>) {
        if frame.width == 0 || frame.height == 0 {
            return;
        }
        let mut d = self.lock();
        let (cw, ch) = (d.width, d.height);
        if cw == 0 || ch == 0 {
            return;
        }

        let scale = (cw as f64 / frame.width as f64).min(ch as f64 / frame.height as f64);
        let dw = ((frame.width as f64 * scale) as usize).max(1).min(cw);
        let dh = ((frame.height as f64 * scale) as usize).max(1).min(ch);
        let x0 = (cw - dw) / 2;
        let y0 = (ch - dh) / 2;

        let adjust = adjust.filter(|a| !a.is_neutral());
        let src = &frame.data;
        let (fw, fh) = (frame.width, frame.height);

        d.pixels
            .par_chunks_mut(cw * 4)
            .enumerate()
            .for_each(|(y, row)| {
                if y < y0 || y >= y0 + dh {
                    row.fill(0);
                    return;
                }
                let sy = ((y - y0) * fh / dh).min(fh - 1);
                for x in 0..cw {
                    let out = &mut row[x * 4..x * 4 + 4];
                    if x < x0 || x >= x0 + dw {
                        out.fill(0);
                        continue;
                    }
                    let sx = ((x - x0) * fw / dw).min(fw - 1);
                    let idx = (sy * fw + sx) * 4;
                    out.copy_from_slice(&src[idx..idx + 4]);
                    if let Some(a) = adjust {
                        adjust_pixel(out, a);
                    }
                }
            });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CanvasData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for PixelCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.size();
        write!(f, "PixelCanvas({}x{})", w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_fills_matching_size() {
        let canvas = PixelCanvas::new(4, 4);
        let frame = VideoFrame::solid(0.0, 4, 4, [10, 20, 30, 255]);
        canvas.draw_frame(&frame, None);
        let px = canvas.pixels();
        assert_eq!(&px[..4], &[10, 20, 30, 255]);
        assert_eq!(&px[px.len() - 4..], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_draw_letterboxes_wide_frame() {
        // 8x2 frame into a 8x8 canvas: picture occupies the middle rows
        let canvas = PixelCanvas::new(8, 8);
        let frame = VideoFrame::solid(0.0, 8, 2, [255, 255, 255, 255]);
        canvas.draw_frame(&frame, None);
        let px = canvas.pixels();
        let row = |y: usize| &px[y * 8 * 4..(y + 1) * 8 * 4];
        assert!(row(0).iter().all(|&b| b == 0)); // letterbox
        assert!(row(4).iter().all(|&b| b == 255)); // picture
    }

    #[test]
    fn test_draw_applies_adjust() {
        let canvas = PixelCanvas::new(2, 2);
        let frame = VideoFrame::solid(0.0, 2, 2, [128, 128, 128, 255]);
        let adj = PictureAdjust {
            brightness: 0.5,
            ..Default::default()
        };
        canvas.draw_frame(&frame, Some(&adj));
        let px = canvas.pixels();
        assert!(px[0] > 200);
    }

    #[test]
    fn test_clones_share_pixels() {
        let canvas = PixelCanvas::new(2, 2);
        let alias = canvas.clone();
        canvas.draw_frame(&VideoFrame::solid(0.0, 2, 2, [9, 9, 9, 255]), None);
        assert_eq!(alias.pixels()[0], 9);
    }
}

//! Picture-adjustment pass applied while blitting into a clip canvas.
//!
//! Standard centered formulas:
//! brightness/contrast: `out = (in - 0.5) * (1 + contrast) + 0.5 + brightness`
//! saturation: mix between Rec.709 luma and the original color.
//!
//! Alpha is never touched. Values are clamped per channel; this path is
//! 8-bit only, HDR grading belongs to the export pipeline.

use crate::timeline::PictureAdjust;

/// Rec.709 luma weights.
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// Adjust one RGBA pixel in place.
#[inline]
pub fn adjust_pixel(px: &mut [u8], adjust: &PictureAdjust) {
    let cf = 1.0 + adjust.contrast;
    let sf = 1.0 + adjust.saturation;

    let mut r = px[0] as f32 / 255.0;
    let mut g = px[1] as f32 / 255.0;
    let mut b = px[2] as f32 / 255.0;

    r = (r - 0.5) * cf + 0.5 + adjust.brightness;
    g = (g - 0.5) * cf + 0.5 + adjust.brightness;
    b = (b - 0.5) * cf + 0.5 + adjust.brightness;

    if adjust.saturation.abs() >= 1e-4 {
        let luma = r * LUMA_R + g * LUMA_G + b * LUMA_B;
        r = luma + (r - luma) * sf;
        g = luma + (g - luma) * sf;
        b = luma + (b - luma) * sf;
    }

    px[0] = (r.clamp(0.0, 1.0) * 255.0) as u8;
    px[1] = (g.clamp(0.0, 1.0) * 255.0) as u8;
    px[2] = (b.clamp(0.0, 1.0) * 255.0) as u8;
    // px[3] (alpha) unchanged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_leaves_pixel_alone() {
        let mut px = [128u8, 64, 200, 255];
        adjust_pixel(&mut px, &PictureAdjust::default());
        // 128/255 -> 0.50196 survives the round trip at 8 bit
        assert_eq!(px, [128, 64, 200, 255]);
    }

    #[test]
    fn test_brightness_lifts_midgray() {
        let mut px = [128u8, 128, 128, 255];
        let adj = PictureAdjust {
            brightness: 0.5,
            ..Default::default()
        };
        adjust_pixel(&mut px, &adj);
        assert!(px[0] > 200);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_full_desaturation_is_gray() {
        let mut px = [255u8, 0, 0, 200];
        let adj = PictureAdjust {
            saturation: -1.0,
            ..Default::default()
        };
        adjust_pixel(&mut px, &adj);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 200);
    }

    #[test]
    fn test_contrast_clamps() {
        let mut px = [250u8, 5, 250, 255];
        let adj = PictureAdjust {
            contrast: 1.0,
            ..Default::default()
        };
        adjust_pixel(&mut px, &adj);
        assert_eq!(px[0], 255);
        assert_eq!(px[1], 0);
    }
}

//! Project-space ↔ surface-space transform math.
//!
//! Forward: a clip's top-left origin plus signed scale becomes a
//! center-anchored node placement, so rotation and flip pivot around the
//! clip's own center rather than its corner:
//!
//! ```text
//! center = top_left + (stage · scale) / 2
//! offset = |stage · scale| / 2
//! ```
//!
//! Inverse: when a manipulation ends, the surface reports a *combined*
//! displayed size that must be decomposed back into (unscaled stage size,
//! scale) before project-space numbers are written. Kind-specific: text
//! stores top-left directly, pictures store center-with-offset. No
//! intermediate rounding anywhere; only final project values are written.

use glam::DVec2;

use crate::surface::{ManipulationEnd, NodePlacement};
use crate::timeline::{Clip, ClipKind, Project};

/// Unscaled node size ("stage size") for a clip, in project pixels: the
/// asset's native size when probed, else the project resolution.
pub fn stage_size(clip: &Clip, project: &Project) -> DVec2 {
    let native = project
        .asset(&clip.asset_id)
        .and_then(|a| a.media)
        .filter(|m| m.width > 0 && m.height > 0)
        .map(|m| DVec2::new(m.width as f64, m.height as f64));
    native.unwrap_or_else(|| {
        DVec2::new(project.resolution.0 as f64, project.resolution.1 as f64)
    })
}

/// Project placement -> surface node placement.
pub fn to_surface(clip: &Clip, stage: DVec2) -> NodePlacement {
    let t = &clip.transform;
    match clip.kind {
        // Text nodes anchor at their stored top-left; no center offset.
        ClipKind::Text => NodePlacement {
            x: t.x,
            y: t.y,
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: t.scale_x,
            scale_y: t.scale_y,
            rotation: t.rotation,
            opacity: t.opacity,
        },
        _ => {
            // Signed displayed size; sign carries the flip.
            let disp = DVec2::new(stage.x * t.scale_x, stage.y * t.scale_y);
            let center = DVec2::new(t.x, t.y) + disp * 0.5;
            NodePlacement {
                x: center.x,
                y: center.y,
                offset_x: disp.x.abs() * 0.5,
                offset_y: disp.y.abs() * 0.5,
                scale_x: t.scale_x,
                scale_y: t.scale_y,
                rotation: t.rotation,
                opacity: t.opacity,
            }
        }
    }
}

/// Project-space result of an ended manipulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectPlacement {
    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation: f64,
}

/// Surface manipulation result -> project placement, by clip kind.
pub fn to_project(ev: &ManipulationEnd, kind: ClipKind) -> ProjectPlacement {
    match kind {
        // Text: position is already top-left, size is intrinsic.
        ClipKind::Text => ProjectPlacement {
            x: ev.x,
            y: ev.y,
            scale_x: ev.scale_x,
            scale_y: ev.scale_y,
            rotation: ev.rotation,
        },
        // Audio has no picture node; a manipulation event for it is a
        // host bug, but passing coordinates through is harmless.
        ClipKind::Audio => ProjectPlacement {
            x: ev.x,
            y: ev.y,
            scale_x: ev.scale_x,
            scale_y: ev.scale_y,
            rotation: ev.rotation,
        },
        ClipKind::Video | ClipKind::Image => {
            // The affordance reports displayed width/height with the scale
            // already baked in; recover the signed displayed size and walk
            // back from center to top-left.
            let disp = DVec2::new(
                ev.width * ev.scale_x.signum(),
                ev.height * ev.scale_y.signum(),
            );
            ProjectPlacement {
                x: ev.x - disp.x * 0.5,
                y: ev.y - disp.y * 0.5,
                scale_x: ev.scale_x,
                scale_y: ev.scale_y,
                rotation: ev.rotation,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Asset, ClipTransform, Track};

    fn picture_clip(transform: ClipTransform) -> (Project, Clip) {
        let mut p = Project::new(1920, 1080);
        let aid = p.add_asset(Asset::new(ClipKind::Video, "mem://v"));
        let tid = p.add_track(Track::new(0));
        let asset = p.asset(&aid).unwrap().clone();
        let mut clip = Clip::new(tid, &asset, 0.0, 5.0);
        clip.transform = transform;
        (p, clip)
    }

    fn event_from(placement: &NodePlacement, stage: DVec2) -> ManipulationEnd {
        ManipulationEnd {
            x: placement.x,
            y: placement.y,
            width: stage.x * placement.scale_x.abs(),
            height: stage.y * placement.scale_y.abs(),
            scale_x: placement.scale_x,
            scale_y: placement.scale_y,
            rotation: placement.rotation,
        }
    }

    #[test]
    fn test_center_anchor_forward() {
        let (p, clip) = picture_clip(ClipTransform {
            x: 100.0,
            y: 50.0,
            scale_x: 0.5,
            scale_y: 0.5,
            ..Default::default()
        });
        let stage = stage_size(&clip, &p); // 1920x1080 fallback
        let n = to_surface(&clip, stage);
        assert!((n.x - (100.0 + 1920.0 * 0.5 * 0.5)).abs() < 1e-9);
        assert!((n.y - (50.0 + 1080.0 * 0.5 * 0.5)).abs() < 1e-9);
        assert!((n.offset_x - 1920.0 * 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_plain() {
        round_trip(ClipTransform {
            x: 12.5,
            y: -3.25,
            scale_x: 0.75,
            scale_y: 1.25,
            rotation: 0.0,
            opacity: 1.0,
        });
    }

    #[test]
    fn test_round_trip_flip_and_rotation() {
        round_trip(ClipTransform {
            x: 200.0,
            y: 80.0,
            scale_x: -0.5,
            scale_y: 0.5,
            rotation: 0.7853981633974483, // 45 degrees
            opacity: 0.8,
        });
        round_trip(ClipTransform {
            x: -40.0,
            y: 500.0,
            scale_x: 1.5,
            scale_y: -2.0,
            rotation: -1.2,
            opacity: 1.0,
        });
    }

    fn round_trip(transform: ClipTransform) {
        let (p, clip) = picture_clip(transform);
        let stage = stage_size(&clip, &p);
        let placement = to_surface(&clip, stage);
        let ev = event_from(&placement, stage);
        let back = to_project(&ev, clip.kind);
        assert!((back.x - transform.x).abs() < 1e-6, "x: {} vs {}", back.x, transform.x);
        assert!((back.y - transform.y).abs() < 1e-6);
        assert!((back.scale_x - transform.scale_x).abs() < 1e-9);
        assert!((back.scale_y - transform.scale_y).abs() < 1e-9);
        assert!((back.rotation - transform.rotation).abs() < 1e-9);
    }

    #[test]
    fn test_text_keeps_top_left() {
        let mut p = Project::new(1280, 720);
        let aid = p.add_asset(Asset::new(ClipKind::Text, "text://title"));
        let tid = p.add_track(Track::new(0));
        let asset = p.asset(&aid).unwrap().clone();
        let mut clip = Clip::new(tid, &asset, 0.0, 2.0);
        clip.transform.x = 33.0;
        clip.transform.y = 44.0;
        let n = to_surface(&clip, stage_size(&clip, &p));
        assert_eq!(n.x, 33.0);
        assert_eq!(n.y, 44.0);
        assert_eq!(n.offset_x, 0.0);
    }

    #[test]
    fn test_stage_size_prefers_probed_media() {
        let mut p = Project::new(1920, 1080);
        let asset = Asset::new(ClipKind::Video, "mem://v").with_media(crate::timeline::MediaInfo {
            width: 640,
            height: 360,
            rotation: 0.0,
            sample_rate: None,
        });
        let aid = p.add_asset(asset);
        let tid = p.add_track(Track::new(0));
        let asset = p.asset(&aid).unwrap().clone();
        let clip = Clip::new(tid, &asset, 0.0, 1.0);
        assert_eq!(stage_size(&clip, &p), DVec2::new(640.0, 360.0));
    }
}

//! Rendering surface boundary.
//!
//! A retained-mode canvas abstraction the host view implements: picture
//! nodes keyed by clip id, batched redraw, and a single-selection
//! manipulation affordance. Nodes retain a cheap clone of the clip's shared
//! [`PixelCanvas`]; the engine draws into that canvas and the surface
//! composites it on `batch_redraw`.

use uuid::Uuid;

use crate::canvas::PixelCanvas;

/// Node flavor on the surface; text nodes are rendered by the host, picture
/// nodes present a clip canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Picture,
    Text,
}

/// Surface-space placement of one node, center-anchored: `(x, y)` is the
/// node center and `(offset_x, offset_y)` half the absolute displayed size,
/// so rotation and flip pivot around the clip's own center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodePlacement {
    pub x: f64,
    pub y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    /// Signed; the sign carries flips through to the surface.
    pub scale_x: f64,
    pub scale_y: f64,
    /// Radians, clockwise-positive.
    pub rotation: f64,
    pub opacity: f32,
}

/// End-of-manipulation report from the surface's affordance. `width` and
/// `height` are the *displayed* size as the manipulation surface measures
/// it; kind-specific inverse math decomposes them back into project-space
/// numbers.
#[derive(Clone, Copy, Debug)]
pub struct ManipulationEnd {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation: f64,
}

/// Retained-mode rendering surface the host implements.
pub trait RenderSurface {
    /// Add a node for `id`, retaining `canvas` for presentation.
    fn add_node(&mut self, id: Uuid, kind: NodeKind, canvas: PixelCanvas, placement: NodePlacement);

    /// Update placement in place. Never remove+re-add for a transform
    /// change; that would reset in-flight manipulation state.
    fn update_node(&mut self, id: Uuid, placement: NodePlacement);

    fn remove_node(&mut self, id: Uuid);

    /// Composite all nodes. Called once per engine tick that drew anything.
    fn batch_redraw(&mut self);

    /// Attach the single-selection manipulation affordance to a node.
    fn attach_manipulator(&mut self, id: Uuid);

    /// Detach the affordance (no selection, or playback running).
    fn detach_manipulator(&mut self);
}

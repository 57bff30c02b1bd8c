//! Selection bridge.
//!
//! Mirrors the host's clip selection onto the surface's manipulation
//! affordance, and converts finished manipulations back into project-space
//! transforms. The affordance only attaches to a clip that actually has a
//! node, and never while playback runs.

use log::{debug, warn};
use uuid::Uuid;

use crate::surface::{ManipulationEnd, RenderSurface};
use crate::timeline::{ClipTransform, EditStore, Project};

use super::nodes::NodeRegistry;
use super::placement;

#[derive(Default)]
pub struct SelectionBridge {
    attached: Option<Uuid>,
}

impl SelectionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the affordance with the current selection.
    pub fn sync(
        &mut self,
        selected: Option<Uuid>,
        playing: bool,
        nodes: &NodeRegistry,
        surface: &mut dyn RenderSurface,
    ) {
        let want = match selected {
            Some(id) if !playing && nodes.contains(&id) => Some(id),
            _ => None,
        };
        if want == self.attached {
            return;
        }
        if self.attached.is_some() {
            surface.detach_manipulator();
        }
        if let Some(id) = want {
            debug!("attaching manipulator to clip {}", id);
            surface.attach_manipulator(id);
        }
        self.attached = want;
    }

    /// A manipulation finished on the surface; write the result back to the
    /// project through the edit store.
    pub fn manipulation_ended(
        &mut self,
        clip_id: Uuid,
        ev: &ManipulationEnd,
        project: &Project,
        store: &mut dyn EditStore,
    ) {
        let Some(clip) = project.clip(&clip_id) else {
            warn!("manipulation ended for unknown clip {}", clip_id);
            return;
        };
        let p = placement::to_project(ev, clip.kind);
        let transform = ClipTransform {
            x: p.x,
            y: p.y,
            scale_x: p.scale_x,
            scale_y: p.scale_y,
            rotation: p.rotation,
            opacity: clip.transform.opacity,
        };
        store.commit_transform(clip_id, transform);
    }
}

//! Clip node registry.
//!
//! Owns the clip-id -> surface-node mapping and the per-clip pixel canvas.
//! `ensure` is idempotent: an existing node gets a placement update only
//! when the placement actually changed, never a remove+re-add (that would
//! reset in-flight manipulation state on the surface). Shared between the
//! static resolver and the playback scheduler so pause/play transitions
//! reuse nodes instead of flashing them.

use indexmap::IndexMap;
use log::debug;
use uuid::Uuid;

use crate::canvas::PixelCanvas;
use crate::surface::{NodeKind, NodePlacement, RenderSurface};
use crate::timeline::{Clip, ClipKind, Project};

use super::placement;

struct NodeState {
    canvas: PixelCanvas,
    placement: NodePlacement,
}

#[derive(Default)]
pub struct NodeRegistry {
    nodes: IndexMap<Uuid, NodeState>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a surface node exists for `clip` with its current
    /// placement. Returns the clip's canvas.
    pub fn ensure(
        &mut self,
        clip: &Clip,
        project: &Project,
        surface: &mut dyn RenderSurface,
    ) -> PixelCanvas {
        let stage = placement::stage_size(clip, project);
        let wanted = placement::to_surface(clip, stage);

        if let Some(state) = self.nodes.get_mut(&clip.id) {
            if state.placement != wanted {
                state.placement = wanted;
                surface.update_node(clip.id, wanted);
            }
            return state.canvas.clone();
        }

        let kind = match clip.kind {
            ClipKind::Text => NodeKind::Text,
            _ => NodeKind::Picture,
        };
        let canvas = PixelCanvas::new(project.resolution.0 as usize, project.resolution.1 as usize);
        debug!("adding surface node for clip {}", clip.id);
        surface.add_node(clip.id, kind, canvas.clone(), wanted);
        self.nodes.insert(
            clip.id,
            NodeState {
                canvas: canvas.clone(),
                placement: wanted,
            },
        );
        canvas
    }

    /// Remove the clip's node, if any.
    pub fn release(&mut self, clip_id: Uuid, surface: &mut dyn RenderSurface) {
        if self.nodes.shift_remove(&clip_id).is_some() {
            debug!("removing surface node for clip {}", clip_id);
            surface.remove_node(clip_id);
        }
    }

    pub fn release_all(&mut self, surface: &mut dyn RenderSurface) {
        for (clip_id, _) in self.nodes.drain(..) {
            surface.remove_node(clip_id);
        }
    }

    pub fn contains(&self, clip_id: &Uuid) -> bool {
        self.nodes.contains_key(clip_id)
    }

    pub fn canvas(&self, clip_id: &Uuid) -> Option<PixelCanvas> {
        self.nodes.get(clip_id).map(|s| s.canvas.clone())
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.nodes.keys().copied().collect()
    }
}

//! Timeline data model consumed by the playback core.
//!
//! Pure project data: no decoder handles, no surface nodes. Serializable
//! via serde; the host editor owns mutation and undo history. The sync core
//! reads tracks/clips/transforms every tick and writes back through the
//! [`EditStore`] trait only.
//!
//! **Tie-break**: when two tracks carry the same `order` value the source
//! material does not define a winner; we keep project insertion order
//! (stable sort), pending product clarification.

pub mod transform;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use transform::{ClipTransform, PictureAdjust};

/// What a clip (and its backing asset) contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipKind {
    Video,
    Image,
    Audio,
    Text,
}

impl ClipKind {
    /// Kinds that put a picture node on the rendering surface.
    pub fn has_picture(self) -> bool {
        !matches!(self, ClipKind::Audio)
    }

    /// Kinds that need a decode sink (text is rendered by the host).
    pub fn needs_sink(self) -> bool {
        !matches!(self, ClipKind::Text)
    }
}

/// Media metadata probed from the source, when known.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Container rotation in degrees (phone footage).
    pub rotation: f32,
    pub sample_rate: Option<u32>,
}

/// Source media in the project bin. Immutable once created; referenced by
/// any number of clips.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub kind: ClipKind,
    /// Opaque source locator handed to the decode library.
    pub locator: String,
    pub media: Option<MediaInfo>,
}

impl Asset {
    pub fn new(kind: ClipKind, locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            locator: locator.into(),
            media: None,
        }
    }

    pub fn with_media(mut self, media: MediaInfo) -> Self {
        self.media = Some(media);
        self
    }
}

/// One lane of the timeline. Higher `order` paints later (on top).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub order: i32,
    pub muted: bool,
    pub hidden: bool,
    /// Clip ids in edit order; the clips themselves live in `Project::clips`.
    pub clip_ids: Vec<Uuid>,
}

impl Track {
    pub fn new(order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            muted: false,
            hidden: false,
            clip_ids: Vec::new(),
        }
    }
}

/// An instance of an asset placed on a track, `[start, end)` in timeline
/// seconds. `in_point` offsets into the source; `out_point` is advisory
/// (the time range is authoritative).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Clip {
    pub id: Uuid,
    pub track_id: Uuid,
    pub asset_id: Uuid,
    pub kind: ClipKind,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub in_point: f64,
    #[serde(default)]
    pub out_point: Option<f64>,
    #[serde(default)]
    pub transform: ClipTransform,
    #[serde(default)]
    pub adjust: Option<PictureAdjust>,
    /// Per-clip gain multiplier on top of track/global volume.
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

impl Clip {
    pub fn new(track_id: Uuid, asset: &Asset, start: f64, end: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            track_id,
            asset_id: asset.id,
            kind: asset.kind,
            start,
            end,
            in_point: 0.0,
            out_point: None,
            transform: ClipTransform::default(),
            adjust: None,
            volume: 1.0,
        }
    }

    /// Half-open containment: `start <= t < end`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Source time for timeline time `t`. Clamped at the clip end so a
    /// query right at the exclusive bound never reads past the source range.
    pub fn source_time(&self, t: f64) -> f64 {
        self.in_point + t.min(self.end) - self.start
    }
}

/// The open project: logical resolution plus assets, clips and tracks.
///
/// `revision` bumps on every structural mutation; the sink registry uses it
/// to decide when a failed source open may be retried.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    /// Logical composition resolution; clip canvases are allocated at this
    /// size, not the on-screen scaled size.
    pub resolution: (u32, u32),
    pub assets: IndexMap<Uuid, Asset>,
    pub clips: IndexMap<Uuid, Clip>,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub revision: u64,
}

impl Project {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: (width, height),
            assets: IndexMap::new(),
            clips: IndexMap::new(),
            tracks: Vec::new(),
            revision: 0,
        }
    }

    pub fn add_asset(&mut self, asset: Asset) -> Uuid {
        let id = asset.id;
        self.assets.insert(id, asset);
        self.revision += 1;
        id
    }

    pub fn add_track(&mut self, track: Track) -> Uuid {
        let id = track.id;
        self.tracks.push(track);
        self.revision += 1;
        id
    }

    /// Place a clip; its `track_id` must name an existing track.
    pub fn add_clip(&mut self, clip: Clip) -> Uuid {
        let id = clip.id;
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == clip.track_id) {
            track.clip_ids.push(id);
        } else {
            log::warn!("add_clip: track {} not found", clip.track_id);
        }
        self.clips.insert(id, clip);
        self.revision += 1;
        id
    }

    pub fn remove_clip(&mut self, clip_id: Uuid) -> Option<Clip> {
        let clip = self.clips.shift_remove(&clip_id)?;
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == clip.track_id) {
            track.clip_ids.retain(|id| *id != clip_id);
        }
        self.revision += 1;
        Some(clip)
    }

    /// Move/resize a clip's time range.
    pub fn set_clip_range(&mut self, clip_id: Uuid, start: f64, end: f64) {
        if let Some(clip) = self.clips.get_mut(&clip_id) {
            clip.start = start;
            clip.end = end;
            self.revision += 1;
        }
    }

    pub fn set_transform(&mut self, clip_id: Uuid, transform: ClipTransform) {
        if let Some(clip) = self.clips.get_mut(&clip_id) {
            clip.transform = transform;
        }
    }

    pub fn clip(&self, id: &Uuid) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn asset(&self, id: &Uuid) -> Option<&Asset> {
        self.assets.get(id)
    }

    pub fn track(&self, id: &Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == *id)
    }

    /// Clips under the playhead at `t`, bottom-to-top paint order: ascending
    /// track `order`, insertion order on ties, edit order within a track.
    /// Hidden tracks are excluded entirely.
    pub fn clips_at(&self, t: f64) -> Vec<&Clip> {
        let mut tracks: Vec<&Track> = self.tracks.iter().filter(|tr| !tr.hidden).collect();
        tracks.sort_by_key(|tr| tr.order); // stable: ties keep insertion order
        let mut out = Vec::new();
        for track in tracks {
            for clip_id in &track.clip_ids {
                if let Some(clip) = self.clips.get(clip_id)
                    && clip.contains(t)
                {
                    out.push(clip);
                }
            }
        }
        out
    }

    /// Total timeline length: the farthest clip end.
    pub fn duration(&self) -> f64 {
        self.clips.values().map(|c| c.end).fold(0.0_f64, f64::max)
    }

    /// True while any clip still references the asset.
    pub fn references_asset(&self, asset_id: &Uuid) -> bool {
        self.clips.values().any(|c| c.asset_id == *asset_id)
    }

    /// Whether audio from this clip should be audible right now.
    pub fn is_audible(&self, clip: &Clip) -> bool {
        self.track(&clip.track_id).is_some_and(|t| !t.muted) && clip.volume > 0.0
    }
}

/// Write boundary into the host's edit state. The implementation is
/// responsible for undo-history recording; this engine never manages
/// history itself.
pub trait EditStore {
    /// Commit a finished manipulation back into the clip's transform record.
    fn commit_transform(&mut self, clip_id: Uuid, transform: ClipTransform);

    /// Persist the playhead position (written once when playback stops, not
    /// every tick).
    fn set_playhead(&mut self, t: f64);
}

//! montage: playback synchronization engine for a multi-track video editor.
//!
//! Keeps three worlds consistent as the user scrubs, plays and edits:
//!
//! - the **timeline** data model ([`timeline`]): tracks, clips, transforms
//! - the **decode** layer ([`decode`]): per-asset sinks and frame streams
//! - the **surface** ([`surface`]): retained picture nodes the host draws
//!
//! The [`engine::Engine`] facade owns all runtime state. Paused views go
//! through the static frame resolver; playback through the clock-driven
//! scheduler; both share one sink registry and one node registry so the
//! pause/play transition never flashes or re-opens anything.

pub mod canvas;
pub mod decode;
pub mod engine;
pub mod events;
pub mod filter;
pub mod frame;
pub mod surface;
pub mod timeline;

pub use canvas::PixelCanvas;
pub use engine::Engine;
pub use engine::clock::{AudioClock, AudioOutput, NullAudioOutput};
pub use engine::context::SharedTime;
pub use events::EngineEvent;
pub use frame::{AudioBuffer, VideoFrame};
pub use surface::{ManipulationEnd, NodeKind, NodePlacement, RenderSurface};
pub use timeline::{Asset, Clip, ClipKind, ClipTransform, EditStore, Project, Track};

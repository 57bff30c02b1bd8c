//! Decode library boundary.
//!
//! The engine consumes decoders through these traits and never owns codec
//! internals. Per source: a handle, an optional picture sink, an optional
//! audio sink. A picture sink answers single-shot `frame_at` queries (scrub)
//! and opens lazy, seek-positioned [`FrameStream`]s (playback).
//!
//! **Streams are resources, not values.** The underlying decoder may hold
//! real state (codec contexts, buffer pools) that only releases on explicit
//! `close()`. Every replacement path (seek, clip eviction, project
//! teardown) must close the old stream before dropping it.

use std::fmt;

use crate::frame::{AudioBuffer, VideoFrame};

/// How the picture sink fits source pixels into the requested output size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fit {
    /// Letterbox: whole picture visible, possibly padded.
    Contain,
    /// Fill and crop.
    Cover,
    /// Stretch to exactly the requested size.
    Fill,
}

/// Output negotiation for a picture sink. Sized to the project's logical
/// resolution so clip canvases never resample twice.
#[derive(Clone, Copy, Debug)]
pub struct SinkOptions {
    pub width: u32,
    pub height: u32,
    pub fit: Fit,
}

/// Typed decode failure for implementations that want one; the registry
/// itself treats any `anyhow::Error` as an isolated per-asset failure.
#[derive(Debug)]
pub enum DecodeError {
    Open(String),
    NoTrack(String),
    Decode(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Open(e) => write!(f, "open error: {}", e),
            DecodeError::NoTrack(e) => write!(f, "no usable track: {}", e),
            DecodeError::Decode(e) => write!(f, "decode error: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Factory for source handles. Shared with decode workers, so `Send + Sync`.
pub trait SourceOpener: Send + Sync {
    /// Open a source and negotiate container-level state. May be slow; the
    /// engine always calls this off the tick thread.
    fn open(&self, locator: &str) -> anyhow::Result<Box<dyn SourceHandle>>;
}

/// An open media source. Dropping the handle releases container resources.
pub trait SourceHandle: Send {
    /// Build a sink over the primary picture track, converting to RGBA8 at
    /// the requested size.
    fn picture_sink(&mut self, options: SinkOptions) -> anyhow::Result<Box<dyn PictureSink>>;

    /// Sink over the primary audio track, or `None` when the source has no
    /// audio.
    fn audio_sink(&mut self) -> Option<Box<dyn AudioSink>>;
}

/// Queryable/iterable picture frames for one source.
pub trait PictureSink: Send {
    /// Single-shot: the frame visible at `time` (source seconds), or `None`
    /// past the end of the track.
    fn frame_at(&mut self, time: f64) -> anyhow::Result<Option<VideoFrame>>;

    /// Lazy, seek-positioned sequence starting at `from`. Opening is cheap;
    /// decoding happens per `next()` pull.
    fn frames(&mut self, from: f64) -> Box<dyn FrameStream>;
}

/// Lazy decoded-picture sequence. `next()` may block on the decoder, so the
/// engine only pulls it from worker threads.
pub trait FrameStream: Send {
    /// Next frame in presentation order, or `None` when the track is
    /// exhausted (source shorter than the clip is fine; the last drawn
    /// frame simply stays on screen).
    fn next(&mut self) -> Option<VideoFrame>;

    /// Release decoder resources. Mandatory before dropping a stream that
    /// is being replaced; further `next()` calls return `None`.
    fn close(&mut self);
}

/// Iterable audio buffers for one source.
pub trait AudioSink: Send {
    fn buffers_at(&mut self, from: f64) -> Box<dyn AudioStream>;
}

/// Lazy decoded-audio sequence, same resource discipline as [`FrameStream`].
pub trait AudioStream: Send {
    fn next(&mut self) -> Option<AudioBuffer>;
    fn close(&mut self);
}

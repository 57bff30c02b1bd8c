//! Shared runtime state for the sync core.
//!
//! Everything the resolver, scheduler and completion handlers touch lives in
//! one [`RuntimeContext`] owned by the engine, so every code path sees the
//! same registries, the same request token and the same stream table.
//!
//! Two staleness guards:
//! - `token` stamps scrub-time frame requests; a completion carrying an old
//!   token is discarded.
//! - each [`ClipStream`] carries a `serial`; prime/pull completions for a
//!   replaced stream miss the serial check and are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use log::{debug, trace};
use uuid::Uuid;

use crate::decode::AudioStream;
use crate::frame::{AudioBuffer, VideoFrame};

use super::nodes::NodeRegistry;
use super::sinks::SinkRegistry;
use super::workers::SharedStream;

/// Published playback position, readable from any thread (UI playhead).
#[derive(Clone)]
pub struct SharedTime(Arc<AtomicU64>);

impl SharedTime {
    pub fn new(t: f64) -> Self {
        Self(Arc::new(AtomicU64::new(t.to_bits())))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, t: f64) {
        self.0.store(t.to_bits(), Ordering::Release);
    }
}

/// One live frame stream for a clip, with its one-frame lookahead state.
pub struct ClipStream {
    pub stream: SharedStream,
    /// Matches completions to this exact stream instance.
    pub serial: u64,
    /// Source time the stream was opened at; lets a play press reuse a
    /// stream primed by the previous seek.
    pub opened_at: f64,
    /// First frame, decoded ahead so play starts without a decode stall.
    pub ready: Option<VideoFrame>,
    /// Lookahead frame waiting for the clock to reach its pts.
    pub prefetch: Option<VideoFrame>,
    /// A pull job is in flight; don't submit another.
    pub pull_pending: bool,
    /// The stream returned `None`; the last drawn frame stays on screen.
    pub exhausted: bool,
    /// Source pts of the last frame drawn from this stream.
    pub last_drawn: f64,
}

impl ClipStream {
    pub fn new(stream: SharedStream, serial: u64, opened_at: f64) -> Self {
        Self {
            stream,
            serial,
            opened_at,
            ready: None,
            prefetch: None,
            pull_pending: false,
            exhausted: false,
            last_drawn: f64::NEG_INFINITY,
        }
    }

    /// Release the decoder behind the stream. Mandatory before dropping.
    pub fn close(&self) {
        self.stream
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .close();
    }
}

/// One live audio stream for a clip during playback.
pub struct AudioFeed {
    pub stream: Box<dyn AudioStream>,
    /// Buffer pulled but not yet due for submission.
    pub pending: Option<AudioBuffer>,
    pub done: bool,
}

impl AudioFeed {
    pub fn new(stream: Box<dyn AudioStream>) -> Self {
        Self {
            stream,
            pending: None,
            done: false,
        }
    }
}

pub struct RuntimeContext {
    /// Current scrub request token; bumped by every resolve.
    pub token: u64,
    /// Timeline time of the most recent resolve, used to re-resolve when a
    /// sink batch completes while paused.
    pub pending_time: f64,
    pub sinks: SinkRegistry,
    pub nodes: NodeRegistry,
    pub streams: IndexMap<Uuid, ClipStream>,
    pub audio_feeds: IndexMap<Uuid, AudioFeed>,
    next_serial: u64,
    pub time: SharedTime,
}

impl RuntimeContext {
    pub fn new(sinks: SinkRegistry) -> Self {
        Self {
            token: 0,
            pending_time: 0.0,
            sinks,
            nodes: NodeRegistry::new(),
            streams: IndexMap::new(),
            audio_feeds: IndexMap::new(),
            next_serial: 0,
            time: SharedTime::new(0.0),
        }
    }

    /// Start a new resolve at `t`: invalidates all outstanding scrub
    /// requests and publishes the position.
    pub fn stamp_token(&mut self, t: f64) -> u64 {
        self.token += 1;
        self.pending_time = t;
        self.time.set(t);
        trace!("resolve token {} at {:.3}", self.token, t);
        self.token
    }

    pub fn alloc_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    pub fn close_stream(&mut self, clip_id: &Uuid) {
        if let Some(stream) = self.streams.shift_remove(clip_id) {
            trace!("closing stream for clip {}", clip_id);
            stream.close();
        }
    }

    pub fn close_all_streams(&mut self) {
        for (clip_id, stream) in self.streams.drain(..) {
            trace!("closing stream for clip {}", clip_id);
            stream.close();
        }
    }

    pub fn close_all_audio(&mut self) {
        for (_, mut feed) in self.audio_feeds.drain(..) {
            feed.stream.close();
        }
    }

    /// Full teardown: one explicit walk over every held resource.
    pub fn teardown(&mut self, surface: &mut dyn crate::surface::RenderSurface) {
        debug!(
            "teardown: {} streams, {} audio feeds, {} nodes",
            self.streams.len(),
            self.audio_feeds.len(),
            self.nodes.ids().len()
        );
        self.close_all_streams();
        self.close_all_audio();
        self.nodes.release_all(surface);
        self.sinks.teardown();
    }
}

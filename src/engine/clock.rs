//! Playback clocks.
//!
//! Dual source chosen at runtime: the hardware audio clock is drift-free
//! and authoritative once the output has actually started; until then (or
//! when the project has no audio at all) a wall clock carries playback.
//! The scheduler depends only on the [`PlaybackClock`] trait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use uuid::Uuid;

use crate::frame::AudioBuffer;

/// Monotonic time source for the playback loop, in seconds.
pub trait PlaybackClock {
    fn now(&self) -> f64;

    /// False while the source cannot be trusted yet (audio output not
    /// started). A non-ready clock is never fatal; the scheduler falls back.
    fn ready(&self) -> bool;
}

/// Wall-clock fallback, anchored at construction.
#[derive(Debug)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl PlaybackClock for WallClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn ready(&self) -> bool {
        true
    }
}

struct AudioClockState {
    /// Total frames the output has consumed since start.
    frames: AtomicU64,
    sample_rate: AtomicU32,
    started: AtomicBool,
}

/// Hardware audio clock: seconds of audio actually played out. Cheap-clone
/// handle; the audio output advances it from its own callback thread.
#[derive(Clone)]
pub struct AudioClock {
    state: Arc<AudioClockState>,
}

impl AudioClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AudioClockState {
                frames: AtomicU64::new(0),
                sample_rate: AtomicU32::new(0),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Called by the audio output each time it consumes `frames` sample
    /// frames at `sample_rate`. First call marks the clock ready.
    pub fn advance(&self, frames: u64, sample_rate: u32) {
        self.state.sample_rate.store(sample_rate, Ordering::Relaxed);
        self.state.frames.fetch_add(frames, Ordering::Relaxed);
        self.state.started.store(true, Ordering::Release);
    }

    /// Reset for a fresh playback run.
    pub fn reset(&self) {
        self.state.started.store(false, Ordering::Release);
        self.state.frames.store(0, Ordering::Relaxed);
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for AudioClock {
    fn now(&self) -> f64 {
        let rate = self.state.sample_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return 0.0;
        }
        self.state.frames.load(Ordering::Relaxed) as f64 / rate as f64
    }

    fn ready(&self) -> bool {
        self.state.started.load(Ordering::Acquire)
    }
}

/// Speaker-side boundary. The implementation owns the device stream and the
/// hardware clock; the scheduler only submits buffers and reads the clock.
pub trait AudioOutput {
    fn clock(&self) -> AudioClock;

    /// Queue one decoded buffer for a clip; `gain` is the combined
    /// clip/track volume.
    fn submit(&mut self, clip_id: Uuid, buffer: AudioBuffer, gain: f32);
}

/// Output for video-only hosts: drops buffers, clock never becomes ready,
/// so playback runs on the wall clock.
pub struct NullAudioOutput {
    clock: AudioClock,
}

impl NullAudioOutput {
    pub fn new() -> Self {
        Self {
            clock: AudioClock::new(),
        }
    }
}

impl Default for NullAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for NullAudioOutput {
    fn clock(&self) -> AudioClock {
        self.clock.clone()
    }

    fn submit(&mut self, _clip_id: Uuid, _buffer: AudioBuffer, _gain: f32) {}
}

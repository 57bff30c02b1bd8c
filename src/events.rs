//! Engine-to-host notifications, delivered over a crossbeam channel and
//! drained by the host at its own pace.

/// Events the host can react to without polling engine internals.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A batch of decode-sink creations finished; a paused/seeked view can
    /// resolve frames for newly-available assets now.
    SinksReady,
    /// Playback reached the timeline end and the scheduler stopped.
    PlaybackStopped { at: f64 },
}

//! Playback scheduler.
//!
//! Clock-driven frame presentation: each tick reads the playback clock,
//! draws any lookahead frame whose pts has come due, refills the one-frame
//! lookahead, admits and evicts clips as the playhead crosses their
//! boundaries, and pumps decoded audio to the output slightly ahead of the
//! clock.
//!
//! **Clock choice.** Playback starts on the wall clock. Once the audio
//! output reports real progress its hardware clock is adopted as the
//! authority; adoption rebases onto the wall-derived position at that
//! instant so the switch never jumps the playhead. A project with no audio
//! simply keeps the wall clock for the whole run.

use log::{debug, info, trace};
use uuid::Uuid;

use crate::frame::VideoFrame;
use crate::surface::RenderSurface;
use crate::timeline::{Clip, EditStore, Project};

use super::clock::{AudioClock, AudioOutput, PlaybackClock, WallClock};
use super::context::{AudioFeed, ClipStream, RuntimeContext};
use super::workers::{DecodeJob, DecodePool};

/// How far ahead of the clock audio buffers are handed to the output.
const AUDIO_LEAD: f64 = 0.25;

/// Tolerance when deciding whether a primed stream matches the requested
/// start position.
const STREAM_REUSE_EPS: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Running,
}

pub struct Scheduler {
    state: PlayState,
    /// Timeline time playback started at.
    start_offset: f64,
    wall: Option<WallClock>,
    audio_clock: Option<AudioClock>,
    /// `(audio seconds, timeline seconds)` captured at adoption.
    audio_anchor: Option<(f64, f64)>,
    /// The final playhead write happens exactly once per run.
    playhead_written: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: PlayState::Stopped,
            start_offset: 0.0,
            wall: None,
            audio_clock: None,
            audio_anchor: None,
            playhead_written: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == PlayState::Running
    }

    /// Begin playback at timeline time `t0`, reusing streams the resolver
    /// primed at this position.
    pub fn start(
        &mut self,
        ctx: &mut RuntimeContext,
        project: &Project,
        surface: &mut dyn RenderSurface,
        pool: &DecodePool,
        t0: f64,
        audio_clock: AudioClock,
    ) {
        info!("playback start at {:.3}", t0);
        audio_clock.reset();
        self.state = PlayState::Running;
        self.start_offset = t0;
        self.wall = Some(WallClock::start());
        self.audio_clock = Some(audio_clock);
        self.audio_anchor = None;
        self.playhead_written = false;

        ctx.sinks.sync(project, pool);

        let active: Vec<Clip> = project
            .clips_at(t0)
            .into_iter()
            .filter(|c| c.kind.has_picture())
            .cloned()
            .collect();

        let mut drew = false;
        for clip in &active {
            ctx.nodes.ensure(clip, project, surface);
            if !clip.kind.needs_sink() {
                continue;
            }
            let st = clip.source_time(t0);
            let reusable = ctx
                .streams
                .get(&clip.id)
                .is_some_and(|s| (s.opened_at - st).abs() < STREAM_REUSE_EPS);
            if !reusable {
                ctx.close_stream(&clip.id);
                self.open_stream(ctx, clip, pool, st);
            }
            let Some(stream) = ctx.streams.get_mut(&clip.id) else {
                continue; // sink not open yet; admitted once it is
            };
            // The primed first frame goes up immediately.
            if let Some(frame) = stream.ready.take()
                && let Some(canvas) = ctx.nodes.canvas(&clip.id)
            {
                canvas.draw_frame(&frame, clip.adjust.as_ref());
                stream.last_drawn = frame.pts;
                drew = true;
            }
            if stream.prefetch.is_none() && !stream.pull_pending && !stream.exhausted {
                stream.pull_pending = true;
                pool.submit(DecodeJob::PullNext {
                    serial: stream.serial,
                    clip_id: clip.id,
                    min_pts: st,
                    stream: stream.stream.clone(),
                });
            }
        }

        // Audio feeds for everything audible at the start position.
        for clip in project.clips_at(t0) {
            self.open_audio_feed(ctx, clip, project, t0);
        }

        if drew {
            surface.batch_redraw();
        }
    }

    /// Stop without reaching the end (pause). Streams and nodes stay; the
    /// caller re-resolves the still view at the published position.
    pub fn stop(&mut self, ctx: &mut RuntimeContext) {
        self.state = PlayState::Stopped;
        self.wall = None;
        self.audio_clock = None;
        self.audio_anchor = None;
        ctx.close_all_audio();
    }

    /// One playback step. Returns false once playback has ended naturally;
    /// the published time is then the clamped timeline duration.
    pub fn tick(
        &mut self,
        ctx: &mut RuntimeContext,
        project: &Project,
        surface: &mut dyn RenderSurface,
        pool: &DecodePool,
        store: &mut dyn EditStore,
        audio: &mut dyn AudioOutput,
    ) -> bool {
        if self.state != PlayState::Running {
            return false;
        }

        let pt = self.playback_time();
        let duration = project.duration();
        if pt >= duration {
            ctx.time.set(duration);
            if !self.playhead_written {
                self.playhead_written = true;
                store.set_playhead(duration);
            }
            info!("playback reached timeline end at {:.3}", duration);
            // Streams go, nodes stay: the end-of-timeline still remains
            // visible until the next seek.
            ctx.close_all_streams();
            self.stop(ctx);
            return false;
        }
        ctx.time.set(pt);

        let active: Vec<Clip> = project
            .clips_at(pt)
            .into_iter()
            .filter(|c| c.kind.has_picture())
            .cloned()
            .collect();

        // Evict clips the playhead has left.
        for clip_id in ctx.nodes.ids() {
            if !active.iter().any(|c| c.id == clip_id) {
                debug!("evicting clip {} at {:.3}", clip_id, pt);
                ctx.close_stream(&clip_id);
                ctx.nodes.release(clip_id, surface);
            }
        }

        let mut drew = false;
        for clip in &active {
            ctx.nodes.ensure(clip, project, surface);
            if !clip.kind.needs_sink() {
                continue;
            }
            let st = clip.source_time(pt);
            if !ctx.streams.contains_key(&clip.id) {
                // Admitted mid-playback.
                self.open_stream(ctx, clip, pool, st);
            }
            let Some(stream) = ctx.streams.get_mut(&clip.id) else {
                continue;
            };
            // A primed first frame that landed after start() ran is drawn
            // here once its pts comes due.
            if let Some(frame) = stream.ready.take_if(|f| f.pts <= st) {
                if frame.pts >= stream.last_drawn
                    && let Some(canvas) = ctx.nodes.canvas(&clip.id)
                {
                    canvas.draw_frame(&frame, clip.adjust.as_ref());
                    stream.last_drawn = frame.pts;
                    drew = true;
                }
            }
            if let Some(frame) = stream.prefetch.take_if(|f| f.pts <= st) {
                // Never paint backwards over a newer frame.
                if frame.pts >= stream.last_drawn {
                    if let Some(canvas) = ctx.nodes.canvas(&clip.id) {
                        canvas.draw_frame(&frame, clip.adjust.as_ref());
                        stream.last_drawn = frame.pts;
                        drew = true;
                    }
                } else {
                    trace!("clip {}: skipping out-of-order frame {:.3}", clip.id, frame.pts);
                }
            }
            if stream.prefetch.is_none() && !stream.pull_pending && !stream.exhausted {
                stream.pull_pending = true;
                pool.submit(DecodeJob::PullNext {
                    serial: stream.serial,
                    clip_id: clip.id,
                    min_pts: st,
                    stream: stream.stream.clone(),
                });
            }
        }

        self.pump_audio(ctx, project, audio, pt);

        if drew {
            surface.batch_redraw();
        }
        true
    }

    /// Completed lookahead pull.
    pub fn on_pulled(
        &mut self,
        ctx: &mut RuntimeContext,
        serial: u64,
        clip_id: Uuid,
        frame: Option<VideoFrame>,
    ) {
        let Some(stream) = ctx.streams.get_mut(&clip_id) else {
            return;
        };
        if stream.serial != serial {
            trace!("discarding pulled frame for replaced stream of clip {}", clip_id);
            return;
        }
        stream.pull_pending = false;
        match frame {
            Some(frame) => stream.prefetch = Some(frame),
            None => stream.exhausted = true,
        }
    }

    fn playback_time(&mut self) -> f64 {
        let wall_pt = self.start_offset
            + self.wall.as_ref().map(|w| w.now()).unwrap_or(0.0);
        let Some(audio) = &self.audio_clock else {
            return wall_pt;
        };
        if !audio.ready() {
            return wall_pt;
        }
        match self.audio_anchor {
            Some((audio_at_anchor, timeline_at_anchor)) => {
                timeline_at_anchor + (audio.now() - audio_at_anchor)
            }
            None => {
                // Adopt the hardware clock, rebased so the position is
                // continuous across the switch.
                debug!("adopting audio clock at {:.3}", wall_pt);
                self.audio_anchor = Some((audio.now(), wall_pt));
                wall_pt
            }
        }
    }

    fn open_stream(&self, ctx: &mut RuntimeContext, clip: &Clip, pool: &DecodePool, st: f64) {
        let Some(sink) = ctx.sinks.picture(&clip.asset_id) else {
            return;
        };
        let stream = {
            let mut guard = sink.lock().unwrap_or_else(|e| e.into_inner());
            std::sync::Arc::new(std::sync::Mutex::new(guard.frames(st)))
        };
        let serial = ctx.alloc_serial();
        let mut clip_stream = ClipStream::new(stream.clone(), serial, st);
        clip_stream.pull_pending = true;
        ctx.streams.insert(clip.id, clip_stream);
        pool.submit(DecodeJob::PullNext {
            serial,
            clip_id: clip.id,
            min_pts: st,
            stream,
        });
    }

    fn open_audio_feed(&self, ctx: &mut RuntimeContext, clip: &Clip, project: &Project, t: f64) {
        if ctx.audio_feeds.contains_key(&clip.id) || !project.is_audible(clip) {
            return;
        }
        let Some(sink) = ctx.sinks.audio(&clip.asset_id) else {
            return;
        };
        let st = clip.source_time(t);
        debug!("opening audio feed for clip {} at {:.3}", clip.id, st);
        let stream = sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buffers_at(st);
        ctx.audio_feeds.insert(clip.id, AudioFeed::new(stream));
    }

    /// Hand decoded audio to the output up to `AUDIO_LEAD` ahead of the
    /// clock; close feeds for clips the playhead has left.
    fn pump_audio(
        &mut self,
        ctx: &mut RuntimeContext,
        project: &Project,
        audio: &mut dyn AudioOutput,
        pt: f64,
    ) {
        let audible: Vec<Clip> = project
            .clips_at(pt)
            .into_iter()
            .filter(|c| project.is_audible(c))
            .cloned()
            .collect();

        let stale: Vec<Uuid> = ctx
            .audio_feeds
            .keys()
            .filter(|id| !audible.iter().any(|c| c.id == **id))
            .copied()
            .collect();
        for clip_id in stale {
            if let Some(mut feed) = ctx.audio_feeds.shift_remove(&clip_id) {
                feed.stream.close();
            }
        }

        for clip in &audible {
            self.open_audio_feed(ctx, clip, project, pt);
            let Some(feed) = ctx.audio_feeds.get_mut(&clip.id) else {
                continue;
            };
            let horizon = clip.source_time(pt) + AUDIO_LEAD;
            while !feed.done {
                let buffer = match feed.pending.take() {
                    Some(b) => b,
                    None => match feed.stream.next() {
                        Some(b) => b,
                        None => {
                            feed.done = true;
                            break;
                        }
                    },
                };
                if buffer.pts <= horizon {
                    audio.submit(clip.id, buffer, clip.volume);
                } else {
                    feed.pending = Some(buffer);
                    break;
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

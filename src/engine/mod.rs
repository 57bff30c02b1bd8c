//! Playback synchronization core.
//!
//! **Architecture**: one [`Engine`] facade over a shared [`RuntimeContext`]
//! (sink registry, node registry, stream table, request token), a decode
//! worker pool, the static frame [`resolver`] for the paused/scrubbing view
//! and the clock-driven [`scheduler`] for playback. The host calls `seek`,
//! `play`, `pause` and drives `tick` from its frame loop; everything
//! decoder-shaped happens on the pool and is reconciled in `tick`.

pub mod clock;
pub mod context;
pub mod nodes;
pub mod placement;
pub mod resolver;
pub mod scheduler;
pub mod selection;
pub mod sinks;
pub mod workers;

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::info;
use uuid::Uuid;

use crate::decode::SourceOpener;
use crate::events::EngineEvent;
use crate::surface::{ManipulationEnd, RenderSurface};
use crate::timeline::{Clip, EditStore, Project};

use self::clock::{AudioOutput, NullAudioOutput};
use self::context::{RuntimeContext, SharedTime};
use self::scheduler::Scheduler;
use self::selection::SelectionBridge;
use self::sinks::SinkRegistry;
use self::workers::{DecodeDone, DecodePool};

pub struct Engine {
    ctx: RuntimeContext,
    pool: DecodePool,
    scheduler: Scheduler,
    selection: SelectionBridge,
    selected: Option<Uuid>,
    audio: Box<dyn AudioOutput>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl Engine {
    /// `threads == 0` runs decode jobs inline (deterministic, for tests).
    pub fn new(opener: Arc<dyn SourceOpener>, threads: usize) -> Self {
        let (events_tx, events_rx) = unbounded();
        let sinks = SinkRegistry::new(opener, events_tx.clone());
        Self {
            ctx: RuntimeContext::new(sinks),
            pool: DecodePool::new(threads),
            scheduler: Scheduler::new(),
            selection: SelectionBridge::new(),
            selected: None,
            audio: Box::new(NullAudioOutput::new()),
            events_tx,
            events_rx,
        }
    }

    /// Replace the null audio output with a real device.
    pub fn with_audio(mut self, audio: Box<dyn AudioOutput>) -> Self {
        self.audio = audio;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Published playback position, readable from any thread.
    pub fn shared_time(&self) -> SharedTime {
        self.ctx.time.clone()
    }

    /// Host-facing event stream.
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events_rx
    }

    /// Move the still view to timeline time `t`. Interrupts playback.
    pub fn seek(&mut self, project: &Project, surface: &mut dyn RenderSurface, t: f64) {
        if self.scheduler.is_running() {
            self.scheduler.stop(&mut self.ctx);
        }
        resolver::resolve(&mut self.ctx, project, surface, &self.pool, t);
        self.selection
            .sync(self.selected, false, &self.ctx.nodes, surface);
    }

    /// Start playback from the current position.
    pub fn play(&mut self, project: &Project, surface: &mut dyn RenderSurface) {
        if self.scheduler.is_running() {
            return;
        }
        let t0 = self.ctx.time.get();
        // The affordance never stays up during playback.
        self.selection.sync(None, true, &self.ctx.nodes, surface);
        self.scheduler.start(
            &mut self.ctx,
            project,
            surface,
            &self.pool,
            t0,
            self.audio.clock(),
        );
    }

    /// Pause and re-resolve the still view at the position reached.
    pub fn pause(&mut self, project: &Project, surface: &mut dyn RenderSurface) {
        if !self.scheduler.is_running() {
            return;
        }
        self.scheduler.stop(&mut self.ctx);
        let t = self.ctx.time.get();
        info!("playback paused at {:.3}", t);
        resolver::resolve(&mut self.ctx, project, surface, &self.pool, t);
        self.selection
            .sync(self.selected, false, &self.ctx.nodes, surface);
    }

    /// One engine step: reconcile finished decode work, then advance
    /// playback if it is running. Call from the host's frame loop.
    pub fn tick(
        &mut self,
        project: &Project,
        surface: &mut dyn RenderSurface,
        store: &mut dyn EditStore,
    ) {
        for done in self.pool.drain() {
            match done {
                DecodeDone::Opened { asset_id, entry } => {
                    let batch_done = self.ctx.sinks.on_opened(asset_id, entry, project);
                    // A paused view gets its frames as soon as the sinks
                    // land; playback admits clips on its own ticks.
                    if batch_done && !self.scheduler.is_running() {
                        let t = self.ctx.pending_time;
                        resolver::resolve(&mut self.ctx, project, surface, &self.pool, t);
                        self.selection
                            .sync(self.selected, false, &self.ctx.nodes, surface);
                    }
                }
                DecodeDone::Frame {
                    token,
                    clip_id,
                    frame,
                } => {
                    resolver::on_frame(&mut self.ctx, project, surface, token, clip_id, frame);
                }
                DecodeDone::Primed {
                    serial,
                    clip_id,
                    first,
                    second,
                } => {
                    resolver::on_primed(&mut self.ctx, serial, clip_id, first, second);
                }
                DecodeDone::Pulled {
                    serial,
                    clip_id,
                    frame,
                } => {
                    self.scheduler.on_pulled(&mut self.ctx, serial, clip_id, frame);
                }
            }
        }

        if self.scheduler.is_running()
            && !self.scheduler.tick(
                &mut self.ctx,
                project,
                surface,
                &self.pool,
                store,
                self.audio.as_mut(),
            )
        {
            let at = self.ctx.time.get();
            let _ = self.events_tx.send(EngineEvent::PlaybackStopped { at });
            self.selection
                .sync(self.selected, false, &self.ctx.nodes, surface);
        }
    }

    /// Mirror the host's clip selection onto the manipulation affordance.
    pub fn set_selected(&mut self, selected: Option<Uuid>, surface: &mut dyn RenderSurface) {
        self.selected = selected;
        self.selection.sync(
            selected,
            self.scheduler.is_running(),
            &self.ctx.nodes,
            surface,
        );
    }

    /// A surface manipulation finished; write the transform back.
    pub fn end_manipulation(
        &mut self,
        clip_id: Uuid,
        ev: &ManipulationEnd,
        project: &Project,
        store: &mut dyn EditStore,
    ) {
        self.selection.manipulation_ended(clip_id, ev, project, store);
    }

    /// Make sure a node exists for `clip` regardless of the playhead
    /// (export preview, drag ghosting).
    pub fn ensure_clip_visible(
        &mut self,
        clip: &Clip,
        project: &Project,
        surface: &mut dyn RenderSurface,
    ) {
        self.ctx.nodes.ensure(clip, project, surface);
    }

    pub fn release_clip(&mut self, clip_id: Uuid, surface: &mut dyn RenderSurface) {
        self.ctx.close_stream(&clip_id);
        self.ctx.nodes.release(clip_id, surface);
    }

    /// Release every held resource. The engine is reusable afterwards.
    pub fn teardown(&mut self, surface: &mut dyn RenderSurface) {
        info!("engine teardown");
        self.scheduler.stop(&mut self.ctx);
        self.selection.sync(None, false, &self.ctx.nodes, surface);
        self.ctx.teardown(surface);
    }
}

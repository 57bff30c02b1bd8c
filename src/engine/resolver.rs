//! Static frame resolver.
//!
//! Owns the paused/scrubbing view: every seek resolves exactly the clips
//! under the playhead, requests their single frame asynchronously, and
//! pre-opens a primed frame stream per clip so a following play press
//! starts without a decode stall. All completions are validated against
//! the request token; rapid scrubbing converges on the latest position no
//! matter how requests interleave.

use log::trace;
use uuid::Uuid;

use crate::frame::VideoFrame;
use crate::surface::RenderSurface;
use crate::timeline::Project;

use super::context::{ClipStream, RuntimeContext};
use super::workers::{DecodeJob, DecodePool, SharedStream};

/// Resolve the still view at timeline time `t`.
pub fn resolve(
    ctx: &mut RuntimeContext,
    project: &Project,
    surface: &mut dyn RenderSurface,
    pool: &DecodePool,
    t: f64,
) {
    let token = ctx.stamp_token(t);

    // Streams opened for a previous position are useless now.
    ctx.close_all_streams();

    let visible: Vec<_> = project
        .clips_at(t)
        .into_iter()
        .filter(|c| c.kind.has_picture())
        .cloned()
        .collect();

    for clip_id in ctx.nodes.ids() {
        if !visible.iter().any(|c| c.id == clip_id) {
            ctx.nodes.release(clip_id, surface);
        }
    }

    ctx.sinks.sync(project, pool);

    for clip in &visible {
        ctx.nodes.ensure(clip, project, surface);
        if !clip.kind.needs_sink() {
            continue; // text is rendered by the host
        }
        let Some(sink) = ctx.sinks.picture(&clip.asset_id) else {
            continue; // still opening, or failed; resolved again on SinksReady
        };
        let st = clip.source_time(t);
        pool.submit(DecodeJob::FrameAt {
            token,
            clip_id: clip.id,
            time: st,
            sink: sink.clone(),
        });

        // Pre-open and prime the playback stream for this position.
        let stream: SharedStream = {
            let mut guard = sink.lock().unwrap_or_else(|e| e.into_inner());
            std::sync::Arc::new(std::sync::Mutex::new(guard.frames(st)))
        };
        let serial = ctx.alloc_serial();
        ctx.streams
            .insert(clip.id, ClipStream::new(stream.clone(), serial, st));
        pool.submit(DecodeJob::Prime {
            serial,
            clip_id: clip.id,
            stream,
        });
    }
    surface.batch_redraw();
}

/// Completed single-shot frame query.
pub fn on_frame(
    ctx: &mut RuntimeContext,
    project: &Project,
    surface: &mut dyn RenderSurface,
    token: u64,
    clip_id: Uuid,
    frame: Option<VideoFrame>,
) {
    if token != ctx.token {
        trace!("discarding stale frame for clip {} (token {})", clip_id, token);
        return;
    }
    let Some(frame) = frame else {
        return; // past the end of the source; keep whatever is on screen
    };
    let Some(canvas) = ctx.nodes.canvas(&clip_id) else {
        return; // node released since the request went out
    };
    let adjust = project.clip(&clip_id).and_then(|c| c.adjust.as_ref().copied());
    canvas.draw_frame(&frame, adjust.as_ref());
    surface.batch_redraw();
}

/// Completed stream priming.
pub fn on_primed(
    ctx: &mut RuntimeContext,
    serial: u64,
    clip_id: Uuid,
    first: Option<VideoFrame>,
    second: Option<VideoFrame>,
) {
    let Some(stream) = ctx.streams.get_mut(&clip_id) else {
        return;
    };
    if stream.serial != serial {
        trace!("discarding primed frames for replaced stream of clip {}", clip_id);
        return;
    }
    if first.is_none() {
        stream.exhausted = true;
    }
    stream.ready = first;
    stream.prefetch = second;
}

//! Decode worker pool.
//!
//! All decoder-touching work (opening sources, single-shot frame queries,
//! stream pulls) runs here, off the tick thread. Results come back over
//! one crossbeam channel and are drained by the engine tick, which
//! re-validates every completion against the current request token (scrub)
//! or stream serial (playback) before touching shared state. Stale
//! completions are discarded, never reordered.
//!
//! `threads = 0` runs each job inline on submit: same channel, same
//! validation path, fully deterministic. Tests use it.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{trace, warn};
use uuid::Uuid;

use crate::decode::{FrameStream, PictureSink, SinkOptions, SourceOpener};
use crate::frame::VideoFrame;
use crate::timeline::ClipKind;

use super::sinks::SinkEntry;

/// Picture sink shared between the registry and in-flight worker jobs.
pub type SharedPictureSink = Arc<Mutex<Box<dyn PictureSink>>>;

/// Frame stream shared between the runtime context and pull jobs.
pub type SharedStream = Arc<Mutex<Box<dyn FrameStream>>>;

/// Work shipped to the pool.
pub enum DecodeJob {
    /// Open a source and negotiate its sinks.
    Open {
        asset_id: Uuid,
        kind: ClipKind,
        locator: String,
        options: SinkOptions,
        opener: Arc<dyn SourceOpener>,
    },
    /// Single-shot frame for the static resolver; `token` guards staleness.
    FrameAt {
        token: u64,
        clip_id: Uuid,
        time: f64,
        sink: SharedPictureSink,
    },
    /// Pre-fetch the first two frames of a freshly opened stream so a
    /// subsequent play press has zero decode latency.
    Prime {
        serial: u64,
        clip_id: Uuid,
        stream: SharedStream,
    },
    /// Pull the next lookahead frame, draining anything already behind
    /// `min_pts` so one slow decode never causes permanent lag.
    PullNext {
        serial: u64,
        clip_id: Uuid,
        min_pts: f64,
        stream: SharedStream,
    },
}

/// Completions, always delivered through the channel (even inline).
pub enum DecodeDone {
    Opened {
        asset_id: Uuid,
        entry: anyhow::Result<SinkEntry>,
    },
    Frame {
        token: u64,
        clip_id: Uuid,
        frame: Option<VideoFrame>,
    },
    Primed {
        serial: u64,
        clip_id: Uuid,
        first: Option<VideoFrame>,
        second: Option<VideoFrame>,
    },
    Pulled {
        serial: u64,
        clip_id: Uuid,
        frame: Option<VideoFrame>,
    },
}

/// Fixed pool of decode threads plus the shared completion channel.
pub struct DecodePool {
    jobs: Option<Sender<DecodeJob>>,
    done_tx: Sender<DecodeDone>,
    done_rx: Receiver<DecodeDone>,
    handles: Vec<thread::JoinHandle<()>>,
    inline: bool,
}

impl DecodePool {
    /// `threads == 0` executes jobs synchronously on submit.
    pub fn new(threads: usize) -> Self {
        let (jobs_tx, jobs_rx) = unbounded::<DecodeJob>();
        let (done_tx, done_rx) = unbounded::<DecodeDone>();

        let mut handles = Vec::new();
        for worker_id in 0..threads {
            let rx = jobs_rx.clone();
            let tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("montage-decode-{}", worker_id))
                .spawn(move || {
                    trace!("decode worker {} started", worker_id);
                    for job in rx.iter() {
                        run_job(job, &tx);
                    }
                    trace!("decode worker {} stopped", worker_id);
                })
                .expect("failed to spawn decode worker");
            handles.push(handle);
        }

        Self {
            jobs: Some(jobs_tx),
            done_tx,
            done_rx,
            handles,
            inline: threads == 0,
        }
    }

    pub fn submit(&self, job: DecodeJob) {
        if self.inline {
            run_job(job, &self.done_tx);
            return;
        }
        if let Some(jobs) = &self.jobs
            && jobs.send(job).is_err()
        {
            warn!("decode pool shut down, job dropped");
        }
    }

    /// Drain all completions that have arrived so far.
    pub fn drain(&self) -> Vec<DecodeDone> {
        self.done_rx.try_iter().collect()
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        // Closing the job channel lets workers finish their queues and exit.
        self.jobs.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_job(job: DecodeJob, done: &Sender<DecodeDone>) {
    let result = match job {
        DecodeJob::Open {
            asset_id,
            kind,
            locator,
            options,
            opener,
        } => DecodeDone::Opened {
            asset_id,
            entry: open_entry(opener.as_ref(), asset_id, kind, &locator, options),
        },
        DecodeJob::FrameAt {
            token,
            clip_id,
            time,
            sink,
        } => {
            let frame = match lock(&sink).frame_at(time) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("frame_at({:.3}) failed for clip {}: {:#}", time, clip_id, e);
                    None
                }
            };
            DecodeDone::Frame {
                token,
                clip_id,
                frame,
            }
        }
        DecodeJob::Prime {
            serial,
            clip_id,
            stream,
        } => {
            let mut guard = lock(&stream);
            let first = guard.next();
            let second = guard.next();
            DecodeDone::Primed {
                serial,
                clip_id,
                first,
                second,
            }
        }
        DecodeJob::PullNext {
            serial,
            clip_id,
            min_pts,
            stream,
        } => {
            let mut guard = lock(&stream);
            // Drain frames already behind the clock; cache the first one
            // that is still ahead.
            let mut frame = guard.next();
            while let Some(f) = &frame {
                if f.pts >= min_pts {
                    break;
                }
                trace!("clip {}: dropping late frame pts {:.3}", clip_id, f.pts);
                frame = guard.next();
            }
            DecodeDone::Pulled {
                serial,
                clip_id,
                frame,
            }
        }
    };
    let _ = done.send(result);
}

fn open_entry(
    opener: &dyn SourceOpener,
    asset_id: Uuid,
    kind: ClipKind,
    locator: &str,
    options: SinkOptions,
) -> anyhow::Result<SinkEntry> {
    let mut handle = opener.open(locator)?;
    let picture = match kind {
        ClipKind::Video | ClipKind::Image => {
            Some(Arc::new(Mutex::new(handle.picture_sink(options)?)) as SharedPictureSink)
        }
        _ => None,
    };
    let audio = match kind {
        ClipKind::Video | ClipKind::Audio => handle
            .audio_sink()
            .map(|sink| Arc::new(Mutex::new(sink))),
        _ => None,
    };
    Ok(SinkEntry::new(asset_id, handle, picture, audio))
}

fn lock<T: ?Sized>(shared: &Arc<Mutex<Box<T>>>) -> std::sync::MutexGuard<'_, Box<T>> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

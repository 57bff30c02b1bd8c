//! Decode sink registry.
//!
//! One open source per referenced asset, shared by every clip cut from it.
//! `sync` diffs the registry against the project on every seek: missing
//! sinks are opened asynchronously, orphaned ones disposed. One source
//! failing to open never blocks the others; the failure is remembered per
//! project revision so an unchanged project does not retry the same broken
//! file on every seek, while any edit clears the slate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use indexmap::IndexMap;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::decode::{AudioSink, Fit, SinkOptions, SourceHandle, SourceOpener};
use crate::events::EngineEvent;
use crate::timeline::Project;

use super::workers::{DecodeJob, DecodePool, SharedPictureSink};

/// Audio sink shared between the registry and the playback scheduler.
pub type SharedAudioSink = Arc<Mutex<Box<dyn AudioSink>>>;

/// One open source: the container handle plus whatever sinks it yielded.
/// The handle is retained only to keep container resources alive for the
/// sinks' lifetime.
pub struct SinkEntry {
    pub asset_id: Uuid,
    pub picture: Option<SharedPictureSink>,
    pub audio: Option<SharedAudioSink>,
    _handle: Box<dyn SourceHandle>,
}

impl SinkEntry {
    pub fn new(
        asset_id: Uuid,
        handle: Box<dyn SourceHandle>,
        picture: Option<SharedPictureSink>,
        audio: Option<SharedAudioSink>,
    ) -> Self {
        Self {
            asset_id,
            picture,
            audio,
            _handle: handle,
        }
    }
}

pub struct SinkRegistry {
    opener: Arc<dyn SourceOpener>,
    entries: IndexMap<Uuid, SinkEntry>,
    in_flight: HashSet<Uuid>,
    /// Asset id -> project revision at which the open failed. Cleared when
    /// the project moves past that revision or the asset goes unreferenced.
    failed: HashMap<Uuid, u64>,
    events: Sender<EngineEvent>,
}

impl SinkRegistry {
    pub fn new(opener: Arc<dyn SourceOpener>, events: Sender<EngineEvent>) -> Self {
        Self {
            opener,
            entries: IndexMap::new(),
            in_flight: HashSet::new(),
            failed: HashMap::new(),
            events,
        }
    }

    /// Diff against the project: open sinks for newly referenced assets,
    /// dispose sinks nothing references anymore.
    pub fn sync(&mut self, project: &Project, pool: &DecodePool) {
        let wanted: HashSet<Uuid> = project
            .clips
            .values()
            .filter(|c| c.kind.needs_sink())
            .map(|c| c.asset_id)
            .collect();

        let stale: Vec<Uuid> = self
            .entries
            .keys()
            .filter(|id| !wanted.contains(*id))
            .copied()
            .collect();
        for asset_id in stale {
            debug!("disposing sink for unreferenced asset {}", asset_id);
            self.entries.shift_remove(&asset_id);
        }

        self.failed
            .retain(|id, rev| wanted.contains(id) && *rev == project.revision);

        let options = SinkOptions {
            width: project.resolution.0,
            height: project.resolution.1,
            fit: Fit::Contain,
        };
        for asset_id in wanted {
            if self.entries.contains_key(&asset_id)
                || self.in_flight.contains(&asset_id)
                || self.failed.contains_key(&asset_id)
            {
                continue;
            }
            let Some(asset) = project.asset(&asset_id) else {
                warn!("clip references missing asset {}", asset_id);
                continue;
            };
            debug!("opening source for asset {} ({})", asset_id, asset.locator);
            self.in_flight.insert(asset_id);
            pool.submit(DecodeJob::Open {
                asset_id,
                kind: asset.kind,
                locator: asset.locator.clone(),
                options,
                opener: Arc::clone(&self.opener),
            });
        }
    }

    /// Handle one completed open. Returns true when this completion drained
    /// the in-flight set, which is the moment a paused view can re-resolve.
    pub fn on_opened(
        &mut self,
        asset_id: Uuid,
        entry: anyhow::Result<SinkEntry>,
        project: &Project,
    ) -> bool {
        self.in_flight.remove(&asset_id);
        match entry {
            Ok(entry) => {
                // The asset may have been deleted while the open ran.
                if project.references_asset(&asset_id) {
                    info!("sink ready for asset {}", asset_id);
                    self.entries.insert(asset_id, entry);
                } else {
                    debug!("sink for {} arrived after asset removal, dropped", asset_id);
                }
            }
            Err(e) => {
                warn!("failed to open asset {}: {:#}", asset_id, e);
                self.failed.insert(asset_id, project.revision);
            }
        }
        if self.in_flight.is_empty() {
            let _ = self.events.send(EngineEvent::SinksReady);
            true
        } else {
            false
        }
    }

    pub fn picture(&self, asset_id: &Uuid) -> Option<SharedPictureSink> {
        self.entries
            .get(asset_id)
            .and_then(|e| e.picture.as_ref())
            .map(Arc::clone)
    }

    pub fn audio(&self, asset_id: &Uuid) -> Option<SharedAudioSink> {
        self.entries
            .get(asset_id)
            .and_then(|e| e.audio.as_ref())
            .map(Arc::clone)
    }

    pub fn is_pending(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Drop every entry. Opens still in flight will be dropped on arrival
    /// by the reference check in `on_opened`.
    pub fn teardown(&mut self) {
        info!("disposing {} decode sinks", self.entries.len());
        self.entries.clear();
        self.failed.clear();
    }
}

//! StreamManager - One Live Capture per Camera
//!
//! ## Responsibilities
//!
//! - Reconcile live stream handles against the camera snapshot
//! - Exclusive owner of every capture resource (acquire/release)
//! - Latest-frame reads for the FrameSampler
//!
//! Mutations (reconcile, remove, teardown) are serialized by an operation
//! lock, so an id is never acquired twice while its handle is live. The lock
//! also holds the newest snapshot version applied; an older snapshot is
//! never reconciled over a newer one. Frame reads only take the handle map's
//! read lock.

mod capture;
mod ffmpeg;

pub use capture::{CaptureSource, CaptureStream, ImageBytes};
pub use ffmpeg::{FfmpegCaptureSource, MjpegSplitter, CAMERA_ID_PLACEHOLDER};

use crate::camera_registry::{CameraDescriptor, CameraSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Live capture bound to one camera id
pub struct StreamHandle {
    camera_id: String,
    camera_name: String,
    opened_at: DateTime<Utc>,
    stream: Box<dyn CaptureStream>,
}

impl StreamHandle {
    async fn release(mut self) -> String {
        self.stream.close().await;
        self.camera_id
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub acquired: Vec<String>,
    pub released: Vec<String>,
    pub failed: Vec<String>,
}

/// Stream info for status views
#[derive(Debug, Clone, Serialize)]
pub struct LiveStreamInfo {
    pub camera_id: String,
    pub camera_name: String,
    pub opened_at: DateTime<Utc>,
    pub has_frame: bool,
}

/// StreamManager instance
pub struct StreamManager {
    source: Arc<dyn CaptureSource>,
    handles: RwLock<HashMap<String, StreamHandle>>,
    /// Newest applied snapshot version
    ops: Mutex<u64>,
}

impl StreamManager {
    /// Create new StreamManager
    pub fn new(source: Arc<dyn CaptureSource>) -> Self {
        Self {
            source,
            handles: RwLock::new(HashMap::new()),
            ops: Mutex::new(0),
        }
    }

    /// Bring handles into agreement with `snapshot`
    ///
    /// Stale handles (id gone, or source stopped producing) are released
    /// first, then every id without a handle is acquired concurrently. One
    /// failed acquisition never stops the others; it is retried on the next
    /// reconciliation. A snapshot older than one already applied is
    /// skipped.
    pub async fn reconcile(&self, snapshot: &CameraSnapshot) -> ReconcileReport {
        let mut applied = self.ops.lock().await;
        let mut report = ReconcileReport::default();

        if snapshot.version() < *applied {
            tracing::debug!(
                version = snapshot.version(),
                applied = *applied,
                "Superseded snapshot, skipping reconcile"
            );
            return report;
        }
        *applied = snapshot.version();

        let stale: Vec<StreamHandle> = {
            let mut handles = self.handles.write().await;
            let ids: Vec<String> = handles
                .iter()
                .filter(|(id, handle)| {
                    if !snapshot.contains(id) {
                        return true;
                    }
                    if !handle.stream.is_active() {
                        tracing::warn!(camera_id = %id, "Capture stream inactive, re-acquiring");
                        return true;
                    }
                    false
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| handles.remove(id)).collect()
        };

        for handle in stale {
            let camera_id = handle.release().await;
            tracing::info!(camera_id = %camera_id, "Stream released");
            report.released.push(camera_id);
        }

        let missing: Vec<&CameraDescriptor> = {
            let handles = self.handles.read().await;
            snapshot
                .cameras()
                .iter()
                .filter(|c| !handles.contains_key(&c.camera_id))
                .collect()
        };

        let attempts = missing.into_iter().map(|camera| async move {
            let result = self.source.open(camera).await;
            (camera, result)
        });
        let results = futures::future::join_all(attempts).await;

        let mut handles = self.handles.write().await;
        for (camera, result) in results {
            match result {
                Ok(stream) => {
                    handles.insert(
                        camera.camera_id.clone(),
                        StreamHandle {
                            camera_id: camera.camera_id.clone(),
                            camera_name: camera.camera_name.clone(),
                            opened_at: Utc::now(),
                            stream,
                        },
                    );
                    tracing::info!(camera_id = %camera.camera_id, "Stream acquired");
                    report.acquired.push(camera.camera_id.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        camera_id = %camera.camera_id,
                        error = %e,
                        "Camera access error, will retry on next reconciliation"
                    );
                    report.failed.push(camera.camera_id.clone());
                }
            }
        }

        report
    }

    /// Release the handle for `camera_id`; false when none was live
    ///
    /// `snapshot` is the registry snapshot published by the removal, so a
    /// reconcile still holding an older one cannot re-acquire the id.
    pub async fn remove(&self, camera_id: &str, snapshot: &CameraSnapshot) -> bool {
        let mut applied = self.ops.lock().await;
        *applied = (*applied).max(snapshot.version());
        let handle = self.handles.write().await.remove(camera_id);

        match handle {
            Some(handle) => {
                handle.release().await;
                tracing::info!(camera_id = %camera_id, "Stream released");
                true
            }
            None => false,
        }
    }

    /// Release every handle; safe to call when already empty
    pub async fn teardown_all(&self) -> usize {
        let _ops = self.ops.lock().await;
        let drained: Vec<StreamHandle> = self.handles.write().await.drain().map(|(_, h)| h).collect();
        let count = drained.len();

        for handle in drained {
            handle.release().await;
        }

        tracing::info!(released = count, "All streams torn down");
        count
    }

    /// Newest frame of a live stream
    pub async fn latest_frame(&self, camera_id: &str) -> Option<ImageBytes> {
        let handles = self.handles.read().await;
        handles.get(camera_id)?.stream.latest_frame()
    }

    pub async fn is_live(&self, camera_id: &str) -> bool {
        self.handles.read().await.contains_key(camera_id)
    }

    /// Live camera ids, sorted
    pub async fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn live_count(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Snapshot of live streams for status views
    pub async fn live_streams(&self) -> Vec<LiveStreamInfo> {
        let handles = self.handles.read().await;
        let mut streams: Vec<LiveStreamInfo> = handles
            .values()
            .map(|h| LiveStreamInfo {
                camera_id: h.camera_id.clone(),
                camera_name: h.camera_name.clone(),
                opened_at: h.opened_at,
                has_frame: h.stream.latest_frame().is_some(),
            })
            .collect();
        streams.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        streams
    }
}

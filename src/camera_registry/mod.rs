//! CameraRegistry - Current Camera Set
//!
//! ## Responsibilities
//!
//! - Fetch the camera list from the registry collaborator
//! - Hold the latest snapshot, swapped atomically on success
//! - Keep the stale snapshot and a readable error on failure
//! - Delete cameras through the collaborator

mod client;
mod types;

pub use client::{HttpRegistryClient, RegistryClient};
pub use types::*;

use crate::error::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Ordering state shared by `refresh` and `remove`
///
/// A fetch that started before a removal must not bring the removed id
/// back, and a fetch that lands after a newer one must not replace it.
#[derive(Debug, Default)]
struct Publication {
    /// Bumped by every successful removal
    generation: u64,
    /// Removed id -> generation of its removal
    removed: HashMap<String, u64>,
    /// Last issued fetch ticket
    issued: u64,
    /// Ticket of the last fetch that was published
    applied: u64,
    /// Version stamped on the last published snapshot
    version: u64,
}

/// CameraRegistry instance
pub struct CameraRegistry {
    client: Arc<dyn RegistryClient>,
    snapshot: RwLock<Arc<CameraSnapshot>>,
    status: RwLock<RegistryStatus>,
    publication: Mutex<Publication>,
}

impl CameraRegistry {
    /// Create new CameraRegistry with an empty snapshot
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self {
            client,
            snapshot: RwLock::new(Arc::new(CameraSnapshot::empty())),
            status: RwLock::new(RegistryStatus::default()),
            publication: Mutex::new(Publication::default()),
        }
    }

    /// Refresh from the collaborator
    ///
    /// On failure the previous snapshot stays in place. No retries here;
    /// the registry loop calls again on its own interval. Ids removed while
    /// the fetch was in flight are dropped from its result; a result older
    /// than the published one is discarded.
    pub async fn refresh(&self) -> Result<Arc<CameraSnapshot>> {
        let (ticket, generation) = {
            let mut publication = self.publication.lock().await;
            publication.issued += 1;
            (publication.issued, publication.generation)
        };

        let cameras = match self.client.list_cameras().await {
            Ok(cameras) => cameras,
            Err(e) => {
                {
                    let mut status = self.status.write().await;
                    status.loading = false;
                    status.last_error = Some(e.to_string());
                }
                tracing::warn!(error = %e, "Camera registry refresh failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let mut publication = self.publication.lock().await;
        if ticket < publication.applied {
            tracing::debug!(ticket = ticket, "Superseded camera list discarded");
            return Ok(self.snapshot.read().await.clone());
        }

        let cameras: Vec<CameraDescriptor> = cameras
            .into_iter()
            .filter(|c| match publication.removed.get(&c.camera_id) {
                Some(removed_at) if *removed_at > generation => {
                    tracing::debug!(camera_id = %c.camera_id, "Dropping camera removed during fetch");
                    false
                }
                _ => true,
            })
            .collect();
        publication.removed.retain(|_, removed_at| *removed_at > generation);
        publication.applied = ticket;
        publication.version += 1;

        let now = Utc::now();
        let snapshot = Arc::new(CameraSnapshot::new(cameras, now).with_version(publication.version));
        *self.snapshot.write().await = snapshot.clone();
        drop(publication);

        {
            let mut status = self.status.write().await;
            status.loading = false;
            status.last_error = None;
            status.last_refreshed_at = Some(now);
        }

        tracing::debug!(cameras = snapshot.len(), "Camera registry refreshed");
        Ok(snapshot)
    }

    /// Delete a camera; the local snapshot changes only on confirmed success
    pub async fn remove(&self, camera_id: &str) -> Result<Arc<CameraSnapshot>> {
        self.client.delete_camera(camera_id).await?;

        let mut publication = self.publication.lock().await;
        publication.generation += 1;
        let generation = publication.generation;
        publication.removed.insert(camera_id.to_string(), generation);
        publication.version += 1;

        let mut snapshot = self.snapshot.write().await;
        let next = Arc::new(snapshot.without(camera_id).with_version(publication.version));
        *snapshot = next.clone();

        tracing::info!(camera_id = %camera_id, "Camera removed from registry");
        Ok(next)
    }

    /// Current snapshot (fast read)
    pub async fn snapshot(&self) -> Arc<CameraSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Loading/error state
    pub async fn status(&self) -> RegistryStatus {
        self.status.read().await.clone()
    }
}

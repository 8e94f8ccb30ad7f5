//! CameraRegistry Type Definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Display name used when the registry omits one
pub const UNKNOWN_CAMERA_NAME: &str = "Unknown Camera";

/// One monitored camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub camera_id: String,
    pub camera_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_count: Option<i64>,
}

impl CameraDescriptor {
    pub fn new(camera_id: impl Into<String>, camera_name: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            camera_name: camera_name.into(),
            people_count: None,
            threat_count: None,
        }
    }
}

/// Immutable camera set from one registry fetch
///
/// Always replaced wholesale, never merged.
#[derive(Debug, Clone, Serialize)]
pub struct CameraSnapshot {
    cameras: Vec<CameraDescriptor>,
    fetched_at: Option<DateTime<Utc>>,
    version: u64,
}

impl CameraSnapshot {
    /// Snapshot before the first successful fetch
    pub fn empty() -> Self {
        Self {
            cameras: Vec::new(),
            fetched_at: None,
            version: 0,
        }
    }

    /// Build from descriptors; duplicate ids keep their first occurrence
    pub fn new(cameras: Vec<CameraDescriptor>, fetched_at: DateTime<Utc>) -> Self {
        let mut seen = HashSet::new();
        let cameras = cameras
            .into_iter()
            .filter(|c| {
                let fresh = seen.insert(c.camera_id.clone());
                if !fresh {
                    tracing::warn!(camera_id = %c.camera_id, "Duplicate camera id in registry snapshot, ignoring");
                }
                fresh
            })
            .collect();

        Self {
            cameras,
            fetched_at: Some(fetched_at),
            version: 0,
        }
    }

    /// Stamp with the registry's publish counter
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Publish order; a higher version supersedes a lower one
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn cameras(&self) -> &[CameraDescriptor] {
        &self.cameras
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraDescriptor> {
        self.cameras.iter().find(|c| c.camera_id == camera_id)
    }

    pub fn contains(&self, camera_id: &str) -> bool {
        self.get(camera_id).is_some()
    }

    /// Copy of this snapshot without `camera_id`
    pub fn without(&self, camera_id: &str) -> Self {
        Self {
            cameras: self
                .cameras
                .iter()
                .filter(|c| c.camera_id != camera_id)
                .cloned()
                .collect(),
            fetched_at: self.fetched_at,
            version: self.version,
        }
    }
}

/// Readable registry state for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    /// True until the first refresh completes (success or failure)
    pub loading: bool,
    /// Message of the most recent failed refresh, cleared on success
    pub last_error: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl Default for RegistryStatus {
    fn default() -> Self {
        Self {
            loading: true,
            last_error: None,
            last_refreshed_at: None,
        }
    }
}

// ========================================
// Wire format
// ========================================

/// Camera id as sent by the registry (string or number)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Camera record from `GET /api/cameras/`
#[derive(Debug, Clone, Deserialize)]
pub struct RawCamera {
    #[serde(rename = "cameraId", default)]
    pub camera_id: Option<RawId>,
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(rename = "cameraName", default)]
    pub camera_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub people: Option<i64>,
    #[serde(default)]
    pub threats: Option<i64>,
}

impl RawCamera {
    /// Normalize; `None` when the record carries no usable id
    pub fn into_descriptor(self) -> Option<CameraDescriptor> {
        let camera_id = self
            .camera_id
            .or(self.id)
            .map(RawId::into_string)
            .filter(|id| !id.is_empty())?;

        let camera_name = self
            .camera_name
            .or(self.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_CAMERA_NAME.to_string());

        Some(CameraDescriptor {
            camera_id,
            camera_name,
            people_count: self.people,
            threat_count: self.threats,
        })
    }
}

/// List endpoint envelope
#[derive(Debug, Clone, Deserialize)]
pub struct CameraListResponse {
    #[serde(default)]
    pub cameras: Vec<RawCamera>,
}

impl CameraListResponse {
    /// Normalized descriptors, dropping records without an id
    pub fn into_descriptors(self) -> Vec<CameraDescriptor> {
        self.cameras
            .into_iter()
            .filter_map(|raw| {
                let descriptor = raw.into_descriptor();
                if descriptor.is_none() {
                    tracing::warn!("Registry returned camera without id, skipping");
                }
                descriptor
            })
            .collect()
    }
}

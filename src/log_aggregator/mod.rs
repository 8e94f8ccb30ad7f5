//! LogAggregator - Safe/Threat Log Streams (Ring Buffers)
//!
//! ## Responsibilities
//!
//! - Classify verdicts into the safe or threat log
//! - Bounded FIFO buffers, oldest evicted first
//! - Ordered copies for readers
//!
//! Entries are never mutated after insertion; order is arrival order.

use crate::detection_client::{ThreatCategory, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::RwLock;

/// Default number of entries kept per log
pub const DEFAULT_LOG_CAPACITY: usize = 21;

/// Which log an entry went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Safe,
    Threat,
}

/// One recorded detection result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub camera_id: String,
    pub camera_name: String,
    pub verdict_label: String,
    #[serde(default)]
    pub categories: Vec<ThreatCategory>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} | {}] {}", self.camera_id, self.camera_name, self.verdict_label)
    }
}

/// Bounded FIFO of log entries
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// LogAggregator instance
pub struct LogAggregator {
    safe: RwLock<LogBuffer>,
    threat: RwLock<LogBuffer>,
}

impl LogAggregator {
    /// Create new LogAggregator; both logs share `capacity`
    pub fn new(capacity: usize) -> Self {
        Self {
            safe: RwLock::new(LogBuffer::new(capacity)),
            threat: RwLock::new(LogBuffer::new(capacity)),
        }
    }

    /// Append one entry to the log matching the verdict
    pub async fn record(&self, verdict: &Verdict, camera_id: &str, camera_name: &str) -> LogKind {
        let entry = LogEntry {
            timestamp: Utc::now(),
            camera_id: camera_id.to_string(),
            camera_name: camera_name.to_string(),
            verdict_label: verdict.label().to_string(),
            categories: verdict.categories.clone(),
        };

        if verdict.is_threat {
            tracing::info!(
                camera_id = %camera_id,
                categories = ?verdict.categories,
                "{}",
                entry
            );
            self.threat.write().await.push(entry);
            LogKind::Threat
        } else {
            tracing::debug!(camera_id = %camera_id, "{}", entry);
            self.safe.write().await.push(entry);
            LogKind::Safe
        }
    }

    /// Safe log, oldest first
    pub async fn safe_logs(&self) -> Vec<LogEntry> {
        self.safe.read().await.entries()
    }

    /// Threat log, oldest first
    pub async fn threat_logs(&self) -> Vec<LogEntry> {
        self.threat.read().await.entries()
    }
}

impl Default for LogAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

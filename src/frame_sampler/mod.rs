//! FrameSampler - Still Frames from Live Streams
//!
//! `None` is the normal answer for a camera with no handle or a stream that
//! is still warming up; the caller skips that camera for the tick.

use crate::stream_manager::{ImageBytes, StreamManager};
use std::sync::Arc;

/// FrameSampler instance
#[derive(Clone)]
pub struct FrameSampler {
    streams: Arc<StreamManager>,
}

impl FrameSampler {
    pub fn new(streams: Arc<StreamManager>) -> Self {
        Self { streams }
    }

    /// Current still image for `camera_id`, if a live frame exists
    pub async fn sample(&self, camera_id: &str) -> Option<ImageBytes> {
        let frame = self.streams.latest_frame(camera_id).await;
        if frame.is_none() {
            tracing::debug!(camera_id = %camera_id, "No frame available, skipping");
        }
        frame
    }
}

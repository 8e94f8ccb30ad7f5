//! Capture resource seam
//!
//! A `CaptureSource` opens one `CaptureStream` per camera. Only the
//! StreamManager calls `open` and `close`.

use crate::camera_registry::CameraDescriptor;
use crate::error::Result;
use async_trait::async_trait;

/// Encoded still image (JPEG)
pub type ImageBytes = Vec<u8>;

/// Acquires live capture resources
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire a live stream for `camera`; fails with `Error::CaptureFailed`
    async fn open(&self, camera: &CameraDescriptor) -> Result<Box<dyn CaptureStream>>;
}

/// One acquired, continuously running capture
#[async_trait]
pub trait CaptureStream: Send + Sync {
    /// Most recent still frame; `None` while the stream is warming up
    fn latest_frame(&self) -> Option<ImageBytes>;

    /// False once the underlying source has stopped producing
    fn is_active(&self) -> bool {
        true
    }

    /// Release the resource
    async fn close(&mut self);
}

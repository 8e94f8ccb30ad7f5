//! ffmpeg capture backend
//!
//! One long-lived ffmpeg process per camera decodes the input and writes an
//! MJPEG stream to stdout. A reader task splits it into JPEG frames and keeps
//! only the newest one, so sampling never waits on I/O.
//!
//! Uses kill_on_drop(true): a handle dropped without `close()` still takes
//! its ffmpeg process down with it.

use super::capture::{CaptureSource, CaptureStream, ImageBytes};
use crate::camera_registry::CameraDescriptor;
use crate::error::{Error, Result};
use crate::state::AppConfig;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Placeholder substituted in the capture input template
pub const CAMERA_ID_PLACEHOLDER: &str = "{camera_id}";

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Drop partial data beyond this size (corrupt stream guard)
const MAX_BUFFERED_BYTES: usize = 8 * 1024 * 1024;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Spawns ffmpeg capture processes
pub struct FfmpegCaptureSource {
    ffmpeg_path: String,
    input_template: String,
    input_format: Option<String>,
    fps: u32,
}

impl FfmpegCaptureSource {
    /// Create new FfmpegCaptureSource
    ///
    /// # Arguments
    /// * `input_template` - ffmpeg `-i` value; `{camera_id}` is replaced per camera
    ///   (e.g. `rtsp://127.0.0.1:8554/{camera_id}` or `/dev/video0`)
    /// * `input_format` - optional `-f` before the input (e.g. `v4l2`)
    /// * `fps` - frames per second decoded into the stream
    pub fn new(
        ffmpeg_path: impl Into<String>,
        input_template: impl Into<String>,
        input_format: Option<String>,
        fps: u32,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            input_template: input_template.into(),
            input_format,
            fps: fps.max(1),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.ffmpeg_path.clone(),
            config.capture_input.clone(),
            config.capture_input_format.clone(),
            config.capture_fps,
        )
    }

    /// Resolved ffmpeg input for a camera
    pub fn input_for(&self, camera_id: &str) -> String {
        self.input_template.replace(CAMERA_ID_PLACEHOLDER, camera_id)
    }

    /// ffmpeg argument list for one camera
    pub fn args_for(&self, camera_id: &str) -> Vec<String> {
        let input = self.input_for(camera_id);
        let mut args: Vec<String> = Vec::new();

        if input.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        if let Some(ref format) = self.input_format {
            args.extend(["-f".to_string(), format.clone()]);
        }
        args.extend(["-i".to_string(), input]);
        let fps = self.fps.to_string();
        args.extend(
            [
                "-an",
                "-r",
                fps.as_str(),
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

#[async_trait]
impl CaptureSource for FfmpegCaptureSource {
    async fn open(&self, camera: &CameraDescriptor) -> Result<Box<dyn CaptureStream>> {
        let capture_failed = |message: String| Error::CaptureFailed {
            camera_id: camera.camera_id.clone(),
            message,
        };

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.args_for(&camera.camera_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| capture_failed(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| capture_failed("ffmpeg stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| capture_failed("ffmpeg stderr unavailable".to_string()))?;

        let (tx, rx) = watch::channel(None);
        let reader = tokio::spawn(pump_frames(camera.camera_id.clone(), stdout, stderr, tx));

        tracing::debug!(
            camera_id = %camera.camera_id,
            input = %self.input_for(&camera.camera_id),
            fps = self.fps,
            "ffmpeg capture started"
        );

        Ok(Box::new(FfmpegStream {
            camera_id: camera.camera_id.clone(),
            child,
            reader,
            frames: rx,
        }))
    }
}

/// Running ffmpeg capture for one camera
struct FfmpegStream {
    camera_id: String,
    child: Child,
    reader: JoinHandle<()>,
    frames: watch::Receiver<Option<ImageBytes>>,
}

#[async_trait]
impl CaptureStream for FfmpegStream {
    fn latest_frame(&self) -> Option<ImageBytes> {
        self.frames.borrow().clone()
    }

    fn is_active(&self) -> bool {
        !self.reader.is_finished()
    }

    async fn close(&mut self) {
        self.reader.abort();
        if let Err(e) = self.child.kill().await {
            tracing::debug!(camera_id = %self.camera_id, error = %e, "ffmpeg already exited");
        }
        tracing::debug!(camera_id = %self.camera_id, "ffmpeg capture stopped");
    }
}

/// Read ffmpeg stdout until EOF, publishing each completed frame
///
/// When the stream ends, the last stderr line ffmpeg wrote is logged as the
/// cause.
async fn pump_frames(
    camera_id: String,
    mut stdout: ChildStdout,
    stderr: ChildStderr,
    frames: watch::Sender<Option<ImageBytes>>,
) {
    let diagnostics = tokio::spawn(last_line(stderr));
    let mut splitter = MjpegSplitter::default();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => {
                let cause = diagnostics.await.ok().flatten();
                tracing::warn!(
                    camera_id = %camera_id,
                    cause = cause.as_deref().unwrap_or("unknown"),
                    "Capture stream ended"
                );
                break;
            }
            Ok(n) => {
                if let Some(frame) = splitter.push(&buf[..n]) {
                    frames.send_replace(Some(frame));
                }
            }
            Err(e) => {
                tracing::warn!(camera_id = %camera_id, error = %e, "Capture stream read failed");
                break;
            }
        }
    }
}

/// Last non-empty line of `reader`, read to EOF
async fn last_line<R: AsyncRead + Unpin>(reader: R) -> Option<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut last = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            last = Some(line.to_string());
        }
    }
    last
}

/// Splits a concatenated MJPEG byte stream into JPEG frames
#[derive(Debug, Default)]
pub struct MjpegSplitter {
    buf: Vec<u8>,
}

impl MjpegSplitter {
    /// Feed bytes; returns the newest frame completed by this chunk
    pub fn push(&mut self, chunk: &[u8]) -> Option<ImageBytes> {
        self.buf.extend_from_slice(chunk);
        let mut latest = None;

        loop {
            let Some(start) = find_marker(&self.buf, 0, SOI) else {
                // keep a trailing 0xFF, it may open the next SOI
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
                break;
            };
            if start > 0 {
                self.buf.drain(..start);
            }

            let Some(end) = find_marker(&self.buf, SOI.len(), EOI) else {
                break;
            };
            latest = Some(self.buf.drain(..end + EOI.len()).collect());
        }

        if self.buf.len() > MAX_BUFFERED_BYTES {
            tracing::warn!(bytes = self.buf.len(), "MJPEG buffer overflow, dropping partial frame");
            self.buf.clear();
        }

        latest
    }

    /// Bytes held for an incomplete frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find_marker(haystack: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

//! MonitorOrchestrator - Component Wiring and Lifecycle
//!
//! Owns the registry, the stream manager, the logs and the scheduler.
//! Tearing down capture happens exactly once, on the first `stop()`.

use crate::camera_registry::{
    CameraRegistry, CameraSnapshot, HttpRegistryClient, RegistryClient, RegistryStatus,
};
use crate::detection_client::{DetectionClient, Detector};
use crate::error::{Error, Result};
use crate::frame_sampler::FrameSampler;
use crate::log_aggregator::{LogAggregator, LogEntry};
use crate::polling_scheduler::{LoopStates, MonitorPipeline, PollingScheduler};
use crate::state::AppConfig;
use crate::stream_manager::{CaptureSource, FfmpegCaptureSource, LiveStreamInfo, StreamManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// MonitorOrchestrator instance
pub struct MonitorOrchestrator {
    registry: Arc<CameraRegistry>,
    streams: Arc<StreamManager>,
    logs: Arc<LogAggregator>,
    scheduler: PollingScheduler,
    torn_down: AtomicBool,
}

impl MonitorOrchestrator {
    /// Wire components around the given collaborators
    pub fn new(
        config: &AppConfig,
        registry_client: Arc<dyn RegistryClient>,
        capture_source: Arc<dyn CaptureSource>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        let registry = Arc::new(CameraRegistry::new(registry_client));
        let streams = Arc::new(StreamManager::new(capture_source));
        let sampler = FrameSampler::new(streams.clone());
        let logs = Arc::new(LogAggregator::new(config.log_capacity));

        let scheduler = PollingScheduler::new(
            MonitorPipeline {
                registry: registry.clone(),
                streams: streams.clone(),
                sampler,
                detector,
                logs: logs.clone(),
            },
            config.registry_interval,
            config.detection_interval,
        );

        Self {
            registry,
            streams,
            logs,
            scheduler,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Wire the HTTP registry, HTTP detector and ffmpeg capture from config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let registry_client = HttpRegistryClient::new(&config.registry_url, config.http_timeout)?;
        let detector = DetectionClient::with_timeout(&config.detector_url, config.http_timeout)?;
        let capture = FfmpegCaptureSource::from_config(config);

        tracing::info!(
            registry_url = %config.registry_url,
            detector_url = %config.detector_url,
            capture_input = %config.capture_input,
            "Orchestrator configured"
        );

        Ok(Self::new(
            config,
            Arc::new(registry_client),
            Arc::new(capture),
            Arc::new(detector),
        ))
    }

    /// Begin both loops; a second call while running is a no-op
    pub async fn start(&self) {
        if self.torn_down.load(Ordering::SeqCst) {
            tracing::warn!("Orchestrator already stopped, not restarting");
            return;
        }
        self.scheduler.start().await;
    }

    /// Halt both loops, then release every capture
    pub async fn stop(&self) {
        self.scheduler.stop().await;

        if !self.torn_down.swap(true, Ordering::SeqCst) {
            let released = self.streams.teardown_all().await;
            tracing::info!(released = released, "Orchestrator stopped");
        }
    }

    /// Delete a camera from the registry and release its stream
    ///
    /// Without `confirmed` nothing is sent. On registry failure the local
    /// state is left untouched.
    pub async fn remove_camera(&self, camera_id: &str, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(Error::ConfirmationRequired(format!(
                "Removing camera {} must be confirmed",
                camera_id
            )));
        }

        let snapshot = match self.registry.remove(camera_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Error deleting camera");
                return Err(e);
            }
        };

        self.streams.remove(camera_id, &snapshot).await;
        Ok(())
    }

    pub async fn snapshot(&self) -> Arc<CameraSnapshot> {
        self.registry.snapshot().await
    }

    pub async fn registry_status(&self) -> RegistryStatus {
        self.registry.status().await
    }

    pub async fn live_streams(&self) -> Vec<LiveStreamInfo> {
        self.streams.live_streams().await
    }

    pub async fn live_ids(&self) -> Vec<String> {
        self.streams.live_ids().await
    }

    pub async fn safe_logs(&self) -> Vec<LogEntry> {
        self.logs.safe_logs().await
    }

    pub async fn threat_logs(&self) -> Vec<LogEntry> {
        self.logs.threat_logs().await
    }

    pub async fn loop_states(&self) -> LoopStates {
        self.scheduler.loop_states().await
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    pub fn scheduler(&self) -> &PollingScheduler {
        &self.scheduler
    }
}

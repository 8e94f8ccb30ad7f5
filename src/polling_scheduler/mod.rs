//! PollingScheduler - Registry and Detection Loops
//!
//! ## Responsibilities
//!
//! - Registry loop: refresh the camera set, then reconcile streams
//! - Detection loop: fan out sample -> submit -> record per camera
//! - Cancellable start/stop of both loops as a unit
//!
//! Each detection tick spawns one task per camera and returns without
//! awaiting them, so a slow camera never delays other cameras or the next
//! tick. Stopping prevents further ticks; in-flight camera tasks are left to
//! finish and may add a trailing log entry.

use crate::camera_registry::{CameraDescriptor, CameraRegistry};
use crate::detection_client::Detector;
use crate::frame_sampler::FrameSampler;
use crate::log_aggregator::{LogAggregator, LogKind};
use crate::stream_manager::{ReconcileReport, StreamManager};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Waiting for the next tick
    Idle,
    /// Registry refresh + reconcile in progress
    Fetching,
    /// Per-camera cycles being dispatched
    Sampling,
    /// Loop not running
    Stopped,
}

/// States of both loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopStates {
    pub registry: LoopState,
    pub detection: LoopState,
}

/// Result of one camera's detection cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraCycleOutcome {
    /// Verdict recorded to the given log
    Recorded(LogKind),
    /// No frame available this tick
    Skipped,
    /// Detector call failed; skipped for this tick
    Failed(String),
}

/// Components the loops drive
#[derive(Clone)]
pub struct MonitorPipeline {
    pub registry: Arc<CameraRegistry>,
    pub streams: Arc<StreamManager>,
    pub sampler: FrameSampler,
    pub detector: Arc<dyn Detector>,
    pub logs: Arc<LogAggregator>,
}

/// PollingScheduler instance
pub struct PollingScheduler {
    pipeline: MonitorPipeline,
    registry_interval: Duration,
    detection_interval: Duration,
    registry_state: Arc<RwLock<LoopState>>,
    detection_state: Arc<RwLock<LoopState>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: RwLock<bool>,
}

impl PollingScheduler {
    /// Create new PollingScheduler
    pub fn new(
        pipeline: MonitorPipeline,
        registry_interval: Duration,
        detection_interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            pipeline,
            registry_interval,
            detection_interval,
            registry_state: Arc::new(RwLock::new(LoopState::Stopped)),
            detection_state: Arc::new(RwLock::new(LoopState::Stopped)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            running: RwLock::new(false),
        }
    }

    /// Start both loops
    ///
    /// The registry loop ticks immediately; the first detection tick comes
    /// one detection interval later.
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Polling already running");
                return;
            }
            *running = true;
        }

        self.shutdown.send_replace(false);
        *self.registry_state.write().await = LoopState::Idle;
        *self.detection_state.write().await = LoopState::Idle;

        tracing::info!(
            registry_interval_sec = self.registry_interval.as_secs_f64(),
            detection_interval_sec = self.detection_interval.as_secs_f64(),
            "Starting polling scheduler"
        );

        let registry_task = tokio::spawn(Self::registry_loop(
            self.pipeline.clone(),
            self.registry_state.clone(),
            self.registry_interval,
            self.shutdown.subscribe(),
        ));
        let detection_task = tokio::spawn(Self::detection_loop(
            self.pipeline.clone(),
            self.detection_state.clone(),
            self.detection_interval,
            self.shutdown.subscribe(),
        ));

        self.tasks.lock().await.extend([registry_task, detection_task]);
    }

    /// Stop both loops; returns once neither can tick again
    pub async fn stop(&self) {
        {
            let mut running = self.running.write().await;
            if !*running {
                return;
            }
            *running = false;
        }

        tracing::info!("Stopping polling scheduler");
        self.shutdown.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Polling loop terminated abnormally");
            }
        }

        *self.registry_state.write().await = LoopState::Stopped;
        *self.detection_state.write().await = LoopState::Stopped;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn loop_states(&self) -> LoopStates {
        LoopStates {
            registry: *self.registry_state.read().await,
            detection: *self.detection_state.read().await,
        }
    }

    /// Run one registry tick now
    pub async fn tick_registry(&self) -> Option<ReconcileReport> {
        Self::run_registry_tick(&self.pipeline, &self.registry_state).await
    }

    /// Run one detection tick now; handles let callers observe outcomes
    pub async fn tick_detection(&self) -> Vec<JoinHandle<CameraCycleOutcome>> {
        Self::run_detection_tick(&self.pipeline, &self.detection_state).await
    }

    async fn registry_loop(
        pipeline: MonitorPipeline,
        state: Arc<RwLock<LoopState>>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            Self::run_registry_tick(&pipeline, &state).await;
        }

        tracing::info!("Registry loop stopped");
    }

    async fn detection_loop(
        pipeline: MonitorPipeline,
        state: Arc<RwLock<LoopState>>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            // detached: tick completion != submissions complete
            drop(Self::run_detection_tick(&pipeline, &state).await);
        }

        tracing::info!("Detection loop stopped");
    }

    /// Refresh, then reconcile directly with the new snapshot
    async fn run_registry_tick(
        pipeline: &MonitorPipeline,
        state: &RwLock<LoopState>,
    ) -> Option<ReconcileReport> {
        *state.write().await = LoopState::Fetching;

        let report = match pipeline.registry.refresh().await {
            Ok(snapshot) => {
                let report = pipeline.streams.reconcile(&snapshot).await;
                if !report.acquired.is_empty() || !report.released.is_empty() || !report.failed.is_empty() {
                    tracing::info!(
                        cameras = snapshot.len(),
                        acquired = report.acquired.len(),
                        released = report.released.len(),
                        failed = report.failed.len(),
                        "Streams reconciled"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fetching cameras");
                None
            }
        };

        *state.write().await = LoopState::Idle;
        report
    }

    /// Spawn one cycle per camera in the snapshot current at fire time
    async fn run_detection_tick(
        pipeline: &MonitorPipeline,
        state: &RwLock<LoopState>,
    ) -> Vec<JoinHandle<CameraCycleOutcome>> {
        *state.write().await = LoopState::Sampling;

        let snapshot = pipeline.registry.snapshot().await;
        let handles: Vec<JoinHandle<CameraCycleOutcome>> = snapshot
            .cameras()
            .iter()
            .cloned()
            .map(|camera| tokio::spawn(Self::run_camera_cycle(pipeline.clone(), camera)))
            .collect();

        tracing::debug!(cameras = handles.len(), "Detection tick dispatched");

        *state.write().await = LoopState::Idle;
        handles
    }

    async fn run_camera_cycle(
        pipeline: MonitorPipeline,
        camera: CameraDescriptor,
    ) -> CameraCycleOutcome {
        let Some(image) = pipeline.sampler.sample(&camera.camera_id).await else {
            return CameraCycleOutcome::Skipped;
        };

        match pipeline.detector.submit(image).await {
            Ok(verdict) => {
                let kind = pipeline
                    .logs
                    .record(&verdict, &camera.camera_id, &camera.camera_name)
                    .await;
                CameraCycleOutcome::Recorded(kind)
            }
            Err(e) => {
                tracing::warn!(
                    camera_id = %camera.camera_id,
                    error = %e,
                    "Detection error, skipping camera this tick"
                );
                CameraCycleOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_registry::RegistryClient;
    use crate::detection_client::{ThreatCategory, Verdict};
    use crate::error::{Error, Result};
    use crate::stream_manager::{CaptureSource, CaptureStream, ImageBytes};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRegistry {
        ids: Vec<&'static str>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl RegistryClient for FixedRegistry {
        async fn list_cameras(&self) -> Result<Vec<CameraDescriptor>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .ids
                .iter()
                .map(|id| CameraDescriptor::new(*id, format!("{} name", id)))
                .collect())
        }

        async fn delete_camera(&self, _camera_id: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Frames carry the camera id so the detector can tell cameras apart
    struct EchoSource;
    struct EchoStream(String);

    #[async_trait]
    impl CaptureStream for EchoStream {
        fn latest_frame(&self) -> Option<ImageBytes> {
            Some(self.0.as_bytes().to_vec())
        }

        async fn close(&mut self) {}
    }

    #[async_trait]
    impl CaptureSource for EchoSource {
        async fn open(&self, camera: &CameraDescriptor) -> Result<Box<dyn CaptureStream>> {
            Ok(Box::new(EchoStream(camera.camera_id.clone())))
        }
    }

    /// "gun*" frames are threats, "down*" frames fail, "slow*" frames take 30s
    #[derive(Default)]
    struct ByIdDetector {
        submissions: AtomicUsize,
    }

    #[async_trait]
    impl Detector for ByIdDetector {
        async fn submit(&self, image: ImageBytes) -> Result<Verdict> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            let id = String::from_utf8_lossy(&image).to_string();
            if id.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
                return Ok(Verdict::safe());
            }
            if id.starts_with("down") {
                Err(Error::DetectionFailed("503 Service Unavailable".to_string()))
            } else if id.starts_with("gun") {
                Ok(Verdict::from_categories(vec![ThreatCategory::Gun]))
            } else {
                Ok(Verdict::safe())
            }
        }
    }

    struct Fixture {
        registry_client: Arc<FixedRegistry>,
        detector: Arc<ByIdDetector>,
        logs: Arc<LogAggregator>,
        streams: Arc<StreamManager>,
        scheduler: PollingScheduler,
    }

    fn fixture(ids: Vec<&'static str>) -> Fixture {
        let registry_client = Arc::new(FixedRegistry {
            ids,
            fetches: AtomicUsize::new(0),
        });
        let detector = Arc::new(ByIdDetector::default());
        let streams = Arc::new(StreamManager::new(Arc::new(EchoSource)));
        let logs = Arc::new(LogAggregator::new(21));
        let pipeline = MonitorPipeline {
            registry: Arc::new(CameraRegistry::new(registry_client.clone())),
            streams: streams.clone(),
            sampler: FrameSampler::new(streams.clone()),
            detector: detector.clone(),
            logs: logs.clone(),
        };

        Fixture {
            registry_client,
            detector,
            logs,
            streams,
            scheduler: PollingScheduler::new(pipeline, Duration::from_secs(10), Duration::from_secs(4)),
        }
    }

    async fn outcomes(handles: Vec<JoinHandle<CameraCycleOutcome>>) -> Vec<CameraCycleOutcome> {
        let mut out = Vec::new();
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_registry_tick_reconciles_streams() {
        let f = fixture(vec!["a", "b"]);

        let report = f.scheduler.tick_registry().await.unwrap();

        assert_eq!(report.acquired.len(), 2);
        assert_eq!(f.streams.live_ids().await, vec!["a", "b"]);
        assert_eq!(f.scheduler.loop_states().await.registry, LoopState::Idle);
    }

    #[tokio::test]
    async fn test_detection_tick_routes_each_camera() {
        let f = fixture(vec!["lobby", "gun-dock", "down-gate"]);
        f.scheduler.tick_registry().await;

        let results = outcomes(f.scheduler.tick_detection().await).await;

        assert!(results.contains(&CameraCycleOutcome::Recorded(LogKind::Safe)));
        assert!(results.contains(&CameraCycleOutcome::Recorded(LogKind::Threat)));
        assert!(results
            .iter()
            .any(|o| matches!(o, CameraCycleOutcome::Failed(msg) if msg.contains("503"))));
        assert_eq!(f.logs.safe_logs().await.len(), 1);
        assert_eq!(f.logs.threat_logs().await[0].camera_id, "gun-dock");
    }

    #[tokio::test]
    async fn test_detection_tick_before_streams_is_skipped() {
        let f = fixture(vec!["a"]);
        f.scheduler.pipeline.registry.refresh().await.unwrap();

        let results = outcomes(f.scheduler.tick_detection().await).await;

        assert_eq!(results, vec![CameraCycleOutcome::Skipped]);
        assert_eq!(f.detector.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_halts_ticks() {
        let f = fixture(vec!["a"]);
        assert_eq!(f.scheduler.loop_states().await.detection, LoopState::Stopped);

        f.scheduler.start().await;
        f.scheduler.start().await;
        assert!(f.scheduler.is_running().await);

        // registry fires at t=0, detection first at t=4s
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(f.registry_client.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(f.detector.submissions.load(Ordering::SeqCst), 1);

        f.scheduler.stop().await;
        let fetches = f.registry_client.fetches.load(Ordering::SeqCst);
        let submissions = f.detector.submissions.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.registry_client.fetches.load(Ordering::SeqCst), fetches);
        assert_eq!(f.detector.submissions.load(Ordering::SeqCst), submissions);
        assert_eq!(
            f.scheduler.loop_states().await,
            LoopStates {
                registry: LoopState::Stopped,
                detection: LoopState::Stopped,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_camera_delays_neither_peers_nor_ticks() {
        let f = fixture(vec!["slow-yard", "lobby"]);

        f.scheduler.start().await;
        // detection ticks at 4s and 8s; the slow submission needs 30s
        tokio::time::sleep(Duration::from_millis(8500)).await;

        let safe = f.logs.safe_logs().await;
        assert_eq!(safe.len(), 2);
        assert!(safe.iter().all(|e| e.camera_id == "lobby"));
        assert_eq!(f.detector.submissions.load(Ordering::SeqCst), 4);
        assert_eq!(f.scheduler.loop_states().await.detection, LoopState::Idle);

        f.scheduler.stop().await;

        // in-flight cycles finish after stop and may append
        tokio::time::sleep(Duration::from_secs(40)).await;
        let safe = f.logs.safe_logs().await;
        assert_eq!(safe.iter().filter(|e| e.camera_id == "slow-yard").count(), 2);
        assert_eq!(f.detector.submissions.load(Ordering::SeqCst), 4);
    }
}

// tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use threat_monitor::{
    camera_registry::{CameraDescriptor, RegistryClient},
    detection_client::{Detector, ThreatCategory, Verdict},
    orchestrator::MonitorOrchestrator,
    stream_manager::{CaptureSource, CaptureStream, ImageBytes},
    AppConfig, Error, Result,
};

/// In-memory camera registry
#[derive(Default)]
pub struct FakeRegistry {
    pub cameras: Mutex<Vec<CameraDescriptor>>,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fetches: AtomicUsize,
    pub deletes: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<ListGate>>>,
}

/// Holds one list call after it has read the camera list
#[derive(Default)]
pub struct ListGate {
    pub entered: Notify,
    pub release: Notify,
}

impl FakeRegistry {
    pub fn with(cameras: &[(&str, &str)]) -> Self {
        let registry = Self::default();
        registry.set(cameras);
        registry
    }

    /// Block the next `list_cameras` until `release` is notified
    pub fn hold_next_list(&self) -> Arc<ListGate> {
        let gate = Arc::new(ListGate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set(&self, cameras: &[(&str, &str)]) {
        *self.cameras.lock().unwrap() = cameras
            .iter()
            .map(|(id, name)| CameraDescriptor::new(*id, *name))
            .collect();
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn list_cameras(&self) -> Result<Vec<CameraDescriptor>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::FetchFailed("HTTP error! status: 500".to_string()));
        }
        let cameras = self.cameras.lock().unwrap().clone();

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(cameras)
    }

    async fn delete_camera(&self, camera_id: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(camera_id.to_string());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::DeleteFailed {
                camera_id: camera_id.to_string(),
                message: "404 Not Found".to_string(),
            });
        }
        self.cameras.lock().unwrap().retain(|c| c.camera_id != camera_id);
        Ok(())
    }
}

/// Capture whose frames are the camera id bytes
#[derive(Default)]
pub struct FakeCapture {
    pub opened: Mutex<Vec<String>>,
    pub closed: Arc<Mutex<Vec<String>>>,
}

struct FakeStream {
    camera_id: String,
    closed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CaptureStream for FakeStream {
    fn latest_frame(&self) -> Option<ImageBytes> {
        Some(self.camera_id.as_bytes().to_vec())
    }

    async fn close(&mut self) {
        self.closed.lock().unwrap().push(self.camera_id.clone());
    }
}

#[async_trait]
impl CaptureSource for FakeCapture {
    async fn open(&self, camera: &CameraDescriptor) -> Result<Box<dyn CaptureStream>> {
        self.opened.lock().unwrap().push(camera.camera_id.clone());
        Ok(Box::new(FakeStream {
            camera_id: camera.camera_id.clone(),
            closed: self.closed.clone(),
        }))
    }
}

/// Detector keyed on the camera id carried in the frame
#[derive(Default)]
pub struct FakeDetector {
    pub threats: Mutex<HashSet<String>>,
    pub failing: Mutex<HashSet<String>>,
    pub submissions: AtomicUsize,
}

impl FakeDetector {
    pub fn threat(&self, camera_id: &str) {
        self.threats.lock().unwrap().insert(camera_id.to_string());
    }

    pub fn fail(&self, camera_id: &str) {
        self.failing.lock().unwrap().insert(camera_id.to_string());
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn submit(&self, image: ImageBytes) -> Result<Verdict> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let camera_id = String::from_utf8_lossy(&image).to_string();

        if self.failing.lock().unwrap().contains(&camera_id) {
            return Err(Error::DetectionFailed("503 Service Unavailable".to_string()));
        }
        if self.threats.lock().unwrap().contains(&camera_id) {
            return Ok(Verdict::from_categories(vec![ThreatCategory::Gun]));
        }
        Ok(Verdict::safe())
    }
}

pub struct TestEnv {
    pub registry: Arc<FakeRegistry>,
    pub capture: Arc<FakeCapture>,
    pub detector: Arc<FakeDetector>,
    pub orchestrator: Arc<MonitorOrchestrator>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        registry_interval: Duration::from_secs(10),
        detection_interval: Duration::from_secs(4),
        log_capacity: 21,
        ..AppConfig::default()
    }
}

/// Orchestrator over fakes; nothing is started
pub fn setup(cameras: &[(&str, &str)]) -> TestEnv {
    let registry = Arc::new(FakeRegistry::with(cameras));
    let capture = Arc::new(FakeCapture::default());
    let detector = Arc::new(FakeDetector::default());

    let orchestrator = Arc::new(MonitorOrchestrator::new(
        &test_config(),
        registry.clone(),
        capture.clone(),
        detector.clone(),
    ));

    TestEnv {
        registry,
        capture,
        detector,
        orchestrator,
    }
}

impl TestEnv {
    /// One registry tick, then one detection tick awaited to completion
    pub async fn run_cycle(&self) {
        let scheduler = self.orchestrator.scheduler();
        scheduler.tick_registry().await;
        for handle in scheduler.tick_detection().await {
            handle.await.unwrap();
        }
    }
}

/// Serve `router` on an ephemeral local port; returns its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

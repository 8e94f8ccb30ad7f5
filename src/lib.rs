//! Threat Monitor Library
//!
//! Multi-camera threat monitor: keeps one live capture per registered
//! camera, samples frames on a fixed cadence, submits them to a remote
//! detector and keeps bounded safe/threat logs.
//!
//! ## Architecture (8 Components)
//!
//! 1. CameraRegistry - Current camera set (atomic snapshots)
//! 2. StreamManager - One capture resource per camera
//! 3. FrameSampler - Still frames from live streams
//! 4. DetectionClient - Remote threat detector adapter
//! 5. LogAggregator - Bounded safe/threat logs
//! 6. PollingScheduler - Registry and detection loops
//! 7. MonitorOrchestrator - Wiring and lifecycle
//! 8. WebAPI - Status and removal endpoints
//!
//! ## Design Principles
//!
//! - The registry is the single source of truth for the camera set
//! - Every failure is scoped to one camera and one tick
//! - Fixed-interval retry is the only recovery mechanism

pub mod camera_registry;
pub mod detection_client;
pub mod error;
pub mod frame_sampler;
pub mod log_aggregator;
pub mod orchestrator;
pub mod polling_scheduler;
pub mod state;
pub mod stream_manager;
pub mod web_api;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};

//! Attention Flux - On-device attention classification from facial landmarks
//!
//! Flux turns per-frame facial landmarks into a stabilized attention signal
//! and tracks attention sessions through a deterministic pipeline:
//! feature extraction → hysteresis → session state machine → analytics.
//!
//! ## Modules
//!
//! - **Engine**: Synchronous frame-by-frame processing with injected time
//! - **Runtime**: Background monitor driving an engine from a frame source
//! - **Calibration**: Personalized thresholds from a short sample window

pub mod analytics;
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod hysteresis;
pub mod recorder;
pub mod runtime;
pub mod session;
pub mod smoothing;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

#[cfg(test)]
pub(crate) mod fixtures;

pub use calibration::{CalibratedThresholds, CalibrationOutcome};
pub use config::{CameraPlacement, TrackerConfig};
pub use engine::{AttentionEngine, FrameOutcome, SessionSnapshot};
pub use error::TrackerError;
pub use recorder::{MemoryRecorder, NdjsonRecorder, NullRecorder, SessionRecorder};
pub use runtime::{FrameSource, Monitor, MonitorOptions};
pub use types::{
    Analytics, Attention, Frame, LandmarkSet, Point, RawDecision, SessionState, SessionSummary,
    Stats,
};

/// Flux version embedded in doctor reports and the C ABI
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "attention-flux";

//! Error types for Attention Flux

use thiserror::Error;

/// Errors that can occur while classifying frames or managing a session
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Malformed landmarks: missing index {index} (set has {len} points)")]
    MalformedLandmarks { index: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timestamp out of range: {0} ms")]
    InvalidTimestamp(i64),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Calibration requires an active tracking session")]
    NotTracking,

    #[error("A calibration is already in progress")]
    CalibrationInProgress,

    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Worker thread panicked")]
    WorkerPanicked,
}

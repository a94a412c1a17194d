//! Persistence collaborators
//!
//! The engine never writes files itself; it hands span records, session
//! summaries and calibrated configurations to a [`SessionRecorder`]. Failures
//! are reported back as errors, which the engine logs and otherwise ignores.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::types::{SessionSummary, SpanRecord};

/// Sink for records produced by a session
pub trait SessionRecorder: Send {
    fn record_span(&mut self, span: &SpanRecord) -> Result<(), TrackerError>;

    fn record_session(&mut self, summary: &SessionSummary) -> Result<(), TrackerError>;

    fn save_config(&mut self, config: &TrackerConfig) -> Result<(), TrackerError>;
}

/// Recorder that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl SessionRecorder for NullRecorder {
    fn record_span(&mut self, _span: &SpanRecord) -> Result<(), TrackerError> {
        Ok(())
    }

    fn record_session(&mut self, _summary: &SessionSummary) -> Result<(), TrackerError> {
        Ok(())
    }

    fn save_config(&mut self, _config: &TrackerConfig) -> Result<(), TrackerError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    spans: Vec<SpanRecord>,
    sessions: Vec<SessionSummary>,
    configs: Vec<TrackerConfig>,
}

/// In-memory recorder; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> Result<T, TrackerError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| TrackerError::Persistence("memory recorder lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        self.with(|r| r.spans.clone()).unwrap_or_default()
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.with(|r| r.sessions.clone()).unwrap_or_default()
    }

    pub fn configs(&self) -> Vec<TrackerConfig> {
        self.with(|r| r.configs.clone()).unwrap_or_default()
    }
}

impl SessionRecorder for MemoryRecorder {
    fn record_span(&mut self, span: &SpanRecord) -> Result<(), TrackerError> {
        self.with(|r| r.spans.push(span.clone()))
    }

    fn record_session(&mut self, summary: &SessionSummary) -> Result<(), TrackerError> {
        self.with(|r| r.sessions.push(summary.clone()))
    }

    fn save_config(&mut self, config: &TrackerConfig) -> Result<(), TrackerError> {
        self.with(|r| r.configs.push(config.clone()))
    }
}

/// File recorder: spans and sessions appended as one JSON object per line,
/// configuration written as pretty JSON
#[derive(Debug, Clone, Default)]
pub struct NdjsonRecorder {
    span_log: Option<PathBuf>,
    sessions_log: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl NdjsonRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_span_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.span_log = Some(path.into());
        self
    }

    pub fn with_sessions_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.sessions_log = Some(path.into());
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<(), TrackerError> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

impl SessionRecorder for NdjsonRecorder {
    fn record_span(&mut self, span: &SpanRecord) -> Result<(), TrackerError> {
        match &self.span_log {
            Some(path) => Self::append_line(path, span),
            None => Ok(()),
        }
    }

    fn record_session(&mut self, summary: &SessionSummary) -> Result<(), TrackerError> {
        match &self.sessions_log {
            Some(path) => Self::append_line(path, summary),
            None => Ok(()),
        }
    }

    fn save_config(&mut self, config: &TrackerConfig) -> Result<(), TrackerError> {
        match &self.config_path {
            Some(path) => {
                fs::write(path, config.to_json()?)?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(seconds: f64) -> SpanRecord {
        SpanRecord {
            timestamp: "2024-01-15T14:00:12+00:00".to_string(),
            attention_span_seconds: seconds,
            duration_human_readable: format!("{}s", seconds as u64),
        }
    }

    #[test]
    fn test_memory_recorder_clones_share_storage() {
        let recorder = MemoryRecorder::new();
        let mut handle = recorder.clone();
        handle.record_span(&span(12.0)).unwrap();
        handle.save_config(&TrackerConfig::default()).unwrap();

        assert_eq!(recorder.spans(), vec![span(12.0)]);
        assert_eq!(recorder.configs().len(), 1);
        assert!(recorder.sessions().is_empty());
    }

    #[test]
    fn test_ndjson_appends_one_line_per_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attention_log.json");
        let mut recorder = NdjsonRecorder::new().with_span_log(&path);

        recorder.record_span(&span(12.0)).unwrap();
        recorder.record_span(&span(3.5)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: SpanRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.attention_span_seconds, 3.5);
    }

    #[test]
    fn test_ndjson_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attention_config.json");
        let mut recorder = NdjsonRecorder::new().with_config_path(&path);
        let config = TrackerConfig {
            calibrated: true,
            ..Default::default()
        };

        recorder.save_config(&config).unwrap();
        assert_eq!(TrackerConfig::load(&path), config);
    }

    #[test]
    fn test_unconfigured_paths_are_noops() {
        let mut recorder = NdjsonRecorder::new();
        assert!(recorder.record_span(&span(2.0)).is_ok());
        assert!(recorder.save_config(&TrackerConfig::default()).is_ok());
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder =
            NdjsonRecorder::new().with_span_log(dir.path().join("missing").join("log.json"));
        assert!(matches!(
            recorder.record_span(&span(2.0)),
            Err(TrackerError::Io(_))
        ));
    }
}

//! Engine orchestration
//!
//! This module provides the synchronous public API for Attention Flux.
//! It runs one frame through the full chain: landmarks → feature extraction →
//! hysteresis → session state machine, with calibration running alongside.
//! Time is always injected by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics;
use crate::calibration::{CalibrationOutcome, Calibrator};
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::features::FeatureExtractor;
use crate::hysteresis::HysteresisEngine;
use crate::recorder::{NullRecorder, SessionRecorder};
use crate::session::{SessionLog, SessionTracker, DEFAULT_TICK_SECS};
use crate::types::{
    Analytics, Attention, CalibrationSample, FrameDiagnostics, LandmarkSet, RawDecision,
    SessionState, SessionSummary, SpanEvent, Stats,
};

/// Result of processing one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameOutcome {
    /// Session state after the frame
    pub state: SessionState,
    /// Hysteresis output for the frame
    pub stabilized: Attention,
    /// Feature extractor output (absent for no-face or malformed frames)
    pub raw: Option<RawDecision>,
    /// Span logged by this frame, if any
    pub span: Option<SpanEvent>,
    /// Set when a calibration window closed on this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationOutcome>,
}

/// Immutable copy of everything readers need
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionLog,
    pub diagnostics: FrameDiagnostics,
    pub calibrating: bool,
    pub calibrated: bool,
    pub debug_overlay: bool,
}

impl SessionSnapshot {
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Stats {
        analytics::stats(&self.session, now)
    }

    pub fn analytics(&self, now: DateTime<Utc>) -> Analytics {
        analytics::analytics(&self.session, now)
    }
}

/// Stateful frame processor with an attached persistence collaborator
pub struct AttentionEngine {
    config: TrackerConfig,
    extractor: FeatureExtractor,
    hysteresis: HysteresisEngine,
    session: SessionTracker,
    calibrator: Calibrator,
    recorder: Box<dyn SessionRecorder>,
    diagnostics: FrameDiagnostics,
    calibration_done: bool,
    tracking: bool,
}

impl Default for AttentionEngine {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl AttentionEngine {
    /// Create an engine that discards persisted records
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_recorder(config, Box::new(NullRecorder))
    }

    /// Create an engine handing spans, summaries and calibrated configs to `recorder`
    pub fn with_recorder(config: TrackerConfig, recorder: Box<dyn SessionRecorder>) -> Self {
        Self {
            extractor: FeatureExtractor::new(&config),
            hysteresis: HysteresisEngine::new(&config),
            session: SessionTracker::with_tick(DEFAULT_TICK_SECS),
            calibrator: Calibrator::new(),
            recorder,
            diagnostics: FrameDiagnostics::default(),
            calibration_done: false,
            tracking: false,
            config,
        }
    }

    /// Distracted time credited per distracted frame (the frame-loop period)
    pub fn with_tick(mut self, tick_sec: f64) -> Self {
        self.session = SessionTracker::with_tick(tick_sec);
        self
    }

    /// Length of calibration windows opened by this engine
    pub fn with_calibration_window(mut self, window_secs: f64) -> Self {
        self.calibrator = Calibrator::with_window(window_secs);
        self
    }

    /// Process one frame; `None` means no face was detected
    pub fn process_frame(
        &mut self,
        landmarks: Option<&LandmarkSet>,
        now: DateTime<Utc>,
    ) -> FrameOutcome {
        self.tracking = true;
        let raw = landmarks.and_then(|l| match self.extractor.extract(l) {
            Ok(decision) => Some(decision),
            Err(e) => {
                tracing::warn!(error = %e, "treating malformed landmarks as a missing face");
                None
            }
        });

        match raw {
            Some(decision) => {
                self.diagnostics = FrameDiagnostics {
                    ear: decision.ear,
                    mar: decision.mar,
                    nose_xy: decision.nose_xy,
                    raw_attentive: decision.attentive,
                    cause: decision.cause,
                };
                self.calibrator.observe(CalibrationSample {
                    nose_x: decision.nose_xy.0,
                    nose_y: decision.nose_xy.1,
                    ear: decision.ear,
                });
            }
            None => {
                self.diagnostics.raw_attentive = false;
                self.diagnostics.cause = None;
            }
        }

        let stabilized = self.hysteresis.step(raw.map(|d| d.attentive));

        let calibration = self.calibrator.poll(now, &self.config);
        if let Some(outcome) = &calibration {
            self.finish_calibration(outcome);
        }

        let report = self.session.update(stabilized, now);
        if let Some(span) = &report.span {
            let record = analytics::span_record(span);
            tracing::info!(
                seconds = record.attention_span_seconds,
                duration = %record.duration_human_readable,
                "attention span logged"
            );
            if let Err(e) = self.recorder.record_span(&record) {
                tracing::warn!(error = %e, "failed to persist attention span");
            }
        }

        FrameOutcome {
            state: report.state,
            stabilized,
            raw,
            span: report.span,
            calibration,
        }
    }

    fn finish_calibration(&mut self, outcome: &CalibrationOutcome) {
        match outcome {
            CalibrationOutcome::Calibrated {
                config,
                thresholds,
                samples,
            } => {
                tracing::info!(samples, ?thresholds, "calibration complete");
                if let Err(e) = self.recorder.save_config(config) {
                    tracing::warn!(error = %e, "failed to persist calibrated config");
                }
                self.install_config(config.clone());
                self.calibration_done = true;
            }
            CalibrationOutcome::InsufficientSamples { collected } => {
                tracing::info!(collected, "calibration aborted: too few face frames");
            }
        }
    }

    fn install_config(&mut self, config: TrackerConfig) {
        self.extractor.apply_config(&config);
        self.hysteresis.apply_config(&config);
        self.config = config;
    }

    /// Open a calibration window at `now`
    ///
    /// Requires at least one processed frame; a reset does not clear that.
    pub fn start_calibration(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        if !self.tracking {
            return Err(TrackerError::NotTracking);
        }
        self.calibrator.start(now)
    }

    /// Drop the open calibration window, if any
    pub fn cancel_calibration(&mut self) -> bool {
        self.calibrator.cancel()
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrator.is_active()
    }

    /// One-shot flag set by a successful calibration
    pub fn take_calibration_done(&mut self) -> bool {
        std::mem::take(&mut self.calibration_done)
    }

    /// Replace the active configuration snapshot
    pub fn apply_config(&mut self, config: TrackerConfig) -> Result<(), TrackerError> {
        config.validate()?;
        self.install_config(config);
        Ok(())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &SessionLog {
        self.session.log()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.log().clone(),
            diagnostics: self.diagnostics,
            calibrating: self.calibrator.is_active(),
            calibrated: self.config.calibrated,
            debug_overlay: self.config.debug_overlay,
        }
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Stats {
        analytics::stats(self.session.log(), now)
    }

    pub fn analytics(&self, now: DateTime<Utc>) -> Analytics {
        analytics::analytics(self.session.log(), now)
    }

    /// Flush the session summary to the recorder; accumulators are kept
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<SessionSummary> {
        let summary = analytics::session_summary(self.session.log(), now)?;
        tracing::info!(
            session_id = %summary.session_id,
            duration_sec = summary.duration_sec,
            focus_pct = summary.focus_pct,
            "attention session stopped"
        );
        if let Err(e) = self.recorder.record_session(&summary) {
            tracing::warn!(error = %e, "failed to persist session summary");
        }
        Some(summary)
    }

    /// Discard the session and every smoothing buffer
    pub fn reset(&mut self) {
        self.session.reset();
        self.hysteresis.reset();
        self.extractor.reset();
        self.calibrator.cancel();
        self.diagnostics = FrameDiagnostics::default();
        self.calibration_done = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{attentive_face, closed_eye_face, face_with_nose};
    use crate::recorder::MemoryRecorder;
    use crate::types::Point;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    /// Feed `face` every 100 ms over `[from_ms, to_ms)`
    fn feed(
        engine: &mut AttentionEngine,
        face: Option<&LandmarkSet>,
        from_ms: i64,
        to_ms: i64,
    ) -> Vec<FrameOutcome> {
        (from_ms..to_ms)
            .step_by(100)
            .map(|ms| engine.process_frame(face, at(ms)))
            .collect()
    }

    #[test]
    fn test_session_starts_on_fourth_attentive_frame() {
        let mut engine = AttentionEngine::default();
        let face = attentive_face();
        let outcomes = feed(&mut engine, Some(&face), 0, 400);

        let states: Vec<_> = outcomes.iter().map(|o| o.state).collect();
        assert_eq!(
            states,
            vec![
                SessionState::Idle,
                SessionState::Idle,
                SessionState::Idle,
                SessionState::Attentive
            ]
        );
        assert_eq!(engine.session().session_start, Some(at(300)));
    }

    #[test]
    fn test_closing_eyes_ends_span_and_records_it() {
        let recorder = MemoryRecorder::new();
        let mut engine =
            AttentionEngine::with_recorder(TrackerConfig::default(), Box::new(recorder.clone()));
        let open = attentive_face();
        let closed = closed_eye_face();

        feed(&mut engine, Some(&open), 0, 3000);
        let outcomes = feed(&mut engine, Some(&closed), 3000, 4000);

        assert_eq!(engine.state(), SessionState::Distracted);
        let span = outcomes
            .iter()
            .find_map(|o| o.span.clone())
            .expect("span logged when distraction sets in");
        assert!(span.duration_sec > 1.0);

        let spans = recorder.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attention_span_seconds, (span.duration_sec * 100.0).round() / 100.0);
        assert_eq!(engine.stats(at(4000)).distracted_count, 1);
    }

    #[test]
    fn test_brief_dropout_does_not_flip_state() {
        let mut engine = AttentionEngine::default();
        let face = attentive_face();
        feed(&mut engine, Some(&face), 0, 1000);

        // Two missing frames push nothing into the history
        let outcomes = feed(&mut engine, None, 1000, 1200);
        assert!(outcomes.iter().all(|o| o.state == SessionState::Attentive));
        assert_eq!(engine.snapshot().diagnostics.raw_attentive, false);
    }

    #[test]
    fn test_malformed_landmarks_count_as_missing_face() {
        let mut engine = AttentionEngine::default();
        let partial = LandmarkSet::new(vec![Point::new(0.5, 0.5); 10]);
        let outcome = engine.process_frame(Some(&partial), at(0));

        assert!(outcome.raw.is_none());
        assert_eq!(outcome.stabilized, Attention::Distracted);
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn test_calibration_updates_config_and_persists() {
        let recorder = MemoryRecorder::new();
        let mut engine =
            AttentionEngine::with_recorder(TrackerConfig::default(), Box::new(recorder.clone()));
        let face = face_with_nose(0.51, 0.45);
        feed(&mut engine, Some(&face), 0, 1000);

        engine.start_calibration(at(1000)).unwrap();
        assert!(matches!(
            engine.start_calibration(at(1100)),
            Err(TrackerError::CalibrationInProgress)
        ));
        assert!(engine.snapshot().calibrating);

        let outcomes = feed(&mut engine, Some(&face), 1000, 6100);
        let finished: Vec<_> = outcomes.iter().filter_map(|o| o.calibration.clone()).collect();
        assert_eq!(finished.len(), 1);

        let config = engine.config();
        assert!(config.calibrated);
        assert!((config.head_turn_frac - 0.012).abs() < 1e-9);
        assert!((config.eye_ar_thresh - 0.27).abs() < 1e-6);
        assert_eq!(config.mar_yawn_thresh, TrackerConfig::default().mar_yawn_thresh);
        assert_eq!(recorder.configs(), vec![config.clone()]);

        assert!(engine.take_calibration_done());
        assert!(!engine.take_calibration_done());
        assert!(!engine.is_calibrating());
        // Classification kept running throughout
        assert_eq!(engine.state(), SessionState::Attentive);
    }

    #[test]
    fn test_calibration_without_face_keeps_config() {
        let mut engine = AttentionEngine::default();
        engine.process_frame(None, at(0));
        engine.start_calibration(at(0)).unwrap();
        let outcomes = feed(&mut engine, None, 100, 5100);

        assert!(outcomes.iter().any(|o| matches!(
            o.calibration,
            Some(CalibrationOutcome::InsufficientSamples { collected: 0 })
        )));
        assert_eq!(engine.config(), &TrackerConfig::default());
        assert!(!engine.take_calibration_done());
    }

    #[test]
    fn test_calibration_requires_a_processed_frame() {
        let mut engine = AttentionEngine::default();
        assert!(matches!(
            engine.start_calibration(at(0)),
            Err(TrackerError::NotTracking)
        ));
        assert!(!engine.is_calibrating());

        engine.process_frame(Some(&attentive_face()), at(0));
        engine.start_calibration(at(0)).unwrap();
        assert!(engine.is_calibrating());

        // A reset keeps the engine tracking
        engine.reset();
        engine.start_calibration(at(100)).unwrap();
    }

    #[test]
    fn test_short_calibration_window() {
        let mut engine = AttentionEngine::default().with_calibration_window(1.0);
        let face = attentive_face();
        feed(&mut engine, Some(&face), 0, 500);
        engine.start_calibration(at(500)).unwrap();

        let outcomes = feed(&mut engine, Some(&face), 500, 2000);
        let closed_at = outcomes.iter().position(|o| o.calibration.is_some()).unwrap();
        // Frames at 500..=1400 fall inside the window; the one at 1500 closes it
        assert_eq!(closed_at, 10);
        assert!(engine.take_calibration_done());
        assert!(engine.config().calibrated);
    }

    #[test]
    fn test_stop_flushes_summary_and_keeps_state() {
        let recorder = MemoryRecorder::new();
        let mut engine =
            AttentionEngine::with_recorder(TrackerConfig::default(), Box::new(recorder.clone()));
        let face = attentive_face();
        feed(&mut engine, Some(&face), 0, 2000);

        let summary = engine.stop(at(2000)).unwrap();
        assert_eq!(recorder.sessions(), vec![summary.clone()]);
        assert_eq!(summary.duration_sec, 1.7);
        assert_eq!(engine.state(), SessionState::Attentive);
    }

    #[test]
    fn test_stop_before_session_records_nothing() {
        let recorder = MemoryRecorder::new();
        let mut engine =
            AttentionEngine::with_recorder(TrackerConfig::default(), Box::new(recorder.clone()));
        assert!(engine.stop(at(0)).is_none());
        assert!(recorder.sessions().is_empty());
    }

    #[test]
    fn test_reset_matches_fresh_engine() {
        let mut engine = AttentionEngine::default();
        let open = attentive_face();
        let closed = closed_eye_face();
        feed(&mut engine, Some(&open), 0, 3000);
        feed(&mut engine, Some(&closed), 3000, 5000);
        engine.start_calibration(at(5000)).unwrap();

        engine.reset();

        let fresh = AttentionEngine::default();
        assert_eq!(engine.stats(at(9000)), fresh.stats(at(9000)));
        assert_eq!(engine.analytics(at(9000)), fresh.analytics(at(9000)));
        assert_eq!(engine.snapshot(), fresh.snapshot());

        // Smoothing buffers were cleared: attention needs four frames again
        let outcomes = feed(&mut engine, Some(&open), 10_000, 10_300);
        assert!(outcomes.iter().all(|o| o.state == SessionState::Idle));
    }

    #[test]
    fn test_snapshot_shares_session_logs() {
        let mut engine = AttentionEngine::default();
        let face = attentive_face();
        feed(&mut engine, Some(&face), 0, 12_000);

        let first = engine.snapshot();
        let second = engine.snapshot();
        assert_eq!(first.session.samples.len(), 1);
        assert!(Arc::ptr_eq(&first.session.samples, &second.session.samples));
        assert!(Arc::ptr_eq(&first.session.transitions, &engine.session().transitions));

        // Frames that only grow the live span leave the logs shared
        feed(&mut engine, Some(&face), 12_000, 13_000);
        assert!(Arc::ptr_eq(&first.session.samples, &engine.session().samples));
    }

    #[test]
    fn test_apply_config_rejects_invalid() {
        let mut engine = AttentionEngine::default();
        let bad = TrackerConfig {
            frames_attentive_to_switch: 0,
            ..Default::default()
        };
        assert!(engine.apply_config(bad).is_err());
        assert_eq!(engine.config(), &TrackerConfig::default());
    }
}

//! Core types for the Attention Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: landmark sets, raw per-frame decisions, stabilized attention,
//! session events, and the records handed to collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TrackerError;

/// A single normalized landmark point (x, y in [0, 1] image coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from(xy: [f64; 2]) -> Self {
        Self::new(xy[0], xy[1])
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Landmarks for a single detected face in a single frame.
///
/// Indices follow the 468-point face mesh layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    /// Point at `index`, or a malformed-landmarks error when absent
    pub fn point(&self, index: usize) -> Result<Point, TrackerError> {
        self.get(index).ok_or(TrackerError::MalformedLandmarks {
            index,
            len: self.points.len(),
        })
    }

    /// Overwrite a single point (used by fixtures and adapters)
    pub fn set(&mut self, index: usize, point: Point) {
        if index >= self.points.len() {
            self.points.resize(index + 1, Point::new(0.0, 0.0));
        }
        self.points[index] = point;
    }
}

impl From<Vec<Point>> for LandmarkSet {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

/// One frame delivered by a frame source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonic frame index (or source timestamp)
    #[serde(default, alias = "frame")]
    pub index: u64,
    /// Landmarks of the detected face, absent when no face was found
    #[serde(default)]
    pub landmarks: Option<LandmarkSet>,
}

/// Stabilized two-state attention signal produced by the hysteresis engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Attention {
    Attentive,
    Distracted,
}

impl Attention {
    pub fn is_attentive(&self) -> bool {
        matches!(self, Attention::Attentive)
    }
}

/// Session automaton state as exposed to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    Attentive,
    Distracted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Attentive => "ATTENTIVE",
            SessionState::Distracted => "DISTRACTED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First cascade check that flagged a frame as distracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistractionCause {
    EyesClosed,
    Yawning,
    FaceTurned,
    OffCenter,
    HeadPitch,
}

/// Per-frame output of the feature extractor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDecision {
    /// Raw attentive/distracted verdict for this frame
    pub attentive: bool,
    /// Effective (smoothed) eye aspect ratio
    pub ear: f64,
    /// Mouth aspect ratio
    pub mar: f64,
    /// Nose tip position (x, y)
    pub nose_xy: (f64, f64),
    /// First failing check, if any
    pub cause: Option<DistractionCause>,
}

/// Attention span that ended in a distraction (duration > 1 s)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub timestamp: DateTime<Utc>,
    pub duration_sec: f64,
}

/// State transition for diagnostics and event counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub timestamp: DateTime<Utc>,
    pub from_state: SessionState,
    pub to_state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_sec: Option<f64>,
}

/// Time-series sample appended every sample interval of session time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSample {
    pub elapsed_sec: f64,
    pub attentive_sec: f64,
    pub distracted_sec: f64,
    pub focus_pct: f64,
}

/// Raw features recorded while calibrating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub nose_x: f64,
    pub nose_y: f64,
    pub ear: f64,
}

/// Span log record handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub timestamp: String,
    pub attention_span_seconds: f64,
    pub duration_human_readable: String,
}

/// Summary of a stopped session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub session_start_iso: String,
    pub session_end_iso: String,
    pub duration_sec: f64,
    pub attentive_sec: f64,
    pub distracted_sec: f64,
    pub focus_pct: f64,
    pub distraction_count: u32,
    pub spans_sec: Vec<f64>,
    pub avg_span_sec: f64,
    pub max_span_sec: f64,
    pub samples: Vec<TimeSeriesSample>,
    pub events_count: usize,
}

/// Live session statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_time: String,
    pub attentive_time: String,
    pub distracted_time: String,
    pub current_span: String,
    pub distracted_count: u32,
    pub attention_percentage: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total_time: "0s".to_string(),
            attentive_time: "0s".to_string(),
            distracted_time: "0s".to_string(),
            current_span: "0s".to_string(),
            distracted_count: 0,
            attention_percentage: 0.0,
        }
    }
}

/// Stats plus chart-oriented analytics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    #[serde(flatten)]
    pub stats: Stats,
    pub avg_span_sec: f64,
    pub max_span_sec: f64,
    pub current_streak_sec: f64,
    pub longest_streak_sec: f64,
    pub spans_sec: Vec<f64>,
    pub samples: Vec<TimeSeriesSample>,
    pub events_count: usize,
    /// Distracted time accumulated by the fixed per-tick increment
    pub accumulated_distracted_sec: f64,
}

/// Last-frame feature values for debug overlays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameDiagnostics {
    pub ear: f64,
    pub mar: f64,
    pub nose_xy: (f64, f64),
    pub raw_attentive: bool,
    pub cause: Option<DistractionCause>,
}

impl Default for FrameDiagnostics {
    fn default() -> Self {
        Self {
            ear: 0.0,
            mar: 0.0,
            nose_xy: (0.5, 0.5),
            raw_attentive: false,
            cause: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.3, 0.4);
        assert!((a.distance(&b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_landmark_set_parses_from_pairs() {
        let set: LandmarkSet = serde_json::from_str("[[0.1, 0.2], [0.3, 0.4]]").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1), Some(Point::new(0.3, 0.4)));
        assert!(set.get(2).is_none());
    }

    #[test]
    fn test_missing_point_is_malformed() {
        let set = LandmarkSet::new(vec![Point::new(0.5, 0.5)]);
        match set.point(13) {
            Err(TrackerError::MalformedLandmarks { index, len }) => {
                assert_eq!(index, 13);
                assert_eq!(len, 1);
            }
            other => panic!("expected malformed landmarks, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_accepts_null_landmarks() {
        let frame: Frame = serde_json::from_str(r#"{"frame": 7, "landmarks": null}"#).unwrap();
        assert_eq!(frame.index, 7);
        assert!(frame.landmarks.is_none());
    }

    #[test]
    fn test_session_state_serializes_uppercase() {
        let json = serde_json::to_string(&SessionState::Distracted).unwrap();
        assert_eq!(json, "\"DISTRACTED\"");
        assert_eq!(SessionState::Idle.to_string(), "IDLE");
    }

    #[test]
    fn test_analytics_flattens_stats() {
        let value = serde_json::to_value(Analytics::default()).unwrap();
        assert_eq!(value["total_time"], "0s");
        assert_eq!(value["distracted_count"], 0);
        assert!(value["samples"].as_array().unwrap().is_empty());
    }
}

//! Self-calibration
//!
//! Collects raw features for a short window while the user looks at the
//! screen, then derives personalized geometry thresholds from percentiles of
//! the observed values. Only the head-pose and eye thresholds are touched;
//! the yawn threshold, yaw margin and smoothing parameters stay as they are.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::session::elapsed_secs;
use crate::types::CalibrationSample;

/// Length of the sample window
pub const CALIBRATION_WINDOW_SECS: f64 = 5.0;

/// Fewer samples than this abort the calibration
pub const MIN_CALIBRATION_SAMPLES: usize = 10;

/// Percentile with linear interpolation between closest ranks.
///
/// `p` is in [0, 100]; rank = p/100 · (n − 1). Returns `None` for no values.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Thresholds derived from a calibration window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedThresholds {
    pub head_turn_frac: f64,
    pub head_down_nose_y: f64,
    pub head_up_nose_y: f64,
    pub eye_ar_thresh: f64,
    pub ear_blink_thresh: f64,
}

impl CalibratedThresholds {
    /// Compute thresholds; `None` below [`MIN_CALIBRATION_SAMPLES`]
    pub fn from_samples(samples: &[CalibrationSample]) -> Option<Self> {
        if samples.len() < MIN_CALIBRATION_SAMPLES {
            return None;
        }

        let deviation_x: Vec<f64> = samples.iter().map(|s| (s.nose_x - 0.5).abs()).collect();
        let nose_y: Vec<f64> = samples.iter().map(|s| s.nose_y).collect();
        let ears: Vec<f64> = samples.iter().map(|s| s.ear).collect();

        Some(Self {
            head_turn_frac: percentile(&deviation_x, 90.0)? * 1.2,
            head_down_nose_y: percentile(&nose_y, 95.0)? + 0.05,
            head_up_nose_y: percentile(&nose_y, 5.0)? - 0.05,
            eye_ar_thresh: percentile(&ears, 10.0)? * 0.9,
            ear_blink_thresh: percentile(&ears, 5.0)? * 0.85,
        })
    }

    /// New configuration snapshot with these thresholds and `calibrated` set
    pub fn apply(&self, config: &TrackerConfig) -> TrackerConfig {
        TrackerConfig {
            head_turn_frac: self.head_turn_frac,
            head_down_nose_y: self.head_down_nose_y,
            head_up_nose_y: self.head_up_nose_y,
            eye_ar_thresh: self.eye_ar_thresh,
            ear_blink_thresh: self.ear_blink_thresh,
            calibrated: true,
            ..config.clone()
        }
    }
}

/// Result of a finished calibration window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalibrationOutcome {
    /// Thresholds were derived; `config` is the new snapshot
    Calibrated {
        config: TrackerConfig,
        thresholds: CalibratedThresholds,
        samples: usize,
    },
    /// Too few face frames were seen; configuration unchanged
    InsufficientSamples { collected: usize },
}

#[derive(Debug, Clone)]
struct CalibrationWindow {
    started_at: DateTime<Utc>,
    samples: Vec<CalibrationSample>,
}

/// Runs at most one calibration window at a time
#[derive(Debug, Clone)]
pub struct Calibrator {
    window: Option<CalibrationWindow>,
    window_secs: f64,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::with_window(CALIBRATION_WINDOW_SECS)
    }
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calibrator whose windows close after `window_secs` instead of the
    /// default [`CALIBRATION_WINDOW_SECS`]
    pub fn with_window(window_secs: f64) -> Self {
        Self {
            window: None,
            window_secs,
        }
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Open a sample window at `now`; rejected while one is already open
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        if self.window.is_some() {
            return Err(TrackerError::CalibrationInProgress);
        }
        tracing::debug!("calibration window opened");
        self.window = Some(CalibrationWindow {
            started_at: now,
            samples: Vec::new(),
        });
        Ok(())
    }

    /// Discard the open window and its samples; returns whether one was open
    pub fn cancel(&mut self) -> bool {
        self.window.take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.window.is_some()
    }

    pub fn sample_count(&self) -> usize {
        self.window.as_ref().map_or(0, |w| w.samples.len())
    }

    /// Record one face frame's features while a window is open
    pub fn observe(&mut self, sample: CalibrationSample) {
        if let Some(window) = self.window.as_mut() {
            window.samples.push(sample);
        }
    }

    /// Close the window once it has run its length and compute the outcome
    pub fn poll(
        &mut self,
        now: DateTime<Utc>,
        config: &TrackerConfig,
    ) -> Option<CalibrationOutcome> {
        let window_secs = self.window_secs;
        let expired = self
            .window
            .as_ref()
            .is_some_and(|w| elapsed_secs(w.started_at, now) >= window_secs);
        if !expired {
            return None;
        }

        let window = self.window.take()?;
        let collected = window.samples.len();

        let outcome = match CalibratedThresholds::from_samples(&window.samples) {
            Some(thresholds) => CalibrationOutcome::Calibrated {
                config: thresholds.apply(config),
                thresholds,
                samples: collected,
            },
            None => CalibrationOutcome::InsufficientSamples { collected },
        };
        Some(outcome)
    }
}

//! Per-frame feature extraction
//!
//! This module turns one frame's landmarks into scalar features and a raw
//! attentive/distracted verdict:
//! - Eye aspect ratio (EAR), averaged over both eyes and smoothed over a short window
//! - Mouth aspect ratio (MAR)
//! - Nose position relative to the eye corners and the frame center
//!
//! The verdict comes from a fixed-order threshold cascade; the first failing
//! check decides the frame and is reported as the distraction cause.

use crate::config::{CameraPlacement, TrackerConfig};
use crate::error::TrackerError;
use crate::smoothing::RollingWindow;
use crate::types::{DistractionCause, LandmarkSet, RawDecision};

/// Face mesh landmark indices used by the extractor
pub mod landmark_indices {
    /// Left eye contour, ordered P0..P5 for EAR
    pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
    /// Right eye contour, ordered P0..P5 for EAR
    pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];

    pub const NOSE_TIP: usize = 1;

    /// Lower bound of the forward-facing nose band
    pub const LEFT_EYE_OUTER: usize = 362;
    /// Upper bound of the forward-facing nose band
    pub const RIGHT_EYE_OUTER: usize = 133;

    pub const UPPER_LIP: usize = 13;
    pub const LOWER_LIP: usize = 14;
    pub const MOUTH_LEFT: usize = 81;
    pub const MOUTH_RIGHT: usize = 82;
}

/// Denominators below this are treated as zero
const MIN_DENOMINATOR: f64 = 1e-5;

/// Eye aspect ratio for one eye from six contour points.
///
/// Formula: `(|P1 - P5| + |P2 - P4|) / (2 * |P0 - P3|)`
/// Returns 0 when the eye width collapses below the near-zero guard.
pub fn eye_aspect_ratio(
    landmarks: &LandmarkSet,
    indices: &[usize; 6],
) -> Result<f64, TrackerError> {
    let p0 = landmarks.point(indices[0])?;
    let p1 = landmarks.point(indices[1])?;
    let p2 = landmarks.point(indices[2])?;
    let p3 = landmarks.point(indices[3])?;
    let p4 = landmarks.point(indices[4])?;
    let p5 = landmarks.point(indices[5])?;

    let vertical = p1.distance(&p5) + p2.distance(&p4);
    let horizontal = p0.distance(&p3);
    if horizontal < MIN_DENOMINATOR {
        return Ok(0.0);
    }
    Ok(vertical / (2.0 * horizontal))
}

/// Mouth aspect ratio: vertical lip gap over horizontal mouth width.
///
/// Returns 0 when the width is near zero or any lip landmark is missing.
pub fn mouth_aspect_ratio(landmarks: &LandmarkSet) -> f64 {
    use landmark_indices::{LOWER_LIP, MOUTH_LEFT, MOUTH_RIGHT, UPPER_LIP};

    match (
        landmarks.get(UPPER_LIP),
        landmarks.get(LOWER_LIP),
        landmarks.get(MOUTH_LEFT),
        landmarks.get(MOUTH_RIGHT),
    ) {
        (Some(upper), Some(lower), Some(left), Some(right)) => {
            let vertical = (lower.y - upper.y).abs();
            let width = (right.x - left.x).abs();
            if width < MIN_DENOMINATOR {
                0.0
            } else {
                vertical / width
            }
        }
        _ => 0.0,
    }
}

/// Feature extractor holding the active thresholds and the EAR smoothing buffer
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: TrackerConfig,
    ear_window: RollingWindow<f64>,
}

impl FeatureExtractor {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            config: config.clone(),
            ear_window: RollingWindow::new(config.ear_smooth_len),
        }
    }

    /// Extract features and the raw verdict for one frame.
    ///
    /// Fails with `MalformedLandmarks` when an eye or nose landmark is missing;
    /// the EAR buffer is left untouched in that case.
    pub fn extract(&mut self, landmarks: &LandmarkSet) -> Result<RawDecision, TrackerError> {
        use landmark_indices::{LEFT_EYE, LEFT_EYE_OUTER, NOSE_TIP, RIGHT_EYE, RIGHT_EYE_OUTER};

        let left_ear = eye_aspect_ratio(landmarks, &LEFT_EYE)?;
        let right_ear = eye_aspect_ratio(landmarks, &RIGHT_EYE)?;
        let nose = landmarks.point(NOSE_TIP)?;
        let left_outer_x = landmarks.point(LEFT_EYE_OUTER)?.x;
        let right_outer_x = landmarks.point(RIGHT_EYE_OUTER)?.x;

        self.ear_window.push((left_ear + right_ear) / 2.0);
        let ear = self.ear_window.mean().unwrap_or(0.0);
        let mar = mouth_aspect_ratio(landmarks);

        let cause = self.first_failing_check(ear, mar, nose.x, nose.y, left_outer_x, right_outer_x);

        Ok(RawDecision {
            attentive: cause.is_none(),
            ear,
            mar,
            nose_xy: (nose.x, nose.y),
            cause,
        })
    }

    fn first_failing_check(
        &self,
        ear: f64,
        mar: f64,
        nose_x: f64,
        nose_y: f64,
        left_outer_x: f64,
        right_outer_x: f64,
    ) -> Option<DistractionCause> {
        let c = &self.config;

        if ear < c.ear_blink_thresh || ear < c.eye_ar_thresh {
            return Some(DistractionCause::EyesClosed);
        }

        if mar > c.mar_yawn_thresh {
            return Some(DistractionCause::Yawning);
        }

        // Self-relative yaw: nose must sit between the eye corners
        if nose_x < left_outer_x - c.yaw_margin || nose_x > right_outer_x + c.yaw_margin {
            return Some(DistractionCause::FaceTurned);
        }

        if (nose_x - 0.5).abs() > c.head_turn_frac {
            return Some(DistractionCause::OffCenter);
        }

        let head_bad = match c.camera_placement {
            CameraPlacement::Below => nose_y < c.head_up_nose_y,
            CameraPlacement::Above => nose_y > c.head_down_nose_y,
            CameraPlacement::Center => nose_y > c.head_down_nose_y || nose_y < c.head_up_nose_y,
        };
        if head_bad {
            return Some(DistractionCause::HeadPitch);
        }

        None
    }

    /// Switch to a new configuration snapshot without dropping smoothing state
    pub fn apply_config(&mut self, config: &TrackerConfig) {
        self.config = config.clone();
        self.ear_window.set_capacity(config.ear_smooth_len);
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Clear the EAR smoothing buffer
    pub fn reset(&mut self) {
        self.ear_window.clear();
    }

    pub fn smoothed_len(&self) -> usize {
        self.ear_window.len()
    }
}

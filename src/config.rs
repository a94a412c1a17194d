//! Tracker configuration
//!
//! Thresholds and smoothing parameters. Every key has a default; missing keys
//! in a stored configuration fall back to those defaults and unknown keys are
//! ignored. A configuration is treated as an immutable snapshot: calibration
//! produces a new one instead of mutating the active one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::TrackerError;

/// Where the camera sits relative to the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPlacement {
    #[default]
    Center,
    Above,
    Below,
}

/// Classification thresholds and smoothing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub camera_placement: CameraPlacement,
    /// Minimum eye aspect ratio for open eyes
    pub eye_ar_thresh: f64,
    /// Eye aspect ratio below which the eyes count as blinking/closed
    pub ear_blink_thresh: f64,
    /// Maximum horizontal nose offset from frame center
    pub head_turn_frac: f64,
    /// Nose y above which the head counts as tilted down
    pub head_down_nose_y: f64,
    /// Nose y below which the head counts as tilted up
    pub head_up_nose_y: f64,
    /// Mouth aspect ratio above which the user counts as yawning
    pub mar_yawn_thresh: f64,
    /// Tolerance around the eye-corner band for the nose x position
    pub yaw_margin: f64,
    /// Raw decision history length
    pub history_len: usize,
    pub frames_attentive_to_switch: usize,
    pub frames_distracted_to_switch: usize,
    /// Push one `false` into the history every N consecutive no-face frames
    pub no_face_push_every_n: u32,
    /// EAR smoothing buffer length
    pub ear_smooth_len: usize,
    pub debug_overlay: bool,
    pub calibrated: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            camera_placement: CameraPlacement::Center,
            eye_ar_thresh: 0.20,
            ear_blink_thresh: 0.18,
            head_turn_frac: 0.28,
            head_down_nose_y: 0.58,
            head_up_nose_y: 0.35,
            mar_yawn_thresh: 0.35,
            yaw_margin: 0.08,
            history_len: 9,
            frames_attentive_to_switch: 4,
            frames_distracted_to_switch: 5,
            no_face_push_every_n: 3,
            ear_smooth_len: 3,
            debug_overlay: false,
            calibrated: false,
        }
    }
}

impl TrackerConfig {
    /// Parse a configuration, filling missing keys with defaults
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a stored configuration key by key
    ///
    /// A key whose value has the wrong type or fails validation keeps its
    /// default, so one bad entry does not discard the others. Only input
    /// that is not a JSON object is an error.
    pub fn from_json_lenient(json: &str) -> Result<Self, TrackerError> {
        let stored = match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => map,
            other => {
                return Err(TrackerError::InvalidConfig(format!(
                    "expected a JSON object, got {other}"
                )))
            }
        };

        let mut merged = match serde_json::to_value(Self::default())? {
            Value::Object(map) => map,
            _ => return Ok(Self::default()),
        };

        for (key, value) in stored {
            if !merged.contains_key(&key) {
                continue;
            }
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value);
            let accepted = serde_json::from_value::<Self>(Value::Object(candidate.clone()))
                .map_err(TrackerError::from)
                .and_then(|config| config.validate());
            match accepted {
                Ok(()) => merged = candidate,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "keeping default for config key");
                }
            }
        }

        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Load from a file; a missing or unreadable file yields the defaults
    /// and invalid keys fall back individually
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            return Self::default();
        }

        let loaded = fs::read_to_string(path)
            .map_err(TrackerError::from)
            .and_then(|json| Self::from_json_lenient(&json));

        match loaded {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring invalid config file"
                );
                Self::default()
            }
        }
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), TrackerError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), TrackerError> {
        let thresholds = [
            ("eye_ar_thresh", self.eye_ar_thresh),
            ("ear_blink_thresh", self.ear_blink_thresh),
            ("head_turn_frac", self.head_turn_frac),
            ("head_down_nose_y", self.head_down_nose_y),
            ("head_up_nose_y", self.head_up_nose_y),
            ("mar_yawn_thresh", self.mar_yawn_thresh),
            ("yaw_margin", self.yaw_margin),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() {
                return Err(TrackerError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }

        let counts = [
            ("history_len", self.history_len),
            ("frames_attentive_to_switch", self.frames_attentive_to_switch),
            ("frames_distracted_to_switch", self.frames_distracted_to_switch),
            ("no_face_push_every_n", self.no_face_push_every_n as usize),
            ("ear_smooth_len", self.ear_smooth_len),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(TrackerError::InvalidConfig(format!(
                    "{name} must be at least 1"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.eye_ar_thresh, 0.20);
        assert_eq!(config.ear_blink_thresh, 0.18);
        assert_eq!(config.head_turn_frac, 0.28);
        assert_eq!(config.history_len, 9);
        assert_eq!(config.frames_attentive_to_switch, 4);
        assert_eq!(config.frames_distracted_to_switch, 5);
        assert_eq!(config.no_face_push_every_n, 3);
        assert_eq!(config.ear_smooth_len, 3);
        assert_eq!(config.camera_placement, CameraPlacement::Center);
        assert!(!config.calibrated);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config = TrackerConfig::from_json(
            r#"{"eye_ar_thresh": 0.25, "camera_placement": "below", "mystery_key": 42}"#,
        )
        .unwrap();

        assert_eq!(config.eye_ar_thresh, 0.25);
        assert_eq!(config.camera_placement, CameraPlacement::Below);
        assert_eq!(config.mar_yawn_thresh, 0.35);
        assert_eq!(config.history_len, 9);
    }

    #[test]
    fn test_zero_history_rejected() {
        let result = TrackerConfig::from_json(r#"{"history_len": 0}"#);
        assert!(matches!(result, Err(TrackerError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attention_config.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(TrackerConfig::load(&path), TrackerConfig::default());
        assert_eq!(
            TrackerConfig::load(&dir.path().join("absent.json")),
            TrackerConfig::default()
        );
    }

    #[test]
    fn test_bad_keys_fall_back_individually() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attention_config.json");
        fs::write(
            &path,
            r#"{"eye_ar_thresh": 0.25, "calibrated": true, "head_turn_frac": 0.1,
                "camera_placement": "left", "history_len": 0, "yaw_margin": "wide"}"#,
        )
        .unwrap();

        let config = TrackerConfig::load(&path);
        assert_eq!(config.eye_ar_thresh, 0.25);
        assert!(config.calibrated);
        assert_eq!(config.head_turn_frac, 0.1);
        assert_eq!(config.camera_placement, CameraPlacement::Center);
        assert_eq!(config.history_len, 9);
        assert_eq!(config.yaw_margin, 0.08);
    }

    #[test]
    fn test_unknown_placement_keeps_other_keys() {
        let config = TrackerConfig::from_json_lenient(
            r#"{"eye_ar_thresh": 0.25, "camera_placement": "left"}"#,
        )
        .unwrap();
        assert_eq!(config.eye_ar_thresh, 0.25);
        assert_eq!(config.camera_placement, CameraPlacement::Center);

        assert!(TrackerConfig::from_json(r#"{"camera_placement": "left"}"#).is_err());
        assert!(TrackerConfig::from_json_lenient("[1, 2]").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attention_config.json");
        let config = TrackerConfig {
            head_turn_frac: 0.2,
            calibrated: true,
            ..Default::default()
        };

        config.save(&path).unwrap();
        assert_eq!(TrackerConfig::load(&path), config);
    }
}

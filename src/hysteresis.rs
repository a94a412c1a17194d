//! Temporal smoothing of raw decisions
//!
//! The hysteresis engine keeps a bounded history of raw attentive/distracted
//! booleans and reports a stabilized two-state signal. Distraction wins as
//! soon as enough distracted frames accumulate; attention needs its own
//! (independently configured) count. Short face-detection dropouts are
//! damped by only recording every Nth consecutive no-face frame.

use crate::config::TrackerConfig;
use crate::smoothing::RollingWindow;
use crate::types::Attention;

/// Asymmetric switch-count hysteresis over raw decisions
#[derive(Debug, Clone)]
pub struct HysteresisEngine {
    history: RollingWindow<bool>,
    frames_attentive_to_switch: usize,
    frames_distracted_to_switch: usize,
    no_face_push_every_n: u32,
    no_face_count: u32,
}

impl HysteresisEngine {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            history: RollingWindow::new(config.history_len),
            frames_attentive_to_switch: config.frames_attentive_to_switch,
            frames_distracted_to_switch: config.frames_distracted_to_switch,
            no_face_push_every_n: config.no_face_push_every_n.max(1),
            no_face_count: 0,
        }
    }

    /// Record one frame (`None` when no face was detected) and return the stabilized signal
    pub fn step(&mut self, raw: Option<bool>) -> Attention {
        match raw {
            Some(attentive) => {
                self.no_face_count = 0;
                self.history.push(attentive);
            }
            None => {
                self.no_face_count += 1;
                if self.no_face_count % self.no_face_push_every_n == 0 {
                    self.history.push(false);
                }
            }
        }
        self.stabilized()
    }

    /// Current stabilized signal without recording a frame
    pub fn stabilized(&self) -> Attention {
        let total = self.history.len();
        if total < self.frames_attentive_to_switch {
            return Attention::Distracted;
        }

        let attentive = self.history.count_true();
        let distracted = total - attentive;

        if distracted >= self.frames_distracted_to_switch {
            Attention::Distracted
        } else if attentive >= self.frames_attentive_to_switch {
            Attention::Attentive
        } else if attentive > distracted {
            Attention::Attentive
        } else {
            Attention::Distracted
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn attentive_count(&self) -> usize {
        self.history.count_true()
    }

    pub fn no_face_count(&self) -> u32 {
        self.no_face_count
    }

    /// Pick up new switch counts; the recorded history is kept
    pub fn apply_config(&mut self, config: &TrackerConfig) {
        self.history.set_capacity(config.history_len);
        self.frames_attentive_to_switch = config.frames_attentive_to_switch;
        self.frames_distracted_to_switch = config.frames_distracted_to_switch;
        self.no_face_push_every_n = config.no_face_push_every_n.max(1);
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.no_face_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> HysteresisEngine {
        HysteresisEngine::new(&TrackerConfig::default())
    }

    #[test]
    fn test_attentive_on_nth_true_frame() {
        let mut engine = engine();
        for _ in 0..3 {
            assert_eq!(engine.step(Some(true)), Attention::Distracted);
        }
        assert_eq!(engine.step(Some(true)), Attention::Attentive);
    }

    #[test]
    fn test_distraction_takes_precedence() {
        let config = TrackerConfig {
            history_len: 10,
            ..Default::default()
        };
        let mut engine = HysteresisEngine::new(&config);
        for _ in 0..5 {
            engine.step(Some(true));
        }

        for i in 1..=5 {
            let state = engine.step(Some(false));
            if i < 5 {
                assert_eq!(state, Attention::Attentive, "false #{i}");
            } else {
                // 5 true still exceeds the attentive count, but 5 false wins
                assert_eq!(state, Attention::Distracted);
            }
        }
        assert_eq!(engine.attentive_count(), 5);
    }

    #[test]
    fn test_no_face_dampening() {
        let mut engine = engine();
        engine.step(None);
        engine.step(None);
        assert_eq!(engine.history_len(), 0);

        engine.step(None);
        assert_eq!(engine.history_len(), 1);
        assert_eq!(engine.attentive_count(), 0);

        for _ in 0..3 {
            engine.step(None);
        }
        assert_eq!(engine.history_len(), 2);
    }

    #[test]
    fn test_face_resets_no_face_counter() {
        let mut engine = engine();
        engine.step(None);
        engine.step(None);
        engine.step(Some(true));
        assert_eq!(engine.no_face_count(), 0);

        engine.step(None);
        engine.step(None);
        // Only two consecutive misses since the face returned
        assert_eq!(engine.history_len(), 1);
    }

    #[test]
    fn test_majority_tie_break() {
        let config = TrackerConfig {
            history_len: 9,
            frames_attentive_to_switch: 6,
            frames_distracted_to_switch: 6,
            ..Default::default()
        };
        let mut engine = HysteresisEngine::new(&config);
        for v in [true, true, true, false, false, true] {
            engine.step(Some(v));
        }
        // 4 attentive vs 2 distracted, neither reaches 6
        assert_eq!(engine.stabilized(), Attention::Attentive);

        for _ in 0..2 {
            engine.step(Some(false));
        }
        // 4 vs 4
        assert_eq!(engine.stabilized(), Attention::Distracted);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut engine = engine();
        for _ in 0..20 {
            engine.step(Some(true));
        }
        assert_eq!(engine.history_len(), 9);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut engine = engine();
        for _ in 0..6 {
            engine.step(Some(true));
        }
        engine.step(None);
        engine.reset();
        assert_eq!(engine.history_len(), 0);
        assert_eq!(engine.no_face_count(), 0);
        assert_eq!(engine.stabilized(), Attention::Distracted);
    }
}

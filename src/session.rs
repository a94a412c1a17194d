//! Session state machine
//!
//! Drives the IDLE → ATTENTIVE ⇄ DISTRACTED automaton from the stabilized
//! attention signal and an injected clock, and keeps the session
//! accumulators, span log, transition log and time-series samples.
//!
//! The automaton itself is the pure [`transition`] function; [`SessionTracker`]
//! applies the effect it returns to the accumulators.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::round_to;
use crate::types::{Attention, SessionState, SpanEvent, TimeSeriesSample, TransitionEvent};

/// Session time between two time-series samples
pub const SAMPLE_INTERVAL_SECS: f64 = 10.0;

/// Spans at or below this length are not logged as attention spans
pub const MIN_SPAN_SECS: f64 = 1.0;

/// Distracted time credited per frame-loop iteration
pub const DEFAULT_TICK_SECS: f64 = 0.1;

/// Seconds from `start` to `end` with microsecond resolution
pub fn elapsed_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// Automaton state; the attentive phase carries the start of the running span
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Idle,
    Attentive { since: DateTime<Utc> },
    Distracted,
}

impl Phase {
    pub fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Attentive { .. } => SessionState::Attentive,
            Phase::Distracted => SessionState::Distracted,
        }
    }

    pub fn attention_start(&self) -> Option<DateTime<Utc>> {
        match self {
            Phase::Attentive { since } => Some(*since),
            _ => None,
        }
    }
}

/// Side effect of one automaton step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// First attentive frame: the session clock starts
    SessionStarted,
    /// An attentive span ended in distraction
    SpanEnded { span_sec: f64 },
    /// Still attentive; the live span grew
    SpanContinued { span_sec: f64 },
    /// Attention regained after a distraction
    AttentionRegained,
    /// Still distracted; one tick of distracted time
    DistractedTick,
}

/// Pure automaton step: `(phase, signal, now) -> (next phase, effect)`
pub fn transition(phase: Phase, signal: Attention, now: DateTime<Utc>) -> (Phase, Option<Effect>) {
    match (phase, signal) {
        (Phase::Idle, Attention::Attentive) => {
            (Phase::Attentive { since: now }, Some(Effect::SessionStarted))
        }
        (Phase::Idle, Attention::Distracted) => (Phase::Idle, None),
        (Phase::Attentive { since }, Attention::Distracted) => (
            Phase::Distracted,
            Some(Effect::SpanEnded {
                span_sec: elapsed_secs(since, now),
            }),
        ),
        (Phase::Attentive { since }, Attention::Attentive) => (
            Phase::Attentive { since },
            Some(Effect::SpanContinued {
                span_sec: elapsed_secs(since, now),
            }),
        ),
        (Phase::Distracted, Attention::Attentive) => {
            (Phase::Attentive { since: now }, Some(Effect::AttentionRegained))
        }
        (Phase::Distracted, Attention::Distracted) => {
            (Phase::Distracted, Some(Effect::DistractedTick))
        }
    }
}

/// Session accumulators and logs, cloned into snapshots for readers
///
/// The logs sit behind `Arc` so a clone shares them; the tracker copies a
/// log only when it appends while a snapshot still holds it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub session_id: Option<String>,
    pub phase: Phase,
    pub session_start: Option<DateTime<Utc>>,
    /// Live span while attentive, last logged span otherwise
    pub current_span_sec: f64,
    pub total_attentive_sec: f64,
    /// Fixed-increment distracted time (see [`DEFAULT_TICK_SECS`])
    pub total_distracted_sec: f64,
    pub distracted_count: u32,
    pub spans: Arc<Vec<SpanEvent>>,
    pub transitions: Arc<Vec<TransitionEvent>>,
    pub samples: Arc<Vec<TimeSeriesSample>>,
}

impl SessionLog {
    pub fn state(&self) -> SessionState {
        self.phase.state()
    }

    pub fn is_started(&self) -> bool {
        self.session_start.is_some()
    }

    /// Committed attentive time plus the live span, if any
    pub fn attentive_secs_at(&self, now: DateTime<Utc>) -> f64 {
        let live = self
            .phase
            .attention_start()
            .map(|since| elapsed_secs(since, now))
            .unwrap_or(0.0);
        self.total_attentive_sec + live
    }

    /// Seconds since the session started (0 before it starts)
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        self.session_start
            .map(|start| elapsed_secs(start, now))
            .unwrap_or(0.0)
    }
}

/// What happened during one tracker update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub state: SessionState,
    /// Span logged by this step (duration > 1 s)
    pub span: Option<SpanEvent>,
    pub transition: Option<TransitionEvent>,
    pub sample: Option<TimeSeriesSample>,
}

/// Applies automaton effects to the session log
#[derive(Debug, Clone)]
pub struct SessionTracker {
    log: SessionLog,
    last_sample: Option<DateTime<Utc>>,
    tick_sec: f64,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::with_tick(DEFAULT_TICK_SECS)
    }

    /// Tracker crediting `tick_sec` of distracted time per distracted frame
    pub fn with_tick(tick_sec: f64) -> Self {
        Self {
            log: SessionLog::default(),
            last_sample: None,
            tick_sec,
        }
    }

    /// Advance the automaton by one frame
    pub fn update(&mut self, signal: Attention, now: DateTime<Utc>) -> StepReport {
        let from = self.log.phase;
        let (next, effect) = transition(from, signal, now);
        self.log.phase = next;

        let mut report = StepReport {
            state: next.state(),
            ..Default::default()
        };

        match effect {
            Some(Effect::SessionStarted) => {
                let session_id = Uuid::new_v4().to_string();
                tracing::info!(%session_id, "attention session started");
                self.log.session_id = Some(session_id);
                self.log.session_start = Some(now);
                self.last_sample = Some(now);
                report.transition = Some(self.push_transition(from, next, now, None));
            }
            Some(Effect::SpanEnded { span_sec }) => {
                report.transition =
                    Some(self.push_transition(from, next, now, Some(round_to(span_sec, 2))));
                if span_sec > MIN_SPAN_SECS {
                    let span = SpanEvent {
                        timestamp: now,
                        duration_sec: span_sec,
                    };
                    self.log.current_span_sec = span_sec;
                    self.log.distracted_count += 1;
                    Arc::make_mut(&mut self.log.spans).push(span.clone());
                    report.span = Some(span);
                }
                self.log.total_attentive_sec += span_sec;
            }
            Some(Effect::SpanContinued { span_sec }) => {
                self.log.current_span_sec = span_sec;
            }
            Some(Effect::AttentionRegained) => {
                report.transition = Some(self.push_transition(from, next, now, None));
            }
            Some(Effect::DistractedTick) => {
                self.log.total_distracted_sec += self.tick_sec;
            }
            None => {}
        }

        report.sample = self.maybe_sample(now);
        report
    }

    fn push_transition(
        &mut self,
        from: Phase,
        to: Phase,
        now: DateTime<Utc>,
        span_sec: Option<f64>,
    ) -> TransitionEvent {
        tracing::debug!(from = %from.state(), to = %to.state(), ?span_sec, "state transition");
        let event = TransitionEvent {
            timestamp: now,
            from_state: from.state(),
            to_state: to.state(),
            span_sec,
        };
        Arc::make_mut(&mut self.log.transitions).push(event.clone());
        event
    }

    fn maybe_sample(&mut self, now: DateTime<Utc>) -> Option<TimeSeriesSample> {
        let last = self.last_sample?;
        if !self.log.is_started() || elapsed_secs(last, now) < SAMPLE_INTERVAL_SECS {
            return None;
        }

        let elapsed = self.log.elapsed_at(now);
        let attentive = self.log.attentive_secs_at(now);
        let distracted = elapsed - attentive;
        let focus_pct = if elapsed > 0.0 {
            attentive / elapsed * 100.0
        } else {
            0.0
        };

        let sample = TimeSeriesSample {
            elapsed_sec: round_to(elapsed, 1),
            attentive_sec: round_to(attentive, 1),
            distracted_sec: round_to(distracted, 1),
            focus_pct: round_to(focus_pct, 1),
        };
        Arc::make_mut(&mut self.log.samples).push(sample.clone());
        self.last_sample = Some(now);
        Some(sample)
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn state(&self) -> SessionState {
        self.log.state()
    }

    /// Tracking is active once the first attentive frame started the session
    pub fn is_started(&self) -> bool {
        self.log.is_started()
    }

    /// Back to IDLE with every accumulator and log cleared
    pub fn reset(&mut self) {
        self.log = SessionLog::default();
        self.last_sample = None;
    }
}

//! Session analytics
//!
//! Read-only views over a [`SessionLog`]: live stats, chart analytics and the
//! final session summary. Nothing here mutates session state.

use chrono::{DateTime, Utc};

use crate::session::SessionLog;
use crate::types::{Analytics, SessionSummary, SpanEvent, SpanRecord, Stats};

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Human-readable duration: `"1h 2m 3s"`, `"2m 30s"` or `"45s"`
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hrs = (seconds / 3600.0).floor() as u64;
    let mins = ((seconds % 3600.0) / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;

    if hrs > 0 {
        format!("{hrs}h {mins}m {secs}s")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// Span log record for one logged span
pub fn span_record(span: &SpanEvent) -> SpanRecord {
    SpanRecord {
        timestamp: span.timestamp.to_rfc3339(),
        attention_span_seconds: round_to(span.duration_sec, 2),
        duration_human_readable: format_duration(span.duration_sec),
    }
}

/// Logged span durations (2 decimals), oldest first
pub fn span_seconds(log: &SessionLog) -> Vec<f64> {
    log.spans
        .iter()
        .map(|s| round_to(s.duration_sec, 2))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

/// Current totals and percentage; zeroed before the session starts
pub fn stats(log: &SessionLog, now: DateTime<Utc>) -> Stats {
    if !log.is_started() {
        return Stats::default();
    }

    let total = log.elapsed_at(now);
    let attentive = log.attentive_secs_at(now);
    let distracted = total - attentive;

    Stats {
        total_time: format_duration(total),
        attentive_time: format_duration(attentive),
        distracted_time: format_duration(distracted),
        current_span: format_duration(log.current_span_sec),
        distracted_count: log.distracted_count,
        attention_percentage: round_to(percentage(attentive, total), 1),
    }
}

/// Stats plus span/streak metrics and the sample series
pub fn analytics(log: &SessionLog, now: DateTime<Utc>) -> Analytics {
    let spans_sec = span_seconds(log);
    let avg_span_sec = round_to(mean(&spans_sec), 1);
    let max_span_sec = round_to(max(&spans_sec), 1);
    let current_streak_sec = log
        .phase
        .attention_start()
        .map(|since| round_to(crate::session::elapsed_secs(since, now), 1))
        .unwrap_or(0.0);

    Analytics {
        stats: stats(log, now),
        avg_span_sec,
        max_span_sec,
        current_streak_sec,
        longest_streak_sec: max_span_sec,
        spans_sec,
        samples: log.samples.to_vec(),
        events_count: log.transitions.len(),
        accumulated_distracted_sec: round_to(log.total_distracted_sec, 1),
    }
}

/// Final summary of a session ending at `end`; `None` if it never started
pub fn session_summary(log: &SessionLog, end: DateTime<Utc>) -> Option<SessionSummary> {
    let start = log.session_start?;

    let duration = log.elapsed_at(end);
    let attentive = log.attentive_secs_at(end);
    let distracted = duration - attentive;
    let spans_sec = span_seconds(log);

    Some(SessionSummary {
        session_id: log.session_id.clone().unwrap_or_default(),
        session_start_iso: start.to_rfc3339(),
        session_end_iso: end.to_rfc3339(),
        duration_sec: round_to(duration, 1),
        attentive_sec: round_to(attentive, 1),
        distracted_sec: round_to(distracted, 1),
        focus_pct: round_to(percentage(attentive, duration), 1),
        distraction_count: log.distracted_count,
        avg_span_sec: round_to(mean(&spans_sec), 1),
        max_span_sec: round_to(max(&spans_sec), 1),
        spans_sec,
        samples: log.samples.to_vec(),
        events_count: log.transitions.len(),
    })
}

//! Attn CLI - Command-line interface for Attention Flux
//!
//! Commands:
//! - replay: Run recorded landmark frames through the engine (batch mode)
//! - config: Show or validate a tracker configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use attention_flux::{
    Analytics, AttentionEngine, CalibrationOutcome, LandmarkSet, NdjsonRecorder, SessionState,
    SessionSummary, TrackerConfig, TrackerError, FLUX_VERSION, PRODUCER_NAME,
};

/// Attn - On-device attention tracking from facial landmarks
#[derive(Parser)]
#[command(name = "attn")]
#[command(version = FLUX_VERSION)]
#[command(about = "Classify attention and track focus sessions from landmarks", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded frames through the engine
    Replay {
        /// Input NDJSON file, one frame per line (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Tracker configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Append attention spans to this file
        #[arg(long)]
        span_log: Option<PathBuf>,

        /// Append the session summary to this file
        #[arg(long)]
        sessions: Option<PathBuf>,

        /// Start a calibration window at this many seconds into the replay
        #[arg(long)]
        calibrate_at: Option<f64>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect tracker configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check this configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Configuration file (defaults apply when absent)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check a configuration file
    Validate {
        /// Configuration file
        #[arg(long)]
        config: PathBuf,
    },
}

/// One recorded frame: `{"frame": n, "t": seconds, "landmarks": [[x, y], ...] | null}`
#[derive(Debug, Deserialize)]
struct ReplayFrame {
    #[serde(default)]
    frame: u64,
    t: f64,
    #[serde(default)]
    landmarks: Option<LandmarkSet>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "attention_flux=debug" } else { "attention_flux=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), AttnCliError> {
    match cli.command {
        Commands::Replay {
            input,
            config,
            span_log,
            sessions,
            calibrate_at,
            json,
        } => cmd_replay(
            &input,
            config.as_deref(),
            span_log,
            sessions,
            calibrate_at,
            json,
        ),

        Commands::Config { command } => match command {
            ConfigCommands::Show { config } => cmd_config_show(config.as_deref()),
            ConfigCommands::Validate { config } => cmd_config_validate(&config),
        },

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> TrackerConfig {
    path.map(TrackerConfig::load).unwrap_or_default()
}

fn open_input(input: &Path) -> Result<Box<dyn BufRead>, AttnCliError> {
    if input.to_string_lossy() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(input)?)))
    }
}

fn cmd_replay(
    input: &Path,
    config_path: Option<&Path>,
    span_log: Option<PathBuf>,
    sessions: Option<PathBuf>,
    calibrate_at: Option<f64>,
    json: bool,
) -> Result<(), AttnCliError> {
    let config = load_config(config_path);

    let mut recorder = NdjsonRecorder::new();
    if let Some(path) = span_log {
        recorder = recorder.with_span_log(path);
    }
    if let Some(path) = sessions {
        recorder = recorder.with_sessions_log(path);
    }
    if let Some(path) = config_path {
        recorder = recorder.with_config_path(path);
    }

    let mut engine = AttentionEngine::with_recorder(config, Box::new(recorder));
    let base = Utc::now();
    let mut pending_calibration = calibrate_at;
    let mut report = ReplayReport::default();
    let mut last_state = SessionState::Idle;
    let mut end = base;

    for (line_no, line) in open_input(input)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let frame: ReplayFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "skipping malformed frame");
                report.skipped += 1;
                continue;
            }
        };

        let now = base + Duration::milliseconds((frame.t * 1000.0).round() as i64);
        end = now;

        let outcome = engine.process_frame(frame.landmarks.as_ref(), now);
        report.frames += 1;

        if pending_calibration.is_some_and(|at| frame.t >= at) {
            pending_calibration = None;
            engine.start_calibration(now)?;
        }

        if outcome.state != last_state {
            tracing::debug!(
                frame = frame.frame,
                t = frame.t,
                state = %outcome.state,
                "state changed"
            );
            last_state = outcome.state;
        }
        if outcome.span.is_some() {
            report.spans += 1;
        }
        if let Some(calibration) = outcome.calibration {
            report.calibration = Some(calibration);
        }
    }

    if report.frames == 0 {
        return Err(AttnCliError::NoFrames);
    }

    report.final_state = engine.state();
    report.summary = engine.stop(end);
    report.analytics = engine.analytics(end);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &ReplayReport) {
    let stats = &report.analytics.stats;
    println!("Attention Replay Report");
    println!("=======================");
    println!("Frames:       {} ({} skipped)", report.frames, report.skipped);
    println!("Final state:  {}", report.final_state);
    println!("Total time:   {}", stats.total_time);
    println!("Attentive:    {}", stats.attentive_time);
    println!("Distracted:   {}", stats.distracted_time);
    println!("Focus:        {:.1}%", stats.attention_percentage);
    println!("Distractions: {}", stats.distracted_count);
    println!(
        "Spans:        {} (avg {:.1}s, max {:.1}s)",
        report.spans, report.analytics.avg_span_sec, report.analytics.max_span_sec
    );

    match &report.calibration {
        Some(CalibrationOutcome::Calibrated { samples, .. }) => {
            println!("Calibration:  complete ({samples} samples)");
        }
        Some(CalibrationOutcome::InsufficientSamples { collected }) => {
            println!("Calibration:  aborted ({collected} samples collected)");
        }
        None => {}
    }
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<(), AttnCliError> {
    let config = load_config(config_path);
    println!("{}", config.to_json()?);
    Ok(())
}

fn cmd_config_validate(config_path: &Path) -> Result<(), AttnCliError> {
    let content = fs::read_to_string(config_path)?;
    let config = TrackerConfig::from_json(&content)?;
    println!(
        "Configuration valid ({})",
        if config.calibrated { "calibrated" } else { "defaults" }
    );
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), AttnCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "flux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Attention Flux version {}", FLUX_VERSION),
    });

    if let Some(path) = config_path {
        let check = if !path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist; defaults will be used".to_string(),
            }
        } else {
            match fs::read_to_string(path)
                .map_err(TrackerError::from)
                .and_then(|content| TrackerConfig::from_json(&content))
            {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: if config.calibrated {
                        "Config file valid (calibrated)".to_string()
                    } else {
                        "Config file valid (not calibrated)".to_string()
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid config file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    // Replay reads from stdin when --input is -
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay from stdin ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Attn Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(AttnCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error handling

#[derive(Debug)]
enum AttnCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    NoFrames,
    DoctorFailed,
}

impl From<io::Error> for AttnCliError {
    fn from(e: io::Error) -> Self {
        AttnCliError::Io(e)
    }
}

impl From<TrackerError> for AttnCliError {
    fn from(e: TrackerError) -> Self {
        AttnCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for AttnCliError {
    fn from(e: serde_json::Error) -> Self {
        AttnCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AttnCliError> for CliError {
    fn from(e: AttnCliError) -> Self {
        match e {
            AttnCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            AttnCliError::Tracker(e @ TrackerError::InvalidConfig(_)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: e.to_string(),
                hint: Some("Run 'attn config show' to see the expected keys".to_string()),
            },
            AttnCliError::Tracker(e) => CliError {
                code: "TRACKER_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            AttnCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            AttnCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some(
                    r#"Each line must look like {"frame": 0, "t": 0.0, "landmarks": [[x, y]]}"#
                        .to_string(),
                ),
            },
            AttnCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Default, Serialize)]
struct ReplayReport {
    frames: usize,
    skipped: usize,
    spans: usize,
    final_state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    calibration: Option<CalibrationOutcome>,
    summary: Option<SessionSummary>,
    analytics: Analytics,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

//! Affect CLI - Command-line interface for Synheart Affect
//!
//! Commands:
//! - run: Replay NDJSON input events from stdin through the pipeline
//! - sessions: List stored sessions
//! - trajectory: Print the stored trajectory of one session
//! - purge: Delete all stored data
//! - doctor: Diagnose configuration and storage

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use synheart_affect::store::{SessionRepository, SqliteSessionStore};
use synheart_affect::{
    AffectConfig, AffectError, AffectProcessor, InputEvent, PipelineState, StoreError, TaskType,
    AFFECT_VERSION, PRODUCER_NAME,
};

/// Affect - On-device affect inference from interaction telemetry
#[derive(Parser)]
#[command(name = "affect")]
#[command(author = "Synheart AI Inc")]
#[command(version = AFFECT_VERSION)]
#[command(about = "Infer arousal, valence and control from interaction events", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay NDJSON input events from stdin, ticking on event time
    Run {
        /// Session database; sessions are not persisted without one
        #[arg(long)]
        db: Option<PathBuf>,

        /// Task the user is performing
        #[arg(long, default_value = "chat")]
        task: TaskType,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Tick interval in milliseconds of event time
        #[arg(long, default_value = "100")]
        tick_ms: u32,

        /// Seed the session baseline from a file
        #[arg(long)]
        load_baselines: Option<PathBuf>,

        /// Save the final baseline to a file
        #[arg(long)]
        save_baselines: Option<PathBuf>,

        /// Flush output after each tick
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// List stored sessions
    Sessions {
        #[arg(long)]
        db: PathBuf,

        /// Only sessions starting at or after this time (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Only sessions starting at or before this time (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Output full sessions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the stored trajectory of one session
    Trajectory {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        session: String,

        /// Output as NDJSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all sessions, baselines and trajectories
    Purge {
        #[arg(long)]
        db: PathBuf,

        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },

    /// Diagnose configuration and storage
    Doctor {
        /// Session database to check (defaults to the configured one)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One JSON pipeline state per line
    Ndjson,
    /// Plain-text context blocks
    Context,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AffectCliError> {
    let config = load_config(cli.config.as_deref());
    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&log_level);

    match cli.command {
        Commands::Run {
            db,
            task,
            output_format,
            tick_ms,
            load_baselines,
            save_baselines,
            flush,
        } => cmd_run(
            config?,
            db,
            task,
            output_format,
            tick_ms,
            load_baselines.as_deref(),
            save_baselines.as_deref(),
            flush,
        ),

        Commands::Sessions { db, from, to, json } => cmd_sessions(&db, from, to, json),

        Commands::Trajectory { db, session, json } => cmd_trajectory(&db, &session, json),

        Commands::Purge { db, yes } => cmd_purge(&db, yes),

        Commands::Doctor { db, json } => cmd_doctor(cli.config.as_deref(), config, db, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<AffectConfig, AffectError> {
    let config = match path {
        Some(path) => AffectConfig::from_file(path)?,
        None => AffectConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    mut config: AffectConfig,
    db: Option<PathBuf>,
    task: TaskType,
    output_format: OutputFormat,
    tick_ms: u32,
    load_baselines: Option<&Path>,
    save_baselines: Option<&Path>,
    flush: bool,
) -> Result<(), AffectCliError> {
    if let Some(db) = db {
        config.storage.db_path = Some(db);
    }
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let mut processor = if config.storage.db_path.is_some() {
        AffectProcessor::with_persistence(config)?
    } else {
        AffectProcessor::new(config)
    };

    let interval = Duration::milliseconds(i64::from(tick_ms.max(1)));
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut next_tick: Option<DateTime<Utc>> = None;
    let mut ticks = 0usize;

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let event: InputEvent = serde_json::from_str(trimmed).map_err(|e| {
            AffectCliError::ParseError(format!("Failed to parse event on line {}: {}", index + 1, e))
        })?;
        let ts = event.timestamp();

        let mut due = match next_tick {
            Some(due) => due,
            None => {
                processor.start_session(ts, task);
                if let Some(path) = load_baselines {
                    processor.load_baselines(&fs::read_to_string(path)?)?;
                }
                ts + interval
            }
        };

        while ts >= due {
            let state = processor.tick(due, None, None);
            emit(&processor, &state, &output_format, &mut stdout)?;
            if flush {
                stdout.flush()?;
            }
            ticks += 1;
            due += interval;
        }
        next_tick = Some(due);

        processor.ingest(&event)?;
    }

    let end = next_tick.ok_or(AffectCliError::NoEvents)?;
    let state = processor.tick(end, None, None);
    emit(&processor, &state, &output_format, &mut stdout)?;
    stdout.flush()?;
    ticks += 1;

    if let Some(path) = save_baselines {
        fs::write(path, processor.save_baselines()?)?;
    }

    let session = processor.end_session(end)?;
    info!(
        session_id = %session.id,
        ticks,
        emotional_balance = session.metrics.emotional_balance,
        stress = session.metrics.stress_indicator,
        "run complete"
    );
    processor.shutdown(end);
    Ok(())
}

fn emit(
    processor: &AffectProcessor,
    state: &PipelineState,
    format: &OutputFormat,
    out: &mut impl Write,
) -> Result<(), AffectCliError> {
    match format {
        OutputFormat::Ndjson => writeln!(out, "{}", processor.encode_state(state)?)?,
        OutputFormat::Context => writeln!(out, "{}\n", processor.encoder().format(state))?,
    }
    Ok(())
}

fn cmd_sessions(
    db: &Path,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    json: bool,
) -> Result<(), AffectCliError> {
    let store = SqliteSessionStore::open(db)?;
    let sessions = if from.is_none() && to.is_none() {
        store.get_sessions()?
    } else {
        store.get_sessions_in_range(
            from.unwrap_or(DateTime::<Utc>::MIN_UTC),
            to.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    println!("Sessions ({})", sessions.len());
    println!("========");
    for session in &sessions {
        println!(
            "{}  {}  {:>6.1}s  {:>5} samples  balance {:.2}  stability {:.2}  stress {:.2}  engagement {:.2}",
            session.id,
            session.start_time.to_rfc3339(),
            session.duration_ms() as f64 / 1000.0,
            session.behavioral_samples.len(),
            session.metrics.emotional_balance,
            session.metrics.mood_stability,
            session.metrics.stress_indicator,
            session.metrics.engagement_level,
        );
    }
    Ok(())
}

fn cmd_trajectory(db: &Path, session: &str, json: bool) -> Result<(), AffectCliError> {
    let store = SqliteSessionStore::open(db)?;
    let points = store.get_trajectory_by_session(session)?;
    if points.is_empty() {
        return Err(AffectCliError::Store(StoreError::NotFound(format!(
            "no trajectory for session {session}"
        ))));
    }

    let mut stdout = io::stdout();
    for point in &points {
        if json {
            writeln!(stdout, "{}", serde_json::to_string(point)?)?;
        } else {
            writeln!(
                stdout,
                "{}  arousal {:.2}  valence {:+.2}  control {:.2}  uncertainty {}",
                point.timestamp.to_rfc3339(),
                point.arousal,
                point.valence,
                point.control,
                point.uncertainty.as_str(),
            )?;
        }
    }
    Ok(())
}

fn cmd_purge(db: &Path, yes: bool) -> Result<(), AffectCliError> {
    if !yes {
        return Err(AffectCliError::PurgeNotConfirmed);
    }
    let mut store = SqliteSessionStore::open(db)?;
    let (sessions, baselines, points) = store.counts()?;
    store.purge_all_data()?;
    info!(sessions, baselines, points, "purged session store");
    println!("Purged {sessions} sessions, {baselines} baselines, {points} trajectory points");
    Ok(())
}

fn cmd_doctor(
    config_path: Option<&Path>,
    config: Result<AffectConfig, AffectError>,
    db: Option<PathBuf>,
    json: bool,
) -> Result<(), AffectCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "affect_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Affect version {}", AFFECT_VERSION),
    });

    let config = match config {
        Ok(config) => {
            let source = config_path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string());
            let warnings = config.validate();
            if warnings.is_empty() {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Configuration valid ({})", source),
                });
            }
            for warning in warnings {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Warning,
                    message: warning,
                });
            }
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load configuration: {}", e),
            });
            None
        }
    };

    let db_path = db.or_else(|| config.and_then(|c| c.storage.db_path));
    match db_path {
        Some(path) => match SqliteSessionStore::open(&path).and_then(|store| store.counts()) {
            Ok((sessions, baselines, points)) => checks.push(DoctorCheck {
                name: "database".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{}: {} sessions, {} baselines, {} trajectory points",
                    path.display(),
                    sessions,
                    baselines,
                    points
                ),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "database".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot open {}: {}", path.display(), e),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "database".to_string(),
            status: CheckStatus::Warning,
            message: "No database configured; sessions are kept in memory only".to_string(),
        }),
    }

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
            message: "stdin is a pipe (ready for `affect run`)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: AFFECT_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Affect Doctor Report");
        println!("====================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(AffectCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum AffectCliError {
    Io(io::Error),
    Affect(AffectError),
    Store(StoreError),
    Json(serde_json::Error),
    NoEvents,
    PurgeNotConfirmed,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for AffectCliError {
    fn from(e: io::Error) -> Self {
        AffectCliError::Io(e)
    }
}

impl From<AffectError> for AffectCliError {
    fn from(e: AffectError) -> Self {
        AffectCliError::Affect(e)
    }
}

impl From<StoreError> for AffectCliError {
    fn from(e: StoreError) -> Self {
        AffectCliError::Store(e)
    }
}

impl From<serde_json::Error> for AffectCliError {
    fn from(e: serde_json::Error) -> Self {
        AffectCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AffectCliError> for CliError {
    fn from(e: AffectCliError) -> Self {
        match e {
            AffectCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            AffectCliError::Affect(AffectError::InvalidEvent(msg)) => CliError {
                code: "INVALID_EVENT".to_string(),
                message: msg,
                hint: Some("Coordinates and scroll deltas must be finite numbers".to_string()),
            },
            AffectCliError::Affect(AffectError::ConfigError(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'affect doctor --config <file>' for details".to_string()),
            },
            AffectCliError::Affect(e) => CliError {
                code: "AFFECT_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            AffectCliError::Store(e) => CliError {
                code: "STORAGE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the --db path; run 'affect doctor --db <path>'".to_string()),
            },
            AffectCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            AffectCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Pipe NDJSON input events into 'affect run'".to_string()),
            },
            AffectCliError::PurgeNotConfirmed => CliError {
                code: "PURGE_NOT_CONFIRMED".to_string(),
                message: "Purge deletes every stored session".to_string(),
                hint: Some("Re-run with --yes to confirm".to_string()),
            },
            AffectCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            AffectCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be one input event with an event_type".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

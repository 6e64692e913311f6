//! Habit CLI - Command-line interface for Habit Flux
//!
//! Commands:
//! - score: Score a single day
//! - summary: Summarize a program of days (batch mode)
//! - recommend: Recommend next targets from a history document
//! - run: Ingest day records from stdin, emitting scores and targets (streaming mode)
//! - doctor: Check configuration health

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use habit_flux::config::{load_policy, load_rubric, ConfigPaths, HabitConfig};
use habit_flux::encoder::{Report, ReportKind};
use habit_flux::pipeline::HabitProcessor;
use habit_flux::types::{AdaptationHistory, DayRecord};
use habit_flux::{ScoringError, HABIT_FLUX_VERSION, PRODUCER_NAME};

/// Habit - Rubric-based habit scoring with adaptive difficulty targets
#[derive(Parser)]
#[command(name = "habit")]
#[command(version = HABIT_FLUX_VERSION)]
#[command(about = "Score daily habits and recommend next targets", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single day record
    Score {
        /// Rubric file (defaults to $HABIT_SCORING_CONFIG or config/scoring.yaml)
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Date to stamp on the report (overrides the record's date)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Summarize a sequence of day records (batch mode)
    Summary {
        /// Rubric file (defaults to $HABIT_SCORING_CONFIG or config/scoring.yaml)
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Recommend next targets from an adaptation history document
    Recommend {
        /// Rubric file (defaults to $HABIT_SCORING_CONFIG or config/scoring.yaml)
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Adaptation policy file (defaults to $HABIT_ADAPTATION_CONFIG or config/adaptation.yaml)
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Ingest NDJSON day records from stdin (streaming mode)
    Run {
        /// Rubric file (defaults to $HABIT_SCORING_CONFIG or config/scoring.yaml)
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Adaptation policy file (defaults to $HABIT_ADAPTATION_CONFIG or config/adaptation.yaml)
        #[arg(long)]
        policy: Option<PathBuf>,

        /// History window in days
        #[arg(long, default_value = "14")]
        history_window: usize,

        /// Load history from file
        #[arg(long)]
        load_history: Option<PathBuf>,

        /// Save history to file on exit
        #[arg(long)]
        save_history: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Diagnose configuration health
    Doctor {
        /// Rubric file (defaults to $HABIT_SCORING_CONFIG or config/scoring.yaml)
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Adaptation policy file (defaults to $HABIT_ADAPTATION_CONFIG or config/adaptation.yaml)
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Check a history file
        #[arg(long)]
        history: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one day record per line)
    Ndjson,
    /// JSON array of day records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
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
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), HabitCliError> {
    match cli.command {
        Commands::Score {
            rubric,
            input,
            date,
            output,
            output_format,
        } => cmd_score(rubric, &input, date, &output, output_format),

        Commands::Summary {
            rubric,
            input,
            input_format,
            output,
            output_format,
        } => cmd_summary(rubric, &input, input_format, &output, output_format),

        Commands::Recommend {
            rubric,
            policy,
            input,
            output,
            output_format,
        } => cmd_recommend(rubric, policy, &input, &output, output_format),

        Commands::Run {
            rubric,
            policy,
            history_window,
            load_history,
            save_history,
            output_format,
            flush,
        } => cmd_run(
            ConfigPaths::from_env(rubric, policy),
            history_window,
            load_history.as_deref(),
            save_history.as_deref(),
            output_format,
            flush,
        ),

        Commands::Doctor {
            rubric,
            policy,
            history,
            json,
        } => cmd_doctor(
            ConfigPaths::from_env(rubric, policy),
            history.as_deref(),
            json,
        ),
    }
}

fn cmd_score(
    rubric: Option<PathBuf>,
    input: &Path,
    date: Option<NaiveDate>,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), HabitCliError> {
    let paths = ConfigPaths::from_env(rubric, None);
    let rubric = load_rubric(&paths.scoring)?;
    let processor = HabitProcessor::new(rubric, Default::default())?;

    let day: DayRecord = serde_json::from_str(&read_input(input)?)?;
    let score = processor.score_day(&day.entries, day.bad_event)?;

    let report = processor
        .encoder()
        .encode(ReportKind::DailyScore, date.or(day.date), score);
    write_output(output, &format_output(&[report], &output_format)?)
}

fn cmd_summary(
    rubric: Option<PathBuf>,
    input: &Path,
    input_format: InputFormat,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), HabitCliError> {
    let paths = ConfigPaths::from_env(rubric, None);
    let rubric = load_rubric(&paths.scoring)?;
    let processor = HabitProcessor::new(rubric, Default::default())?;

    let input_data = read_input(input)?;
    let days = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => serde_json::from_str(&input_data)?,
    };

    if days.is_empty() {
        warn!("no day records in input, summary will be empty");
    }

    let summary = processor.summarize(&days)?;
    let report = processor
        .encoder()
        .encode(ReportKind::ProgramSummary, None, summary);
    write_output(output, &format_output(&[report], &output_format)?)
}

fn cmd_recommend(
    rubric: Option<PathBuf>,
    policy: Option<PathBuf>,
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), HabitCliError> {
    let config = HabitConfig::load(&ConfigPaths::from_env(rubric, policy))?;
    let processor = HabitProcessor::from_config(config)?;

    let history: AdaptationHistory = serde_json::from_str(&read_input(input)?)?;
    let plan = processor.recommend(&history)?;

    let report = processor
        .encoder()
        .encode(ReportKind::Recommendations, None, plan);
    write_output(output, &format_output(&[report], &output_format)?)
}

fn cmd_run(
    paths: ConfigPaths,
    history_window: usize,
    load_history: Option<&Path>,
    save_history: Option<&Path>,
    output_format: OutputFormat,
    flush: bool,
) -> Result<(), HabitCliError> {
    let config = HabitConfig::load(&paths)?;
    let mut processor =
        HabitProcessor::with_history_window(config.rubric, config.policy, history_window)?;

    // Load existing history if provided
    if let Some(history_path) = load_history {
        let history_json = fs::read_to_string(history_path)?;
        processor.load_history(&history_json)?;
        info!(days = processor.history().len(), "loaded history");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let day: DayRecord = serde_json::from_str(trimmed).map_err(|e| {
            HabitCliError::ParseError(format!("Failed to parse day record on line {}: {}", index + 1, e))
        })?;

        let result = processor.ingest_day(&day)?;
        let report = processor
            .encoder()
            .encode(ReportKind::DayResult, day.date, result);

        write!(stdout, "{}", format_output(&[report], &output_format)?)?;
        if flush {
            stdout.flush()?;
        }
    }
    stdout.flush()?;

    // Save history if requested
    if let Some(history_path) = save_history {
        fs::write(history_path, processor.save_history()?)?;
    }

    Ok(())
}

fn cmd_doctor(
    paths: ConfigPaths,
    history: Option<&Path>,
    json: bool,
) -> Result<(), HabitCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} {}", PRODUCER_NAME, HABIT_FLUX_VERSION),
    });

    let rubric = match load_rubric(&paths.scoring) {
        Ok(rubric) => {
            checks.push(DoctorCheck {
                name: "rubric".to_string(),
                status: if rubric.activities.is_empty() {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Ok
                },
                message: format!(
                    "{} valid ({} activities)",
                    paths.scoring.display(),
                    rubric.activities.len()
                ),
            });
            Some(rubric)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "rubric".to_string(),
                status: CheckStatus::Error,
                message: format!("{}: {}", paths.scoring.display(), e),
            });
            None
        }
    };

    if let Some(rubric) = &rubric {
        let status_missing = !paths.adaptation.exists();
        match load_policy(&paths.adaptation, rubric) {
            Ok(policy) => checks.push(DoctorCheck {
                name: "policy".to_string(),
                status: if status_missing {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Ok
                },
                message: if status_missing {
                    format!("{} not found, using defaults", paths.adaptation.display())
                } else {
                    format!(
                        "{} valid (short window {} days)",
                        paths.adaptation.display(),
                        policy.adaptation.windows.short_days
                    )
                },
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "policy".to_string(),
                status: CheckStatus::Error,
                message: format!("{}: {}", paths.adaptation.display(), e),
            }),
        }
    }

    // Check history file if provided
    if let Some(history_path) = history {
        let check = match fs::read_to_string(history_path) {
            Ok(content) => match habit_flux::HistoryWindow::from_json(&content) {
                Ok(window) => DoctorCheck {
                    name: "history".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "History file valid ({} of {} days)",
                        window.len(),
                        window.window_size()
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "history".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid history JSON: {}", e),
                },
            },
            Err(e) => DoctorCheck {
                name: "history".to_string(),
                status: CheckStatus::Warning,
                message: format!("Cannot read history file: {}", e),
            },
        };
        checks.push(check);
    }

    // Check stdin is available (for streaming mode)
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdin) {
            "stdin is a TTY (interactive mode)".to_string()
        } else {
            "stdin is a pipe (streaming mode ready)".to_string()
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: HABIT_FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Habit Doctor Report");
        println!("===================");
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
        Err(HabitCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, HabitCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("reading input from terminal, end with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), HabitCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
        io::stdout().flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn parse_ndjson(input: &str) -> Result<Vec<DayRecord>, HabitCliError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line.trim()).map_err(|e| {
                HabitCliError::ParseError(format!(
                    "Failed to parse day record on line {}: {}",
                    index + 1,
                    e
                ))
            })
        })
        .collect()
}

fn format_output<T: Serialize>(
    reports: &[Report<T>],
    format: &OutputFormat,
) -> Result<String, HabitCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for report in reports {
                lines.push(serde_json::to_string(report)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(reports)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(reports)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum HabitCliError {
    Io(io::Error),
    Scoring(ScoringError),
    Json(serde_json::Error),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for HabitCliError {
    fn from(e: io::Error) -> Self {
        HabitCliError::Io(e)
    }
}

impl From<ScoringError> for HabitCliError {
    fn from(e: ScoringError) -> Self {
        HabitCliError::Scoring(e)
    }
}

impl From<serde_json::Error> for HabitCliError {
    fn from(e: serde_json::Error) -> Self {
        HabitCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HabitCliError> for CliError {
    fn from(e: HabitCliError) -> Self {
        match e {
            HabitCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HabitCliError::Scoring(e) => {
                let hint = match &e {
                    ScoringError::UnknownActivity(_) => "Check activity names against the rubric",
                    ScoringError::Configuration(_) | ScoringError::Yaml(_) => {
                        "Run 'habit doctor' to check configuration"
                    }
                    ScoringError::LengthMismatch { .. } => {
                        "Supply one bad-event flag per day record"
                    }
                    ScoringError::Json(_) => "Check JSON syntax",
                    ScoringError::Io(_) => "Check file paths and permissions",
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            HabitCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HabitCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            HabitCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

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

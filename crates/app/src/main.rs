use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use collect_core::model::{NavigationState, PersonalityCode};
use services::{
    CollectionError, CollectionFlow, FlowServices, FlowStep, HttpArchivalService,
    HttpConversationService, LocalExport, RemoteConfig,
};
use storage::{ProgressStore, Storage};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- [--db <sqlite_url>] [--participant <name>] [--code <code>] \
         [--out-dir <dir>] [--resume] [--reset]"
    );
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_FILE} (a path or a sqlite: URL; created if missing)");
    eprintln!("  --out-dir .");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COLLECT_DB_URL, COLLECT_API_BASE_URL, COLLECT_API_TOKEN, COLLECT_HTTP_TIMEOUT_SECS");
}

fn print_commands() {
    println!("Type an answer, or an option number when choices are listed.");
    println!("  :back     previous question of this phase");
    println!("  :forward  return to a question answered before going back");
    println!("  :export   write everything collected so far to a CSV file");
    println!("  :retry    open the current phase again after a connection failure");
    println!("  :pause    save progress and exit (continue later with --resume)");
    println!("  :quit     same as :pause");
}

struct Args {
    db_url: String,
    participant: Option<String>,
    code: Option<String>,
    out_dir: PathBuf,
    resume: bool,
    reset: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("COLLECT_DB_URL")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map_or_else(|| database_url(DEFAULT_DB_FILE), |value| database_url(&value)),
            participant: None,
            code: None,
            out_dir: PathBuf::from("."),
            resume: false,
            reset: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = database_url(&value);
                }
                "--participant" => parsed.participant = Some(require_value(args, "--participant")?),
                "--code" => parsed.code = Some(require_value(args, "--code")?),
                "--out-dir" => parsed.out_dir = PathBuf::from(require_value(args, "--out-dir")?),
                "--resume" => parsed.resume = true,
                "--reset" => parsed.reset = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

const DEFAULT_DB_FILE: &str = "collect.sqlite3";

/// Accept either a `sqlite:` URL or a bare database file path.
fn database_url(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("sqlite:") {
        value.to_owned()
    } else {
        format!("sqlite://{value}")
    }
}

fn write_export(out_dir: &Path, export: &LocalExport) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(&export.file_name);
    std::fs::write(&path, &export.csv)?;
    Ok(path)
}

type Input = Lines<BufReader<Stdin>>;

async fn prompt(input: &mut Input, label: &str) -> std::io::Result<Option<String>> {
    println!("{label}");
    input.next_line().await
}

fn show(flow: &CollectionFlow, state: &NavigationState) {
    if let Some(info) = flow.progress_info() {
        println!();
        println!(
            "[phase {}/{} · {} · cycle {} · question {}/{} · {:.0}%]",
            info.phase,
            info.total_phases,
            info.element_type,
            info.cycle,
            info.question_in_phase,
            info.questions_per_phase,
            info.percentage
        );
    }
    println!("{}", state.question());
    for (index, option) in state.options().iter().enumerate() {
        println!("  {}. {option}", index + 1);
    }
}

/// Map a typed line to the answer text: option numbers pick the listed choice.
fn resolve_answer(state: Option<&NavigationState>, line: &str) -> String {
    let trimmed = line.trim();
    trimmed
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| state?.options().get(index))
        .cloned()
        .unwrap_or_else(|| trimmed.to_owned())
}

fn report_closed_phase(flow: &CollectionFlow, err: &dyn std::error::Error) {
    let phase = flow.progress().map_or(1, |progress| progress.current_phase);
    println!("Phase {phase} could not be opened: {err}");
}

async fn start(
    flow: &mut CollectionFlow,
    args: &Args,
    input: &mut Input,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.resume {
        match flow.resume().await {
            Ok(true) => {
                println!("Resuming saved progress.");
                return Ok(());
            }
            Ok(false) => println!("No saved progress found; starting a new collection."),
            Err(CollectionError::Sync(err)) => {
                report_closed_phase(flow, &err);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }

    let participant = match &args.participant {
        Some(name) => name.clone(),
        None => prompt(input, "Participant name (leave empty for anonymous):")
            .await?
            .unwrap_or_default(),
    };
    let code = match &args.code {
        Some(code) => Some(code.clone()),
        None => prompt(input, "Personality code, e.g. INTJ (optional):").await?,
    }
    .map(PersonalityCode::new)
    .filter(|code| !code.as_str().is_empty());

    match flow.begin(&participant, code).await {
        Ok(_) => Ok(()),
        Err(CollectionError::Sync(err)) => {
            report_closed_phase(flow, &err);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn finish(
    flow: &CollectionFlow,
    uploaded: bool,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if uploaded {
        println!("All phases complete. Data uploaded, thank you!");
        return Ok(());
    }
    let path = write_export(out_dir, &flow.export_local()?)?;
    println!(
        "All phases complete, but the upload failed. Data saved to {} (run with --resume to retry).",
        path.display()
    );
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let config = RemoteConfig::from_env();
    info!(base_url = %config.base_url, db = %args.db_url, "starting data collection");
    let mut flow = CollectionFlow::new(FlowServices {
        conversation: Arc::new(HttpConversationService::new(config.clone())?),
        archive: Arc::new(HttpArchivalService::new(config)?),
        store: ProgressStore::new(Arc::clone(&storage.slots)),
    });

    if args.reset {
        flow.reset().await?;
        println!("Saved progress cleared.");
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    start(&mut flow, &args, &mut input).await?;

    if flow.is_finished() {
        let uploaded = flow.upload_all().await;
        return finish(&flow, uploaded, &args.out_dir);
    }

    print_commands();
    loop {
        let state = flow.current().cloned();
        match &state {
            Some(state) => show(&flow, state),
            None => println!("No phase is open. Type :retry to open it, or :pause to exit."),
        }

        let Some(line) = input.next_line().await? else {
            // stdin closed
            flow.pause().await?;
            return Ok(());
        };

        match line.trim() {
            ":back" => match flow.back().await {
                Ok(None) => println!("Already at the first question of this phase."),
                Ok(Some(_)) => {}
                Err(err) => warn!(error = %err, "could not go back"),
            },
            ":forward" => match flow.forward().await {
                Ok(None) => println!("Nothing to go forward to."),
                Ok(Some(_)) => {}
                Err(err) => warn!(error = %err, "could not go forward"),
            },
            ":retry" => match flow.retry_phase().await {
                Ok(_) => {}
                Err(CollectionError::Sync(err)) => report_closed_phase(&flow, &err),
                Err(err) => return Err(err.into()),
            },
            ":export" => {
                let path = write_export(&args.out_dir, &flow.export_local()?)?;
                println!("Exported to {}", path.display());
            }
            ":pause" | ":quit" => {
                flow.pause().await?;
                println!("Progress saved. Continue later with --resume.");
                return Ok(());
            }
            ":help" => print_commands(),
            _ => match flow.answer(&resolve_answer(state.as_ref(), &line)).await {
                Ok(FlowStep::Asked) => {}
                Ok(FlowStep::PhaseStarted { phase }) => {
                    println!("Phase complete. Moving on to phase {phase}.");
                }
                Ok(FlowStep::PhasePending { phase }) => {
                    println!("Phase complete and saved, but phase {phase} could not be opened yet.");
                }
                Ok(FlowStep::Finished { uploaded }) => {
                    return finish(&flow, uploaded, &args.out_dir);
                }
                Err(CollectionError::Sync(err)) => {
                    println!("Answer not accepted: {err}");
                }
                Err(err @ CollectionError::PhaseNotOpen { .. }) => println!("{err}"),
                Err(err) => return Err(err.into()),
            },
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn flags_are_parsed() {
        let args = parse(&[
            "--db",
            "sqlite::memory:",
            "--participant",
            "Mio",
            "--code",
            "INTJ",
            "--out-dir",
            "exports",
            "--resume",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite::memory:");
        assert_eq!(args.participant.as_deref(), Some("Mio"));
        assert_eq!(args.code.as_deref(), Some("INTJ"));
        assert_eq!(args.out_dir, PathBuf::from("exports"));
        assert!(args.resume);
        assert!(!args.reset);
    }

    #[test]
    fn missing_value_and_unknown_flag_fail() {
        assert!(matches!(
            parse(&["--participant"]),
            Err(ArgsError::MissingValue { flag: "--participant" })
        ));
        assert!(matches!(parse(&["--verbose"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(parse(&["--db", " "]), Err(ArgsError::InvalidDbUrl { .. })));
    }

    #[test]
    fn bare_paths_become_sqlite_urls() {
        assert_eq!(database_url("data/run.sqlite3"), "sqlite://data/run.sqlite3");
        assert_eq!(database_url(" sqlite:run.db "), "sqlite:run.db");
        assert_eq!(database_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn option_numbers_select_choices() {
        let state = NavigationState::opening(
            1,
            "How do you recharge?",
            vec!["Alone".into(), "With friends".into()],
            None,
        );
        assert_eq!(resolve_answer(Some(&state), " 2 "), "With friends");
        assert_eq!(resolve_answer(Some(&state), "3"), "3");
        assert_eq!(resolve_answer(Some(&state), "0"), "0");
        assert_eq!(resolve_answer(Some(&state), "a long walk"), "a long walk");
        assert_eq!(resolve_answer(None, " 1 "), "1");
    }
}

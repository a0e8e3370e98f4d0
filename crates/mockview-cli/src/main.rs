//! MockView CLI
//!
//! Runs a mock interview session against the configured backends. The
//! session is exposed over the HTTP API and WebSocket; with `--console` the
//! candidate can also answer from the terminal.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mockview_engine::{
    create_router, headless_platform, AppState, Backends, Config, EndReason, HttpBackends,
    InterviewSession, Language, SessionDeps, SessionEvent, SessionSetup, Sender, TurnOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// MockView - Live Mock Interview Engine
///
/// Conducts a staged mock interview with spoken questions, per-answer
/// feedback and a live coding round, then submits a report.
#[derive(Parser, Debug)]
#[command(name = "mockview")]
#[command(version, about, long_about = None)]
struct Args {
    /// Role the candidate is interviewing for
    #[arg(short, long)]
    role: String,

    /// Company type to simulate (e.g. Startup, FAANG)
    #[arg(long, default_value = "Tech")]
    company_type: String,

    /// Session id; a random one is generated when omitted
    #[arg(long)]
    session_id: Option<String>,

    /// Path to configuration file (default: mockview.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Read answers and commands from stdin
    #[arg(long)]
    console: bool,

    /// Simulated speaking time per word, in milliseconds
    #[arg(long, default_value_t = 0)]
    speech_ms_per_word: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("MockView starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print_config(&config);

    let backends = HttpBackends::new(&config)?;
    let setup = SessionSetup {
        session_id: args
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        role: args.role.clone(),
        company_type: args.company_type.clone(),
    };

    println!();
    println!("Starting interview session {}...", setup.session_id);
    let session = InterviewSession::start(
        setup,
        SessionDeps {
            config,
            backends: Backends::uniform(std::sync::Arc::new(backends)),
            platform: headless_platform(Duration::from_millis(args.speech_ms_per_word)),
        },
    )
    .await?;

    let printer = tokio::spawn(print_events(session.clone()));

    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;
    let router = create_router(AppState::new(session.clone()));
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });
    println!("HTTP API server running on http://{addr} (events on ws://{addr}/ws)");
    println!("Press Ctrl+C to leave the interview");
    println!();

    if args.console {
        print_console_help();
        tokio::select! {
            result = run_console(&session) => result?,
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        }
    } else {
        let mut events = session.subscribe();
        loop {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Ok(SessionEvent::SessionEnded(_)) | Err(RecvError::Closed) => break,
                    _ => {}
                },
            }
        }
    }

    // no-op if the session already ended
    if let Err(e) = session.end_session(EndReason::Navigation).await {
        tracing::warn!(error = %e, "session teardown reported an error");
    }

    server_handle.abort();
    printer.abort();
    print_summary(&session).await;
    Ok(())
}

/// Loads configuration from an explicit path or the working directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Text generation: {}", config.endpoints.text_generation);
    println!("  Code execution: {}", config.endpoints.code_execution);
    println!("  Coding attempts: {}", config.coding.max_attempts);
    println!("  Default language: {}", config.coding.default_language);
    println!(
        "  Affect sampling: every {}ms (threshold {})",
        config.timing.affect_interval_ms, config.affect.nervous_threshold
    );
}

fn print_console_help() {
    println!("Type an answer and press Enter. Commands:");
    println!("  :open / :close        open or close the code editor");
    println!("  :code <file> [lang]   submit a solution file");
    println!("  :skip                 skip the current problem");
    println!("  :next                 fetch another problem");
    println!("  :status               show the current stage");
    println!("  :end                  end the interview and submit the report");
    println!();
}

/// Reads answers and commands until `:end` or end of input.
async fn run_console(session: &InterviewSession) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        let result = match parts.next() {
            None => continue,
            Some(":end") => {
                match session.end_session(EndReason::Explicit).await {
                    Ok(Some(summary)) => {
                        if let Some(url) = summary.report_url {
                            println!("Report submitted: {url}");
                        }
                    }
                    Ok(None) => println!("The interview has already ended."),
                    Err(e) => println!("Report submission failed: {e}"),
                }
                return Ok(());
            }
            Some(":status") => {
                let snapshot = session.snapshot().await;
                println!(
                    "Stage: {} | attempts {}/{} | editor {}",
                    snapshot.stage,
                    snapshot.attempts,
                    snapshot.max_attempts,
                    if snapshot.editor_open { "open" } else { "closed" }
                );
                Ok(())
            }
            Some(":open") => session.open_code_editor().await,
            Some(":close") => session.close_code_editor().await,
            Some(":skip") => session.skip_current_problem().await.map(|_| ()),
            Some(":next") => session.fetch_next_problem().await.map(|_| ()),
            Some(":code") => {
                let Some(file) = parts.next() else {
                    println!("Usage: :code <file> [javascript|python]");
                    continue;
                };
                let language = match parts.next() {
                    Some(name) => Language::from_name(name),
                    None => Language::from_name(&session.config().coding.default_language),
                };
                let Some(language) = language else {
                    println!("Unsupported language; use javascript or python");
                    continue;
                };
                let code = tokio::fs::read_to_string(file).await.map_err(|e| {
                    anyhow::anyhow!("Failed to read '{file}': {e}")
                })?;
                session.submit_code(&code, language).await.map(|_| ())
            }
            Some(_) => match session.submit_answer(line).await {
                Ok(TurnOutcome::Ignored { reason }) => {
                    println!("(answer ignored: {reason:?})");
                    Ok(())
                }
                other => other.map(|_| ()),
            },
        };

        if let Err(e) = result {
            println!("{e}");
        }
    }

    Ok(())
}

/// Prints session events as they arrive.
async fn print_events(session: InterviewSession) {
    let mut events = session.subscribe();
    drop(session);

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        match event {
            SessionEvent::MessageAppended(p) if p.message.sender == Sender::Ai => {
                println!("Interviewer [{}]: {}", p.message.stage, p.message.text);
            }
            SessionEvent::FeedbackAttached(p) => {
                println!("  Feedback: {}", p.feedback.suggestion);
                println!("  Example: {}", p.feedback.example);
            }
            SessionEvent::StageChanged(p) => println!("--- {} -> {} ---", p.from, p.to),
            SessionEvent::ProblemOpened(p) => {
                println!();
                println!("Problem: {}", p.problem.title);
                println!("{}", p.problem.description);
                if !p.problem.example.is_empty() {
                    println!("Example: {}", p.problem.example);
                }
                println!("Implement `{}`.", p.problem.function_name);
            }
            SessionEvent::TestResults(p) => {
                for result in &p.results {
                    let mark = if result.passed { "PASS" } else { "FAIL" };
                    println!(
                        "  [{mark}] #{} input {} expected {} got {}",
                        result.id, result.input, result.expected, result.output
                    );
                }
            }
            SessionEvent::AttemptRecorded(p) => {
                let verb = if p.skipped { "skipped" } else { "solved" };
                println!("{} {verb} ({}/{})", p.title, p.attempts, p.max_attempts);
            }
            SessionEvent::Error(p) => println!("! {}", p.message),
            SessionEvent::SessionEnded(_) => return,
            _ => {}
        }
    }
}

/// Prints a summary of the finished interview.
async fn print_summary(session: &InterviewSession) {
    let snapshot = session.snapshot().await;
    let answers = snapshot
        .transcript
        .iter()
        .filter(|m| m.sender == Sender::User)
        .count();
    let feedback = snapshot
        .transcript
        .iter()
        .filter(|m| m.feedback.is_some())
        .count();

    println!();
    println!("=== MockView Summary ===");
    println!("Session: {}", snapshot.session_id);
    println!("Answers: {answers} ({feedback} with feedback)");
    println!(
        "Coding attempts: {}/{}",
        snapshot.attempts, snapshot.max_attempts
    );
}

//! buildstream - live job feed
//!
//! CLI entry point for tailing a job's event feed.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use buildstream::cli::{Cli, Command, format_agent, format_log_entry, format_recorded, format_state_change, get_log_path};
use buildstream::config::{Config, TransportKind};
use buildstream::events::{FeedEvent, read_recording, spawn_recorder};
use buildstream::transport::collaborators_from_config;
use buildstream::{FeedHandle, FeedSnapshot};

/// Grace period for the recorder to drain after the feed shuts down
const RECORDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Watch {
            job_id,
            record,
            no_fallback,
            transport,
            max_logs,
        } => cmd_watch(config, job_id, record, no_fallback, transport, max_logs).await,
        Command::Config => cmd_config(&config),
        Command::Replay { file } => cmd_replay(&file),
        Command::Logs { lines } => cmd_logs(lines),
    }
}

async fn cmd_watch(
    mut config: Config,
    job_id: String,
    record: Option<PathBuf>,
    no_fallback: bool,
    transport: Option<TransportKind>,
    max_logs: Option<usize>,
) -> Result<()> {
    debug!(%job_id, ?record, no_fallback, ?transport, ?max_logs, "cmd_watch: called");

    if no_fallback {
        config.feed.enable_fallback = false;
    }
    if let Some(transport) = transport {
        config.server.transport = transport;
    }
    if let Some(max_logs) = max_logs {
        config.feed.max_logs = max_logs;
    }
    config.validate().context("Invalid configuration")?;

    let collaborators = collaborators_from_config(&config.server)?;
    // Subscribe before anything can happen so the first state change is seen
    let mut feed_config = config.feed.clone();
    feed_config.auto_connect = false;
    let feed = FeedHandle::spawn(job_id.clone(), feed_config, collaborators);
    let mut events = feed.subscribe_events();

    let recorder = match &record {
        Some(path) => {
            let handle = spawn_recorder(path, feed.subscribe_events())
                .context(format!("Failed to open recording {}", path.display()))?;
            println!("Recording to {}", path.display());
            Some(handle)
        }
        None => None,
    };

    println!(
        "Watching {} via {:?} (Ctrl-C to stop)",
        job_id.bold(),
        config.server.transport
    );
    feed.connect().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("cmd_watch: Ctrl-C received");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if print_event(&event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "cmd_watch: display lagged behind feed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    feed.disconnect().await;
    let snapshot = feed.snapshot();
    drop(events);
    drop(feed);

    if let Some(recorder) = recorder {
        match tokio::time::timeout(RECORDER_DRAIN_TIMEOUT, recorder).await {
            Ok(Ok(written)) => println!("Recorded {} events", written),
            Ok(Err(e)) => warn!(error = %e, "cmd_watch: recorder task failed"),
            Err(_) => warn!("cmd_watch: recorder did not finish in time"),
        }
    }

    print_summary(&snapshot);

    match snapshot.error.as_deref() {
        Some(error) => Err(eyre::eyre!("{}", error)),
        None => Ok(()),
    }
}

/// Print one live event; returns true once the feed has failed
fn print_event(event: &FeedEvent) -> bool {
    match event {
        FeedEvent::LogAppended { entry, .. } => println!("{}", format_log_entry(entry)),
        FeedEvent::StateChanged { from, to, .. } => {
            println!("{}", format_state_change(*from, *to));
            return to.is_terminal();
        }
        FeedEvent::AgentUpdated { .. } | FeedEvent::LogsCleared { .. } | FeedEvent::JobSwitched { .. } => {}
    }
    false
}

fn print_summary(snapshot: &FeedSnapshot) {
    println!();
    println!("{} {} ({})", "Job".bold(), snapshot.job_id, snapshot.state);
    if snapshot.agents.is_empty() {
        println!("  no agent updates received");
        return;
    }
    for agent in snapshot.agents.values() {
        println!("{}", format_agent(agent));
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn cmd_replay(file: &Path) -> Result<()> {
    debug!(?file, "cmd_replay: called");
    if !file.exists() {
        return Err(eyre::eyre!("Recording not found: {}", file.display()));
    }

    let entries = read_recording(file).context(format!("Failed to read {}", file.display()))?;
    for entry in &entries {
        println!("{}", format_recorded(entry));
    }
    println!("{} events", entries.len());
    Ok(())
}

fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);

    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}

//! CLI command definitions and output formatting

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use crate::config::TransportKind;
use crate::domain::{AgentState, AgentStatus, ConnectionState, LogEntry, LogKind};
use crate::events::{FeedEvent, FeedEventEntry};

/// buildstream - live feed for long-running multi-agent build jobs
#[derive(Parser)]
#[command(
    name = "bs",
    about = "Tail the live event feed of a multi-agent build job",
    version = env!("CARGO_PKG_VERSION"),
    after_help = after_help()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow a job's live feed until Ctrl-C
    Watch {
        /// Job identifier
        job_id: String,

        /// Append every feed event to this JSONL file
        #[arg(short, long, value_name = "FILE")]
        record: Option<PathBuf>,

        /// Fail instead of polling once reconnects are exhausted
        #[arg(long)]
        no_fallback: bool,

        /// Override the configured transport (websocket, sse)
        #[arg(short, long)]
        transport: Option<TransportKind>,

        /// Override the log buffer capacity
        #[arg(long)]
        max_logs: Option<usize>,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Print a recorded session
    Replay {
        /// JSONL file written by `bs watch --record`
        file: PathBuf,
    },

    /// Show buildstream's own diagnostic log
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("buildstream")
        .join("logs")
        .join("buildstream.log")
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}

/// One log entry as a terminal line
pub fn format_log_entry(entry: &LogEntry) -> String {
    let time = entry.timestamp.format("%H:%M:%S").to_string().dimmed();
    let kind = match entry.kind {
        LogKind::Info => "info".blue(),
        LogKind::Success => "ok".green(),
        LogKind::Warning => "warn".yellow(),
        LogKind::Error => "error".red().bold(),
        LogKind::AgentStatus => "agent".cyan(),
    };

    let mut line = format!("{} {:>5} {}", time, kind, entry.message);
    if let Some(agent) = &entry.agent
        && entry.kind != LogKind::AgentStatus
    {
        line.push_str(&format!(" {}", format!("[{}]", agent).dimmed()));
    }
    line
}

/// One agent as a summary row
pub fn format_agent(agent: &AgentStatus) -> String {
    let status = match agent.status {
        AgentState::Idle => agent.status.to_string().dimmed(),
        AgentState::Working => agent.status.to_string().yellow(),
        AgentState::Completed => agent.status.to_string().green(),
        AgentState::Failed => agent.status.to_string().red(),
    };

    let mut line = format!("  {:<20} {:<10} {:>3}%", agent.name.bold(), status, agent.progress);
    if let Some(task) = &agent.current_task {
        line.push_str(&format!("  {}", task));
    }
    line
}

/// A state transition as a terminal line
pub fn format_state_change(from: ConnectionState, to: ConnectionState) -> String {
    let to_str = match to {
        ConnectionState::Open => to.to_string().green(),
        ConnectionState::Failed => to.to_string().red().bold(),
        ConnectionState::Reconnecting | ConnectionState::FallbackPolling => to.to_string().yellow(),
        _ => to.to_string().normal(),
    };
    format!("{} {} -> {}", "state".magenta(), from, to_str)
}

/// A recorded event as a terminal line
pub fn format_recorded(entry: &FeedEventEntry) -> String {
    debug!(event_type = entry.event.event_type(), "format_recorded: called");
    match &entry.event {
        FeedEvent::LogAppended { entry, .. } => format_log_entry(entry),
        FeedEvent::AgentUpdated { agent, .. } => format_agent(agent),
        FeedEvent::StateChanged { from, to, .. } => format_state_change(*from, *to),
        FeedEvent::LogsCleared { job_id } => format!("{} {}", "cleared".magenta(), job_id),
        FeedEvent::JobSwitched { job_id, previous } => format!("{} {} -> {}", "switched".magenta(), previous, job_id),
    }
}

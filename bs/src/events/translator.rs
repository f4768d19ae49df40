//! EventTranslator - maps raw inbound messages to domain events
//!
//! Translation is a pure, total function: every input yields a [`Translation`],
//! unknown or malformed input is downgraded to a warning log, and nothing here
//! can panic or return an error.

use tracing::debug;

use super::inbound::{InboundMessage, KnownMessage, RawMessage};
use crate::domain::{AgentState, AgentStatus, LogEntryDraft, LogKind, clamp_progress};

/// Result of translating one inbound message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Translation {
    pub log: Option<LogEntryDraft>,
    pub agent: Option<AgentStatus>,
}

impl Translation {
    fn log(draft: LogEntryDraft) -> Self {
        Self {
            log: Some(draft),
            agent: None,
        }
    }
}

/// Translate a raw transport record
pub fn translate(raw: &RawMessage) -> Translation {
    translate_message(InboundMessage::decode(raw))
}

/// Translate an already-decoded message
pub fn translate_message(message: InboundMessage) -> Translation {
    debug!(tag = message.tag(), "translate_message: called");
    match message {
        InboundMessage::Known(known) => translate_known(known),
        InboundMessage::Unknown { tag } => Translation::log(LogEntryDraft::warning(format!("Unknown message type: {}", tag))),
        InboundMessage::Malformed { tag, reason } => {
            debug!(%tag, %reason, "translate_message: malformed payload");
            Translation::log(LogEntryDraft::warning(format!("Malformed {} message", tag)))
        }
    }
}

fn translate_known(message: KnownMessage) -> Translation {
    match message {
        KnownMessage::ConnectionEstablished { .. } => {
            Translation::log(LogEntryDraft::success("Real-time updates active"))
        }

        KnownMessage::ProjectStarted { project, message } => {
            let text = match (message, project) {
                (Some(message), _) => message,
                (None, Some(project)) => format!("Project started: {}", project),
                (None, None) => "Project started".to_string(),
            };
            Translation::log(LogEntryDraft::info(text))
        }

        KnownMessage::ProjectProgress { progress, message } => {
            let progress = progress.map(clamp_progress);
            let text = match (progress, message.as_deref()) {
                (Some(p), Some(m)) => format!("Progress {}%: {}", p, m),
                (Some(p), None) => format!("Progress {}%", p),
                (None, Some(m)) => m.to_string(),
                (None, None) => "Progress update".to_string(),
            };
            let mut draft = LogEntryDraft::info(text);
            if let Some(p) = progress {
                draft = draft.with_progress(p);
            }
            Translation::log(draft)
        }

        KnownMessage::AgentStatusUpdate {
            agent,
            status,
            progress,
            current_task,
        } => {
            let state = status.as_deref().map(AgentState::parse_lenient).unwrap_or_default();
            let progress = progress.map(clamp_progress).unwrap_or(0);

            let mut text = format!("{}: {} ({}%)", agent, state, progress);
            if let Some(task) = &current_task {
                text.push_str(" - ");
                text.push_str(task);
            }

            let mut update = AgentStatus::new(agent.clone(), state, progress);
            if let Some(task) = current_task {
                update = update.with_task(task);
            }

            Translation {
                log: Some(
                    LogEntryDraft::new(LogKind::AgentStatus, text)
                        .with_agent(agent)
                        .with_progress(progress)
                        .with_status(state.to_string()),
                ),
                agent: Some(update),
            }
        }

        KnownMessage::WorkflowStageUpdate { stage, message } => {
            let text = match (stage, message) {
                (Some(stage), Some(message)) => format!("[{}] {}", stage, message),
                (Some(stage), None) => format!("Stage: {}", stage),
                (None, Some(message)) => message,
                (None, None) => "Workflow stage updated".to_string(),
            };
            Translation::log(LogEntryDraft::info(text))
        }

        KnownMessage::WorkflowLog { level, message, agent } => {
            let kind = level.as_deref().and_then(LogKind::from_severity).unwrap_or(LogKind::Info);
            let mut draft = LogEntryDraft::new(kind, message.unwrap_or_default());
            if let Some(agent) = agent {
                draft = draft.with_agent(agent);
            }
            Translation::log(draft)
        }

        KnownMessage::ProjectCompleted { message, deployment_url } => {
            let base = message.unwrap_or_else(|| "Project completed".to_string());
            let text = match deployment_url {
                Some(url) => format!("{} - deployed at {}", base, url),
                None => base,
            };
            Translation::log(LogEntryDraft::success(text))
        }

        KnownMessage::ProjectError { error, message } => {
            let detail = error.or(message).unwrap_or_else(|| "unknown error".to_string());
            Translation::log(LogEntryDraft::error(format!("Project error: {}", detail)))
        }
    }
}

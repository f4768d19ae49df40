//! Inbound protocol messages
//!
//! The backend sends loosely-typed JSON records with a `type` discriminator.
//! [`RawMessage`] is that record as received; [`InboundMessage`] is the closed
//! set of shapes the feed understands, with explicit `Unknown` and `Malformed`
//! variants so decoding is total.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Tag used when a payload has no usable `type` field
pub const MISSING_TAG: &str = "<missing>";

/// Tag used when a payload is not a JSON object at all
pub const NON_OBJECT_TAG: &str = "<non-object>";

/// Tags with a known payload shape
pub const KNOWN_TAGS: &[&str] = &[
    "connection_established",
    "project_started",
    "project_progress",
    "agent_status_update",
    "workflow_stage_update",
    "workflow_log",
    "project_completed",
    "project_error",
];

/// A loosely-typed inbound record, exactly as the transport delivered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMessage(pub Value);

impl RawMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a text frame; text that is not JSON is kept as a JSON string
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self(value),
            Err(e) => {
                debug!(error = %e, len = text.len(), "RawMessage::from_text: not JSON, keeping as string");
                Self(Value::String(text.to_string()))
            }
        }
    }

    /// The `type` discriminator, if present and a string
    pub fn tag(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for RawMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Payload shapes for the recognised tags
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownMessage {
    ConnectionEstablished {
        #[serde(default)]
        message: Option<String>,
    },
    ProjectStarted {
        #[serde(default, alias = "projectName", alias = "project_name")]
        project: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    ProjectProgress {
        #[serde(default)]
        progress: Option<f64>,
        #[serde(default)]
        message: Option<String>,
    },
    AgentStatusUpdate {
        #[serde(alias = "agent_name", alias = "agentName")]
        agent: String,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        progress: Option<f64>,
        #[serde(default, alias = "currentTask", alias = "task")]
        current_task: Option<String>,
    },
    WorkflowStageUpdate {
        #[serde(default)]
        stage: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    WorkflowLog {
        #[serde(default, alias = "severity")]
        level: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        agent: Option<String>,
    },
    ProjectCompleted {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, alias = "deploymentUrl")]
        deployment_url: Option<String>,
    },
    ProjectError {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Every inbound record decodes to exactly one of these
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Known(KnownMessage),
    /// Tag outside the known set, missing, or payload not an object
    Unknown { tag: String },
    /// Known tag whose fields have the wrong shape
    Malformed { tag: String, reason: String },
}

impl InboundMessage {
    /// Decode a raw record; never fails
    pub fn decode(raw: &RawMessage) -> Self {
        let Some(object) = raw.as_value().as_object() else {
            return Self::Unknown {
                tag: NON_OBJECT_TAG.to_string(),
            };
        };

        let tag = match object.get("type").and_then(Value::as_str) {
            Some(tag) => tag,
            None => {
                return Self::Unknown {
                    tag: MISSING_TAG.to_string(),
                };
            }
        };

        if !KNOWN_TAGS.contains(&tag) {
            debug!(%tag, "InboundMessage::decode: unknown tag");
            return Self::Unknown { tag: tag.to_string() };
        }

        match serde_json::from_value::<KnownMessage>(Value::Object(flatten_envelope(object))) {
            Ok(message) => Self::Known(message),
            Err(e) => {
                debug!(%tag, error = %e, "InboundMessage::decode: malformed payload");
                Self::Malformed {
                    tag: tag.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// The tag this message was decoded from
    pub fn tag(&self) -> &str {
        match self {
            Self::Known(known) => match known {
                KnownMessage::ConnectionEstablished { .. } => "connection_established",
                KnownMessage::ProjectStarted { .. } => "project_started",
                KnownMessage::ProjectProgress { .. } => "project_progress",
                KnownMessage::AgentStatusUpdate { .. } => "agent_status_update",
                KnownMessage::WorkflowStageUpdate { .. } => "workflow_stage_update",
                KnownMessage::WorkflowLog { .. } => "workflow_log",
                KnownMessage::ProjectCompleted { .. } => "project_completed",
                KnownMessage::ProjectError { .. } => "project_error",
            },
            Self::Unknown { tag } | Self::Malformed { tag, .. } => tag,
        }
    }
}

/// Lift fields of a nested `data` object to the top level
///
/// Some backends wrap the payload as `{ "type": ..., "data": { ... } }`.
/// Top-level fields win over nested ones.
fn flatten_envelope(object: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = match object.get("data") {
        Some(Value::Object(data)) => data.clone(),
        _ => Map::new(),
    };
    for (key, value) in object {
        if key == "data" && value.is_object() {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

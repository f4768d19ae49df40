//! HTTP-backed collaborators: per-job targets and the fallback poll source

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Context;
use serde_json::Value;
use tracing::debug;

use super::{ConnectTarget, SseTransport, TargetProvider, Transport, TransportError, WebSocketTransport};
use crate::config::{ServerConfig, TransportKind};
use crate::connection::FeedCollaborators;
use crate::events::RawMessage;
use crate::poller::{PollError, PollSource, PolledEntry};

/// Placeholder replaced with the job id in configured paths
const JOB_PLACEHOLDER: &str = "{job}";

/// Builds per-job URLs and credentials from [`ServerConfig`]
#[derive(Debug, Clone)]
pub struct ServerTargets {
    config: ServerConfig,
}

impl ServerTargets {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// WebSocket URL for a job (http → ws, https → wss)
    pub fn ws_url(&self, job_id: &str) -> String {
        let url = self.http_url(&self.config.ws_path, job_id);
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            url
        }
    }

    pub fn events_url(&self, job_id: &str) -> String {
        self.http_url(&self.config.events_path, job_id)
    }

    pub fn poll_url(&self, job_id: &str) -> String {
        self.http_url(&self.config.poll_path, job_id)
    }

    /// Bearer token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.config.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn http_url(&self, path: &str, job_id: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.replace(JOB_PLACEHOLDER, job_id);
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[async_trait]
impl TargetProvider for ServerTargets {
    async fn target(&self, job_id: &str) -> Result<ConnectTarget, TransportError> {
        debug!(%job_id, transport = ?self.config.transport, "ServerTargets::target: called");
        if job_id.trim().is_empty() {
            return Err(TransportError::Target("empty job id".to_string()));
        }

        let url = match self.config.transport {
            TransportKind::Websocket => self.ws_url(job_id),
            TransportKind::Sse => self.events_url(job_id),
        };
        let target = ConnectTarget::new(url);
        Ok(match self.token() {
            Some(token) => target.with_token(token),
            None => target,
        })
    }
}

/// Fallback poll source over `GET {base}{poll-path}?since=<cursor>`
#[derive(Debug, Clone)]
pub struct HttpPollSource {
    http: reqwest::Client,
    targets: ServerTargets,
}

impl HttpPollSource {
    pub fn new(http: reqwest::Client, targets: ServerTargets) -> Self {
        Self { http, targets }
    }
}

#[async_trait]
impl PollSource for HttpPollSource {
    async fn fetch_since(&self, job_id: &str, cursor: Option<&str>) -> Result<Vec<PolledEntry>, PollError> {
        let url = self.targets.poll_url(job_id);
        debug!(%url, ?cursor, "HttpPollSource::fetch_since: called");

        let mut request = self.http.get(&url).timeout(self.targets.config().request_timeout());
        if let Some(cursor) = cursor {
            request = request.query(&[("since", cursor)]);
        }
        if let Some(token) = self.targets.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| PollError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PollError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await.map_err(|e| PollError::Decode(e.to_string()))?;
        parse_poll_body(body)
    }
}

/// Decode a poll response body
///
/// Accepts a bare array or an object holding `logs` or `entries`. Items
/// without an id are skipped; items without a `type` are log rows.
pub fn parse_poll_body(body: Value) -> Result<Vec<PolledEntry>, PollError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("logs").or_else(|| map.remove("entries")) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(PollError::Decode(format!("expected an array of entries, got {}", type_name(&other))));
            }
            None => return Err(PollError::Decode("object has no `logs` or `entries` field".to_string())),
        },
        other => return Err(PollError::Decode(format!("unexpected body: {}", type_name(&other)))),
    };

    let mut entries = Vec::with_capacity(items.len());
    for mut item in items {
        let id = match item.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                debug!(?item, "parse_poll_body: skipping item without id");
                continue;
            }
        };

        if let Value::Object(map) = &mut item
            && !map.contains_key("type")
        {
            map.insert("type".to_string(), Value::String("workflow_log".to_string()));
        }

        entries.push(PolledEntry::new(id, RawMessage::new(item)));
    }

    Ok(entries)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Default collaborators for a server configuration
pub fn collaborators_from_config(server: &ServerConfig) -> eyre::Result<FeedCollaborators> {
    debug!(base_url = %server.base_url, transport = ?server.transport, "collaborators_from_config: called");
    let http = reqwest::Client::builder().build().context("Failed to build HTTP client")?;
    let targets = ServerTargets::new(server.clone());

    let transport: Arc<dyn Transport> = match server.transport {
        TransportKind::Websocket => Arc::new(WebSocketTransport::new(server.request_timeout())),
        TransportKind::Sse => Arc::new(SseTransport::new(http.clone())),
    };

    Ok(FeedCollaborators {
        transport,
        targets: Arc::new(targets.clone()),
        poll_source: Arc::new(HttpPollSource::new(http, targets)),
    })
}

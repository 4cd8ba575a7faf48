use serde::{Deserialize, Serialize};

/// One line of agent worker stdout, JSON-decoded (or synthesized by the
/// runner itself — e.g. the `error`/`exit` events a backend emits when the
/// worker process dies instead of exiting cleanly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AgentEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self { r#type: event_type.into(), data }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        let message = message.into();
        let mut data = serde_json::json!({ "message": message });
        if let Some(details) = details {
            data["details"] = serde_json::Value::String(details);
        }
        Self::new("error", data)
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::new("status", serde_json::json!({ "message": message.into() }))
    }
}

/// Everything `run_agent` needs to start one worker run, independent of
/// which backend executes it.
#[derive(Debug, Clone)]
pub struct RunAgentRequest {
    pub session_id: String,
    pub agent_id: String,
    /// Docker registry URL for the remote backend; ignored by the local backend.
    pub image: Option<String>,
    pub command: Vec<String>,
    pub prompt: String,
    /// Prior turns as a JSON array of `{role, content}`, pretty-printed —
    /// written to `history.txt` exactly as the worker expects to read it.
    pub history: Option<String>,
    pub env_vars: std::collections::HashMap<String, String>,
    pub timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("agent path not found for '{0}'")]
    AgentPathNotFound(String),
    #[error("failed to spawn agent worker: {0}")]
    SpawnFailed(std::io::Error),
    #[error("i/o error preparing workspace: {0}")]
    Workspace(std::io::Error),
    #[error("container backend error: {0}")]
    Container(String),
}

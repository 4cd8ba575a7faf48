use serde::{Deserialize, Serialize};

/// Closed set of normalized event kinds every agent dialect collapses into.
///
/// Downstream consumers (the SSE formatter, the persistence committer) match
/// exhaustively on this enum and never see a raw agent payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Done,
    Error,
    Ping,
    Status,
    Text,
    TextDelta,
    Thinking,
    ThinkingDelta,
    ToolUseStart,
    ToolUseDelta,
    ToolUseEnd,
    ToolResult,
    Metadata,
    Usage,
    Result,
    TodoCreate,
    TodoUpdate,
    TodoDone,
    /// Dialect-specific payload with no normalized mapping; passed through
    /// verbatim for callers that want to inspect it (deepagents dialect).
    Raw,
    /// Recognized shape but nothing sensible to do with it.
    Unknown,
}

pub use stupid_sandbox::AgentEvent;

/// Normalized event emitted by the parser, consumed by the SSE formatter.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub event_type: EventType,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl StreamEvent {
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            data,
            index: None,
            id: None,
        }
    }

    pub fn indexed(event_type: EventType, data: serde_json::Value, index: u32, id: impl Into<String>) -> Self {
        Self {
            event_type,
            data,
            index: Some(index),
            id: Some(id.into()),
        }
    }
}

/// Which agent framework produced the raw event stream.
///
/// Selects the dialect the parser uses to interpret `AgentEvent.type`/`data`
/// shapes. A new agent framework is a new dialect, not a new `EventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserDialect {
    Claude,
    DeepAgents,
}

impl ParserDialect {
    pub fn from_framework(framework: &str) -> Self {
        match framework {
            "deepagents" | "langchain" => Self::DeepAgents,
            _ => Self::Claude,
        }
    }
}

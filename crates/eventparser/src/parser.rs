use std::collections::{HashMap, HashSet};

use crate::claude::parse_claude;
use crate::deepagents::parse_deepagents;
use crate::types::{AgentEvent, ParserDialect, StreamEvent};

/// Turns one agent worker's line-delimited JSON stdout into the closed
/// `StreamEvent` vocabulary, tracking the accumulators and block-id state
/// each dialect needs across calls.
///
/// One instance lives for the duration of a single chat turn; it is never
/// shared across requests.
#[derive(Debug)]
pub struct EventParser {
    dialect: ParserDialect,
    pub(crate) accumulated_text: String,
    pub(crate) accumulated_thinking: String,
    pub(crate) sdk_session_id: Option<String>,
    pub(crate) text_ids: HashMap<u32, String>,
    pub(crate) thinking_ids: HashMap<u32, String>,
    pub(crate) tool_ids: HashMap<u32, String>,
    pub(crate) active_text: HashSet<u32>,
    pub(crate) active_thinking: HashSet<u32>,
}

impl EventParser {
    pub fn new(dialect: ParserDialect) -> Self {
        Self {
            dialect,
            accumulated_text: String::new(),
            accumulated_thinking: String::new(),
            sdk_session_id: None,
            text_ids: HashMap::new(),
            thinking_ids: HashMap::new(),
            tool_ids: HashMap::new(),
            active_text: HashSet::new(),
            active_thinking: HashSet::new(),
        }
    }

    pub fn for_framework(framework: &str) -> Self {
        Self::new(ParserDialect::from_framework(framework))
    }

    /// Parse one raw agent event. Never fails — unrecognized shapes become
    /// `EventType::Unknown` (Claude dialect) or `EventType::Raw` (deepagents).
    pub fn parse(&mut self, raw: &AgentEvent) -> StreamEvent {
        match self.dialect {
            ParserDialect::Claude => parse_claude(self, raw),
            ParserDialect::DeepAgents => parse_deepagents(self, raw),
        }
    }

    pub fn get_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn get_thinking(&self) -> &str {
        &self.accumulated_thinking
    }

    pub fn get_sdk_session_id(&self) -> Option<&str> {
        self.sdk_session_id.as_deref()
    }
}

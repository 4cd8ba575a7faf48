use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use uuid::Uuid;

use stupid_eventparser::{EventType, StreamEvent};

use crate::frame::{self, Frame};

/// Reformats normalized `StreamEvent`s into the block-oriented UI protocol.
///
/// Holds the block-id bookkeeping a single chat turn needs: which of the
/// non-indexed blocks (simple text, processing status, accumulated todos,
/// top-level thinking) are currently open, plus per-index maps for the
/// indexed text/thinking blocks a raw-dialect worker can open directly.
pub struct SseFormatter {
    message_id: String,
    simple_text_id: String,
    simple_text_started: bool,
    processing_id: String,
    processing_started: bool,
    thinking_id: String,
    thinking_started: bool,
    todos_id: String,
    todos_started: bool,
    text_ids: HashMap<u32, String>,
    thinking_ids: HashMap<u32, String>,
    active_text: HashSet<u32>,
    active_thinking: HashSet<u32>,
    accumulated_status: Vec<String>,
}

impl SseFormatter {
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            simple_text_id: String::new(),
            simple_text_started: false,
            processing_id: String::new(),
            processing_started: false,
            thinking_id: String::new(),
            thinking_started: false,
            todos_id: String::new(),
            todos_started: false,
            text_ids: HashMap::new(),
            thinking_ids: HashMap::new(),
            active_text: HashSet::new(),
            active_thinking: HashSet::new(),
            accumulated_status: Vec::new(),
        }
    }

    pub fn start(&self) -> Vec<Frame> {
        vec![frame::message_start(&self.message_id)]
    }

    fn close_thinking(&mut self, out: &mut Vec<Frame>) {
        if self.thinking_started {
            out.push(frame::reasoning_end(&self.thinking_id));
            self.thinking_started = false;
        }
    }

    fn close_processing(&mut self, out: &mut Vec<Frame>) {
        if self.processing_started {
            out.push(frame::reasoning_end(&self.processing_id));
            self.processing_started = false;
        }
    }

    fn ensure_processing(&mut self, out: &mut Vec<Frame>) {
        if !self.processing_started {
            self.processing_id = Uuid::new_v4().to_string();
            out.push(frame::reasoning_start(&self.processing_id, "processing"));
            self.processing_started = true;
        }
    }

    fn append_status(&mut self, out: &mut Vec<Frame>, line: &str) {
        self.accumulated_status.push(line.to_string());
        out.push(frame::reasoning_delta(&self.processing_id, line));
    }

    pub fn format(&mut self, event: &StreamEvent) -> Vec<Frame> {
        let mut out = Vec::new();

        match event.event_type {
            EventType::Status => {
                self.close_thinking(&mut out);
                self.ensure_processing(&mut out);
                let message = event.data.get("message").and_then(Value::as_str).unwrap_or_default();
                self.append_status(&mut out, &format!("{message}\n"));
            }
            EventType::TodoCreate | EventType::TodoUpdate => {
                if self.todos_started {
                    out.push(frame::reasoning_end(&self.todos_id));
                    self.todos_started = false;
                }
                self.todos_id = Uuid::new_v4().to_string();
                out.push(frame::reasoning_start(&self.todos_id, "todos"));
                let items = event.data.get("items").cloned().unwrap_or(Value::Array(vec![]));
                out.push(frame::reasoning_delta(&self.todos_id, &items.to_string()));
                out.push(frame::reasoning_end(&self.todos_id));
            }
            EventType::TodoDone => {
                self.close_thinking(&mut out);
                self.ensure_processing(&mut out);
                let content = event.data.get("content").and_then(Value::as_str).unwrap_or_default();
                let truncated: String = content.chars().take(50).collect();
                self.append_status(&mut out, &format!("Completed: {truncated}...\n"));
            }
            EventType::Text => {
                if let (Some(index), Some(id)) = (event.index, &event.id) {
                    self.text_ids.insert(index, id.clone());
                    self.active_text.insert(index);
                    out.push(frame::text_start(id));
                }
            }
            EventType::TextDelta => {
                self.close_processing(&mut out);
                self.close_thinking(&mut out);
                let delta = event.data.get("delta").and_then(Value::as_str).unwrap_or_default();
                let id = if let Some(id) = &event.id {
                    id.clone()
                } else {
                    if !self.simple_text_started {
                        self.simple_text_id = Uuid::new_v4().to_string();
                        out.push(frame::text_start(&self.simple_text_id));
                        self.simple_text_started = true;
                    }
                    self.simple_text_id.clone()
                };
                out.push(frame::text_delta(&id, delta));
            }
            EventType::Thinking => {
                self.close_processing(&mut out);
                if let (Some(index), Some(id)) = (event.index, &event.id) {
                    self.thinking_ids.insert(index, id.clone());
                    self.active_thinking.insert(index);
                    out.push(frame::reasoning_start(id, "thinking"));
                } else {
                    if !self.thinking_started {
                        self.thinking_id = Uuid::new_v4().to_string();
                        out.push(frame::reasoning_start(&self.thinking_id, "thinking"));
                        self.thinking_started = true;
                    }
                    let content = event.data.get("content").and_then(Value::as_str).unwrap_or_default();
                    out.push(frame::reasoning_delta(&self.thinking_id, content));
                }
            }
            EventType::ThinkingDelta => {
                if let Some(index) = event.index {
                    let id = self
                        .thinking_ids
                        .get(&index)
                        .cloned()
                        .or_else(|| event.id.clone())
                        .unwrap_or_default();
                    let delta = event.data.get("delta").and_then(Value::as_str).unwrap_or_default();
                    out.push(frame::reasoning_delta(&id, delta));
                }
            }
            EventType::ToolUseStart => {
                let tool_call_id = event.id.clone().unwrap_or_default();
                let name = event.data.get("name").and_then(Value::as_str).unwrap_or_default();
                out.push(frame::tool_input_start(&tool_call_id, name));
                if let Some(input) = event.data.get("input") {
                    if !input.is_null() && !(input.is_object() && input.as_object().unwrap().is_empty()) {
                        out.push(frame::tool_input_available(&tool_call_id, name, input.clone()));
                    }
                }
            }
            EventType::ToolUseDelta => {
                let tool_call_id = event.id.clone().unwrap_or_default();
                let delta = event.data.get("delta").and_then(Value::as_str).unwrap_or_default();
                out.push(frame::tool_input_delta(&tool_call_id, delta));
            }
            EventType::ToolResult => {
                let tool_call_id = event
                    .data
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| event.id.clone())
                    .unwrap_or_default();
                let output = if let Some(results) = event.data.get("results") {
                    let count = results.as_array().map(|a| a.len()).unwrap_or(0);
                    json!({ "count": count, "results": results })
                } else {
                    event.data.clone()
                };
                out.push(frame::tool_output_available(&tool_call_id, output));
            }
            EventType::Usage => {
                let mut data = json!({});
                if let Some(v) = event.data.get("input_tokens") {
                    data["inputTokens"] = v.clone();
                }
                if let Some(v) = event.data.get("output_tokens") {
                    data["outputTokens"] = v.clone();
                }
                if let Some(v) = event.data.get("reasoning_tokens") {
                    data["reasoningTokens"] = v.clone();
                }
                if let Some(v) = event.data.get("cached_tokens") {
                    data["cachedTokens"] = v.clone();
                }
                if let Some(v) = event.data.get("stop_reason") {
                    data["stopReason"] = v.clone();
                }
                if let Some(v) = event.data.get("total") {
                    data["isTotal"] = v.clone();
                }
                out.push(frame::data_usage(data));
            }
            EventType::Result => {
                let is_error = event.data.get("is_error").and_then(Value::as_bool).unwrap_or(false);
                if is_error {
                    if self.simple_text_started {
                        out.push(frame::text_end(&self.simple_text_id));
                        self.simple_text_started = false;
                    }
                    out.push(frame::error("Agent execution failed"));
                }
                let has_cost = event.data.get("total_cost_usd").is_some();
                let has_duration = event.data.get("duration_ms").is_some();
                if has_cost || has_duration {
                    let mut data = json!({});
                    if let Some(v) = event.data.get("total_cost_usd") {
                        data["totalCostUSD"] = v.clone();
                    }
                    if let Some(v) = event.data.get("num_turns") {
                        data["numTurns"] = v.clone();
                    }
                    if let Some(v) = event.data.get("duration_ms") {
                        data["durationMs"] = v.clone();
                    }
                    if let Some(v) = event.data.get("session_id").or_else(|| event.data.get("sessionId")) {
                        data["sdkSessionId"] = v.clone();
                    }
                    data["isError"] = json!(is_error);
                    out.push(frame::data_usage(data));
                }
            }
            EventType::Error => {
                if self.simple_text_started {
                    out.push(frame::text_end(&self.simple_text_id));
                    self.simple_text_started = false;
                }
                let message = event.data.get("message").and_then(Value::as_str).unwrap_or("Unknown error");
                out.push(frame::error(message));
            }
            EventType::Start
            | EventType::Done
            | EventType::Ping
            | EventType::Metadata
            | EventType::ToolUseEnd
            | EventType::Raw
            | EventType::Unknown => {}
        }

        out
    }

    pub fn end(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        self.close_processing(&mut out);
        if self.todos_started {
            out.push(frame::reasoning_end(&self.todos_id));
            self.todos_started = false;
        }
        self.close_thinking(&mut out);
        for index in self.active_text.clone() {
            if let Some(id) = self.text_ids.get(&index) {
                out.push(frame::text_end(id));
            }
        }
        self.active_text.clear();
        for index in self.active_thinking.clone() {
            if let Some(id) = self.thinking_ids.get(&index) {
                out.push(frame::reasoning_end(id));
            }
        }
        self.active_thinking.clear();
        if self.simple_text_started {
            out.push(frame::text_end(&self.simple_text_id));
            self.simple_text_started = false;
        }
        out.push(frame::message_finish());
        out
    }
}

impl Default for SseFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(event_type: EventType, data: Value) -> StreamEvent {
        StreamEvent { event_type, data, index: None, id: None }
    }

    #[test]
    fn bracket_counts_balance_for_simple_text_turn() {
        let mut fmt = SseFormatter::new();
        let mut frames = fmt.start();
        frames.extend(fmt.format(&ev(EventType::TextDelta, json!({ "delta": "hi" }))));
        frames.extend(fmt.format(&ev(EventType::Done, json!({}))));
        frames.extend(fmt.end());

        let starts = frames.iter().filter(|f| f.0["type"] == "text-start").count();
        let ends = frames.iter().filter(|f| f.0["type"] == "text-end").count();
        assert_eq!(starts, ends);
        assert_eq!(starts, 1);
        assert_eq!(frames.first().unwrap().0["type"], "start");
        assert_eq!(frames.last().unwrap().0["type"], "finish");
    }

    #[test]
    fn status_then_text_closes_processing_before_text_starts() {
        let mut fmt = SseFormatter::new();
        fmt.format(&ev(EventType::Status, json!({ "message": "Thinking" })));
        let frames = fmt.format(&ev(EventType::TextDelta, json!({ "delta": "hi" })));
        assert_eq!(frames[0].0["type"], "reasoning-end");
        assert_eq!(frames[1].0["type"], "text-start");
    }

    #[test]
    fn error_closes_open_simple_text_block() {
        let mut fmt = SseFormatter::new();
        fmt.format(&ev(EventType::TextDelta, json!({ "delta": "partial" })));
        let frames = fmt.format(&ev(EventType::Error, json!({ "message": "boom" })));
        assert_eq!(frames[0].0["type"], "text-end");
        assert_eq!(frames[1].0["type"], "error");
        assert_eq!(frames[1].0["errorText"], "boom");
    }

    #[test]
    fn todo_create_closes_its_own_block_immediately() {
        let mut fmt = SseFormatter::new();
        let frames = fmt.format(&ev(EventType::TodoCreate, json!({ "items": [{"content":"a","status":"pending"}] })));
        assert_eq!(frames[0].0["type"], "reasoning-start");
        assert_eq!(frames[1].0["type"], "reasoning-delta");
        assert_eq!(frames[2].0["type"], "reasoning-end");
    }

    #[test]
    fn todo_update_does_not_reopen_a_stale_block() {
        let mut fmt = SseFormatter::new();
        fmt.format(&ev(EventType::TodoCreate, json!({ "items": [{"content":"a","status":"pending"}] })));
        let frames = fmt.format(&ev(EventType::TodoUpdate, json!({ "items": [{"content":"a","status":"completed"}] })));
        assert_eq!(frames[0].0["type"], "reasoning-start");
        assert_eq!(frames.last().unwrap().0["type"], "reasoning-end");
    }

    #[test]
    fn tool_use_start_with_input_emits_available_too() {
        let mut fmt = SseFormatter::new();
        let event = StreamEvent {
            event_type: EventType::ToolUseStart,
            data: json!({ "name": "Bash", "input": { "command": "ls" } }),
            index: None,
            id: Some("tool_1".to_string()),
        };
        let frames = fmt.format(&event);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].0["type"], "tool-input-available");
    }
}

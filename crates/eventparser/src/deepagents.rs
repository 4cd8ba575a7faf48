use serde_json::json;
use serde_json::Value;

use crate::claude::parse_simplified;
use crate::types::{AgentEvent, EventType, StreamEvent};
use crate::EventParser;

fn short_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect::<String>())
}

/// LangGraph-style deepagents workers emit the same simplified line-JSON
/// shape as the Claude worker's simplified dialect, plus a handful of
/// framework-specific event names layered on top.
pub(crate) fn parse_deepagents(parser: &mut EventParser, raw: &AgentEvent) -> StreamEvent {
    match raw.r#type.as_str() {
        "tool_call_start" => StreamEvent::new(EventType::ToolUseStart, raw.data.clone()),
        "file_op" => StreamEvent::new(EventType::ToolUseStart, raw.data.clone()),
        "think_result" => StreamEvent::new(EventType::ToolResult, raw.data.clone()),
        "search" => {
            let query = raw.data.get("query").cloned().unwrap_or(Value::Null);
            let topic = raw.data.get("topic").cloned().unwrap_or(Value::Null);
            let id = raw
                .data
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| short_id("search"));
            StreamEvent::new(
                EventType::ToolUseStart,
                json!({ "name": "internet_search", "id": id, "input": { "query": query, "topic": topic } }),
            )
        }
        "search_result" => {
            let results = raw.data.get("results").cloned().unwrap_or(Value::Array(vec![]));
            let count = results.as_array().map(|a| a.len()).unwrap_or(0);
            StreamEvent::new(EventType::ToolResult, json!({ "count": count, "results": results }))
        }
        "subagent_start" => {
            let agent_type = raw.data.get("type").and_then(Value::as_str).unwrap_or("agent");
            let line = format!("Starting subagent: {agent_type}\n");
            parser.accumulated_thinking.push_str(&line);
            StreamEvent::new(EventType::Thinking, json!({ "content": line }))
        }
        "subagent_complete" => {
            let agent_type = raw.data.get("type").and_then(Value::as_str).unwrap_or("agent");
            let line = format!("Completed subagent: {agent_type}\n");
            parser.accumulated_thinking.push_str(&line);
            StreamEvent::new(EventType::Thinking, json!({ "content": line }))
        }
        _ => parse_simplified(parser, raw, EventType::Raw),
    }
}

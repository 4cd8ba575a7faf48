use serde_json::{json, Value};

use crate::types::{AgentEvent, EventType, StreamEvent};
use crate::EventParser;

fn short_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect::<String>())
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn u32_field(data: &Value, key: &str) -> Option<u32> {
    data.get(key).and_then(Value::as_u64).map(|n| n as u32)
}

/// Nests flat `input_tokens`/`output_tokens` fields under a `"usage"` key if
/// they aren't already, matching what `StreamAccumulator::apply` expects.
fn wrap_usage(data: &Value) -> Value {
    if data.get("usage").is_some() {
        data.clone()
    } else {
        json!({ "usage": data.clone() })
    }
}

/// Both raw-Claude-Messages-API streaming events and the simplified in-house
/// line-JSON wrapper speak through this one dialect; the raw API's event
/// names (`message_start`, `content_block_start`, ...) never collide with the
/// simplified wrapper's (`start`, `text`, `tool_use`, ...).
pub(crate) fn parse_claude(parser: &mut EventParser, raw: &AgentEvent) -> StreamEvent {
    match raw.r#type.as_str() {
        "message_start" => {
            if let Some(id) = raw.data.get("message").and_then(|m| m.get("id")).and_then(Value::as_str) {
                parser.sdk_session_id = Some(id.to_string());
            }
            StreamEvent::new(EventType::Start, raw.data.clone())
        }
        "content_block_start" => parse_content_block_start(parser, raw),
        "content_block_delta" => parse_content_block_delta(parser, raw),
        "content_block_stop" => parse_content_block_stop(parser, raw),
        "message_delta" => {
            let mut usage = json!({});
            if let Some(u) = raw.data.get("usage") {
                if let Some(out) = u.get("output_tokens") {
                    usage["output_tokens"] = out.clone();
                }
            }
            let mut data = json!({ "usage": usage });
            if let Some(stop_reason) = raw.data.get("delta").and_then(|d| d.get("stop_reason")) {
                data["stop_reason"] = stop_reason.clone();
            }
            StreamEvent::new(EventType::Usage, data)
        }
        "message_stop" => StreamEvent::new(EventType::Done, json!({})),
        "ping" => StreamEvent::new(EventType::Ping, json!({})),
        "error" => {
            let message = raw
                .data
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("An error occurred");
            StreamEvent::new(EventType::Error, json!({ "message": message }))
        }
        _ => parse_simplified(parser, raw, EventType::Unknown),
    }
}

fn parse_content_block_start(parser: &mut EventParser, raw: &AgentEvent) -> StreamEvent {
    let index = u32_field(&raw.data, "index").unwrap_or(0);
    let block = raw.data.get("content_block").cloned().unwrap_or(json!({}));
    match block.get("type").and_then(Value::as_str) {
        Some("text") => {
            let id = short_id("text");
            parser.text_ids.insert(index, id.clone());
            parser.active_text.insert(index);
            StreamEvent::indexed(EventType::Text, json!({}), index, id)
        }
        Some("thinking") => {
            let id = short_id("thinking");
            parser.thinking_ids.insert(index, id.clone());
            parser.active_thinking.insert(index);
            StreamEvent::indexed(EventType::Thinking, json!({}), index, id)
        }
        Some("tool_use") => {
            let id = block
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| short_id("tool"));
            parser.tool_ids.insert(index, id.clone());
            let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
            StreamEvent::indexed(EventType::ToolUseStart, json!({ "name": name, "input": {} }), index, id)
        }
        _ => StreamEvent::new(EventType::Unknown, raw.data.clone()),
    }
}

fn parse_content_block_delta(parser: &mut EventParser, raw: &AgentEvent) -> StreamEvent {
    let index = u32_field(&raw.data, "index").unwrap_or(0);
    let delta = raw.data.get("delta").cloned().unwrap_or(json!({}));
    match delta.get("type").and_then(Value::as_str) {
        Some("text_delta") => {
            let text = delta.get("text").and_then(Value::as_str).unwrap_or_default();
            parser.accumulated_text.push_str(text);
            let id = parser.text_ids.get(&index).cloned().unwrap_or_default();
            StreamEvent::indexed(EventType::TextDelta, json!({ "delta": text }), index, id)
        }
        Some("thinking_delta") => {
            let thinking = delta.get("thinking").and_then(Value::as_str).unwrap_or_default();
            parser.accumulated_thinking.push_str(thinking);
            let id = parser.thinking_ids.get(&index).cloned().unwrap_or_default();
            StreamEvent::indexed(EventType::ThinkingDelta, json!({ "delta": thinking }), index, id)
        }
        Some("input_json_delta") => {
            let partial = delta.get("partial_json").and_then(Value::as_str).unwrap_or_default();
            let id = parser.tool_ids.get(&index).cloned().unwrap_or_default();
            StreamEvent::indexed(EventType::ToolUseDelta, json!({ "delta": partial }), index, id)
        }
        _ => StreamEvent::new(EventType::Unknown, raw.data.clone()),
    }
}

fn parse_content_block_stop(parser: &mut EventParser, raw: &AgentEvent) -> StreamEvent {
    let index = u32_field(&raw.data, "index").unwrap_or(0);
    parser.active_text.remove(&index);
    parser.active_thinking.remove(&index);
    if let Some(id) = parser.tool_ids.get(&index).cloned() {
        StreamEvent::indexed(EventType::ToolUseEnd, json!({}), index, id)
    } else {
        StreamEvent::new(EventType::Unknown, raw.data.clone())
    }
}

/// The simplified line-JSON wrapper shared by both the Claude and deepagents
/// workers, plus each dialect's own extensions layered on top by the caller.
pub(crate) fn parse_simplified(parser: &mut EventParser, raw: &AgentEvent, unknown: EventType) -> StreamEvent {
    match raw.r#type.as_str() {
        "start" => StreamEvent::new(EventType::Start, raw.data.clone()),
        "status" => StreamEvent::new(EventType::Status, raw.data.clone()),
        "text" => {
            let text = str_field(&raw.data, "delta")
                .or_else(|| str_field(&raw.data, "content"))
                .unwrap_or_default();
            parser.accumulated_text.push_str(text);
            StreamEvent::new(EventType::TextDelta, json!({ "delta": text, "content": text }))
        }
        "thinking" | "think" => {
            let mut text = str_field(&raw.data, "content")
                .or_else(|| str_field(&raw.data, "delta"))
                .unwrap_or_default()
                .to_string();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            parser.accumulated_thinking.push_str(&text);
            StreamEvent::new(EventType::Thinking, json!({ "content": text }))
        }
        "tool_use" => {
            let name = str_field(&raw.data, "name").unwrap_or_default();
            if name == "TodoWrite" {
                StreamEvent::new(EventType::TodoUpdate, json!({ "items": normalize_todo_items(&raw.data) }))
            } else {
                StreamEvent::new(EventType::ToolUseStart, raw.data.clone())
            }
        }
        "tool_result" => StreamEvent::new(EventType::ToolResult, raw.data.clone()),
        "result" => {
            if let Some(id) = str_field(&raw.data, "session_id").or_else(|| str_field(&raw.data, "sessionId")) {
                parser.sdk_session_id = Some(id.to_string());
            }
            StreamEvent::new(EventType::Result, raw.data.clone())
        }
        "usage" => StreamEvent::new(EventType::Usage, wrap_usage(&raw.data)),
        "usage_total" => {
            let mut data = wrap_usage(&raw.data);
            data["total"] = Value::Bool(true);
            StreamEvent::new(EventType::Usage, data)
        }
        "todos" | "todo_create" => StreamEvent::new(EventType::TodoCreate, raw.data.clone()),
        "todo_update" => StreamEvent::new(EventType::TodoUpdate, raw.data.clone()),
        "todo_done" => StreamEvent::new(EventType::TodoDone, raw.data.clone()),
        "subagent_spawn" => {
            let agent_type = str_field(&raw.data, "type").unwrap_or("agent");
            let description = str_field(&raw.data, "description").unwrap_or_default();
            StreamEvent::new(
                EventType::Status,
                json!({ "message": format!("Spawning {agent_type}: {description}") }),
            )
        }
        "done" => StreamEvent::new(EventType::Done, json!({})),
        _ => StreamEvent::new(unknown, raw.data.clone()),
    }
}

fn normalize_todo_items(data: &Value) -> Value {
    let items = data
        .get("input")
        .and_then(|i| i.get("todos"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let normalized: Vec<Value> = items
        .iter()
        .map(|item| {
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .or_else(|| item.get("activeForm").and_then(Value::as_str))
                .unwrap_or_default();
            let status = item.get("status").and_then(Value::as_str).unwrap_or("pending");
            json!({ "content": content, "status": status })
        })
        .collect();

    Value::Array(normalized)
}

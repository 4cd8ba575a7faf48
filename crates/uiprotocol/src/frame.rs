use serde_json::{json, Value};

/// One SSE frame of the block-oriented UI streaming protocol.
///
/// Wraps the JSON payload; wire encoding (`data: {json}\n\n`) is applied by
/// `encode`, kept separate from construction so tests can assert on the
/// payload shape directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame(pub Value);

impl Frame {
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.0)
    }
}

/// Terminal marker closing the SSE stream. Not a `Frame` — it carries no
/// JSON payload.
pub const DONE_SENTINEL: &str = "data: [DONE]\n\n";

pub fn message_start(message_id: &str) -> Frame {
    Frame(json!({ "type": "start", "messageId": message_id }))
}

pub fn message_finish() -> Frame {
    Frame(json!({ "type": "finish" }))
}

pub fn text_start(id: &str) -> Frame {
    Frame(json!({ "type": "text-start", "id": id }))
}

pub fn text_delta(id: &str, delta: &str) -> Frame {
    Frame(json!({ "type": "text-delta", "id": id, "delta": delta }))
}

pub fn text_end(id: &str) -> Frame {
    Frame(json!({ "type": "text-end", "id": id }))
}

/// `variant` is one of `"thinking"`, `"processing"`, `"todos"` — surfaced to
/// the client so it can render the three reasoning-family blocks distinctly.
pub fn reasoning_start(id: &str, variant: &str) -> Frame {
    Frame(json!({
        "type": "reasoning-start",
        "id": id,
        "providerMetadata": { "stupid_gateway": { "variant": variant } },
    }))
}

pub fn reasoning_delta(id: &str, delta: &str) -> Frame {
    Frame(json!({ "type": "reasoning-delta", "id": id, "delta": delta }))
}

pub fn reasoning_end(id: &str) -> Frame {
    Frame(json!({ "type": "reasoning-end", "id": id }))
}

pub fn tool_input_start(tool_call_id: &str, tool_name: &str) -> Frame {
    Frame(json!({ "type": "tool-input-start", "toolCallId": tool_call_id, "toolName": tool_name }))
}

pub fn tool_input_delta(tool_call_id: &str, input_text_delta: &str) -> Frame {
    Frame(json!({ "type": "tool-input-delta", "toolCallId": tool_call_id, "inputTextDelta": input_text_delta }))
}

pub fn tool_input_available(tool_call_id: &str, tool_name: &str, input: Value) -> Frame {
    Frame(json!({ "type": "tool-input-available", "toolCallId": tool_call_id, "toolName": tool_name, "input": input }))
}

pub fn tool_output_available(tool_call_id: &str, output: Value) -> Frame {
    Frame(json!({ "type": "tool-output-available", "toolCallId": tool_call_id, "output": output }))
}

pub fn data_usage(data: Value) -> Frame {
    Frame(json!({ "type": "data-usage", "data": data }))
}

pub fn error(message: &str) -> Frame {
    Frame(json!({ "type": "error", "errorText": message }))
}

//! The chat gateway's single HTTP endpoint: resolve a session/agent pair,
//! persist the user's turn, spawn the agent worker, and stream its output
//! back as the block-oriented SSE protocol the UI speaks.
//!
//! Grounded on `agents/sessions_stream.rs`'s spawn-a-channel-and-forward-SSE
//! shape, generalized from the agentic-loop's own `StreamEvent` to the
//! sandboxed-worker pipeline (`AgentEvent` -> `EventParser` -> `SseFormatter`).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use futures::Stream;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use stupid_agent::descriptor::AgentDescriptor;
use stupid_eventparser::{EventParser, EventType};
use stupid_sandbox::{local, remote, AgentEvent, RunAgentRequest};
use stupid_uiprotocol::{SseFormatter, DONE_SENTINEL};

use crate::commit::{self, PendingCommit, PendingEvent, UsageTotals};
use crate::state::AppState;

use super::store;
use super::types::ChatRequest;

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ChatErrorResponse {
    pub detail: String,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> (StatusCode, Json<ChatErrorResponse>) {
    (status, Json(ChatErrorResponse { detail: detail.into() }))
}

/// `POST /api/v1/chat/` — execute an agent turn and stream the response.
#[utoipa::path(
    post,
    path = "/api/v1/chat/",
    request_body = ChatRequest,
    responses((status = 200, description = "SSE stream of UI protocol frames")),
    tag = "chat"
)]
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, (StatusCode, Json<ChatErrorResponse>)> {
    let pool = state
        .pg_pool
        .clone()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "chat persistence is not configured"))?;

    // Resolve session_id / agent_id: an existing session pins its own agent;
    // a new session (or an unknown session_id) requires the caller to name one.
    let session_uuid = req
        .session_id
        .as_deref()
        .map(|s| uuid::Uuid::parse_str(s))
        .transpose()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "invalid session_id"))?;

    let existing = match session_uuid {
        Some(id) => store::find_session(&pool, id)
            .await
            .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("session lookup failed: {e}")))?,
        None => None,
    };

    let is_new = existing.is_none();
    let agent_id = match &existing {
        Some(session) => session
            .agent_id
            .clone()
            .ok_or_else(|| error_response(StatusCode::INTERNAL_SERVER_ERROR, "session has no agent_id"))?,
        None => req
            .agent_id
            .clone()
            .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "agent_id is required when creating a new session"))?,
    };

    let descriptor = AgentDescriptor::load(&state.agents_dir, &agent_id)
        .map_err(|_| error_response(StatusCode::NOT_FOUND, format!("agent '{agent_id}' not found")))?;

    if descriptor.image.is_none() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("agent '{agent_id}' has no image configured"),
        ));
    }

    let chat_id = session_uuid.unwrap_or_else(uuid::Uuid::new_v4);
    let (session, _) = store::get_or_create_session(&pool, chat_id, &agent_id, &descriptor.name, &req.prompt)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to create session: {e}")))?;

    // Save the user's message immediately, before any further validation —
    // a later failure (missing env vars, sandbox error) still leaves the
    // turn visible in history.
    store::insert_user_message(&pool, chat_id, &req.prompt)
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to save message: {e}")))?;

    let env_vars = descriptor.resolve_env_vars();
    if !descriptor.env_vars.is_empty() && env_vars.is_empty() {
        tracing::error!(agent = %agent_id, declared = ?descriptor.env_vars, "missing env vars for agent");
        return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "service temporarily unavailable"));
    }

    let history_json = if !is_new {
        let mut messages = store::load_messages(&pool, chat_id)
            .await
            .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to load history: {e}")))?;
        // Drop the just-inserted current-turn prompt — it's the last row by
        // `created_at ASC` and is sent separately as `req.prompt`.
        messages.pop();
        if messages.is_empty() {
            None
        } else {
            let rows: Vec<Value> = messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect();
            Some(serde_json::to_string_pretty(&rows).unwrap_or_default())
        }
    } else {
        None
    };

    let container_provider = state.container_provider.clone();
    let stored_sdk_session_id = session.sdk_session_id.clone();

    let (agent_tx, agent_rx) = tokio::sync::mpsc::channel::<AgentEvent>(256);
    let (sse_tx, sse_rx) = tokio::sync::mpsc::channel::<String>(256);

    let agents_dir = state.agents_dir.clone();
    let run_req = RunAgentRequest {
        session_id: chat_id.to_string(),
        agent_id: agent_id.clone(),
        image: descriptor.image.clone(),
        command: descriptor.command.clone(),
        prompt: req.prompt.clone(),
        history: history_json,
        env_vars,
        timeout_secs: descriptor.timeout_secs,
        idle_timeout_secs: descriptor.idle_timeout_secs,
    };

    tokio::spawn(async move {
        match container_provider {
            Some(provider) => remote::run_agent(provider.as_ref(), run_req, agent_tx).await,
            None => local::run_agent(&agents_dir, run_req, agent_tx).await,
        }
    });

    let framework = descriptor.framework.clone();
    tokio::spawn(async move {
        drive_stream(pool, chat_id, stored_sdk_session_id, framework, agent_rx, sse_tx).await;
    });

    let body_stream = ReceiverStream::new(sse_rx).map(Ok::<_, Infallible>);

    Ok(sse_response(body_stream))
}

/// Running state built up across one turn's events: processing status
/// lines, the live todo list, token usage, and the SDK's own session id.
/// Kept separate from `drive_stream`'s channel plumbing so the per-event
/// update rules can be exercised directly.
#[derive(Debug, Default)]
struct StreamAccumulator {
    status: Vec<String>,
    todos: Vec<Value>,
    usage: UsageTotals,
    sdk_session_id: Option<String>,
}

impl StreamAccumulator {
    fn apply(&mut self, event: &stupid_eventparser::StreamEvent) {
        match event.event_type {
            EventType::Status => {
                if let Some(msg) = event.data.get("message").and_then(Value::as_str) {
                    if !msg.is_empty() {
                        self.status.push(msg.to_string());
                    }
                }
            }
            EventType::TodoCreate | EventType::TodoUpdate => {
                let items = event.data.get("items").cloned().unwrap_or(Value::Null);
                if let Value::Array(items) = &items {
                    if !items.is_empty() {
                        let verb = if event.event_type == EventType::TodoCreate { "Planning" } else { "Updated" };
                        self.status.push(format!("{verb}: {} tasks", items.len()));
                        self.todos = items.clone();
                    }
                }
            }
            EventType::TodoDone => {
                let item = event.data.get("item").cloned().unwrap_or(Value::Null);
                let index = event.data.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                let content = item
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or("Task")
                    .chars()
                    .take(50)
                    .collect::<String>();
                self.status.push(format!("Completed: {content}..."));
                if let Some(slot) = self.todos.get_mut(index) {
                    if let (Value::Object(slot_map), Value::Object(item_map)) = (slot, &item) {
                        slot_map.insert("status".to_string(), Value::String("completed".to_string()));
                        for (k, v) in item_map {
                            slot_map.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
            EventType::Usage => {
                if let Some(u) = event.data.get("usage") {
                    let inp = u.get("input_tokens").and_then(Value::as_i64).unwrap_or(0);
                    let out = u.get("output_tokens").and_then(Value::as_i64).unwrap_or(0);
                    let total = u.get("total_tokens").and_then(Value::as_i64);
                    if event.data.get("total").and_then(Value::as_bool).unwrap_or(false) {
                        self.usage.input_tokens = inp;
                        self.usage.output_tokens = out;
                        self.usage.total_tokens = total.unwrap_or(inp + out);
                    } else {
                        self.usage.input_tokens += inp;
                        self.usage.output_tokens += out;
                        self.usage.total_tokens = self.usage.input_tokens + self.usage.output_tokens;
                    }
                }
            }
            EventType::Result => {
                for key in ["session_id", "sessionId"] {
                    if let Some(id) = event.data.get(key).and_then(Value::as_str) {
                        self.sdk_session_id = Some(id.to_string());
                        break;
                    }
                }
                if let Some(cost) = event.data.get("total_cost_usd").and_then(Value::as_f64) {
                    self.usage.cost_usd = cost;
                }
                if let Some(u) = event.data.get("usage") {
                    self.usage.input_tokens = u.get("input_tokens").and_then(Value::as_i64).unwrap_or(self.usage.input_tokens);
                    self.usage.output_tokens = u.get("output_tokens").and_then(Value::as_i64).unwrap_or(self.usage.output_tokens);
                    self.usage.total_tokens = u
                        .get("total_tokens")
                        .and_then(Value::as_i64)
                        .unwrap_or(self.usage.input_tokens + self.usage.output_tokens);
                }
            }
            _ => {}
        }
    }
}

/// Consumes raw `AgentEvent`s, normalizes and reformats them, forwards the
/// encoded frames to the client, and commits the accumulated turn once the
/// stream ends. Runs entirely detached from the HTTP response future — by
/// the time the last frame is sent the client already has everything it
/// will ever see from this turn.
async fn drive_stream(
    pool: sqlx::PgPool,
    chat_id: uuid::Uuid,
    stored_sdk_session_id: Option<String>,
    framework: String,
    mut agent_rx: tokio::sync::mpsc::Receiver<AgentEvent>,
    sse_tx: tokio::sync::mpsc::Sender<String>,
) {
    let mut parser = EventParser::for_framework(&framework);
    let mut formatter = SseFormatter::new();

    let mut acc = StreamAccumulator::default();
    let mut events_to_save: Vec<PendingEvent> = Vec::new();

    for frame in formatter.start() {
        if sse_tx.send(frame.encode()).await.is_err() {
            return;
        }
    }

    while let Some(raw) = agent_rx.recv().await {
        let event = parser.parse(&raw);
        acc.apply(&event);

        if let Some(event_type) = persisted_event_type(event.event_type) {
            let event_name = if event.event_type == EventType::ToolUseStart {
                event.data.get("name").and_then(Value::as_str).map(str::to_string)
            } else {
                None
            };
            events_to_save.push(PendingEvent {
                event_type,
                event_name,
                event_data: event.data.clone(),
            });
        }

        let done = event.event_type == EventType::Done;
        for frame in formatter.format(&event) {
            if sse_tx.send(frame.encode()).await.is_err() {
                return;
            }
        }
        if done {
            break;
        }
    }

    for frame in formatter.end() {
        if sse_tx.send(frame.encode()).await.is_err() {
            return;
        }
    }
    let _ = sse_tx.send(DONE_SENTINEL.to_string()).await;

    let sdk_session_id = acc.sdk_session_id.or_else(|| parser.get_sdk_session_id().map(str::to_string));

    commit::commit(
        pool,
        PendingCommit {
            chat_id,
            events: events_to_save,
            assistant_content: parser.get_text().to_string(),
            accumulated_status: acc.status,
            thinking: parser.get_thinking().to_string(),
            accumulated_todos: acc.todos,
            usage: acc.usage,
            sdk_session_id,
            stored_sdk_session_id,
        },
    )
    .await;
}

/// Maps a normalized event kind to the persisted audit-trail event type, for
/// the 7 kinds worth keeping a permanent record of.
fn persisted_event_type(event_type: EventType) -> Option<&'static str> {
    match event_type {
        EventType::ToolUseStart => Some("tool_use"),
        EventType::ToolResult => Some("tool_result"),
        EventType::Result => Some("result"),
        EventType::Error => Some("error"),
        EventType::TodoCreate => Some("todo_create"),
        EventType::TodoUpdate => Some("todo_update"),
        EventType::TodoDone => Some("todo_done"),
        _ => None,
    }
}


fn sse_response(stream: impl Stream<Item = Result<String, Infallible>> + Send + 'static) -> Response {
    let body_stream = stream.map(|chunk| chunk.map(axum::body::Bytes::from));
    let mut response = Response::new(axum::body::Body::from_stream(body_stream));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert("x-vercel-ai-ui-message-stream", HeaderValue::from_static("v1"));
    response
}

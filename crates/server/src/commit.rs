//! Persistence Committer: the deferred, best-effort write of one chat turn's
//! assistant message, usage, and auditable events, run after the SSE stream
//! has already been handed back to the client.
//!
//! Grounded on the teacher's background-task shape in
//! `ingestion/job_runner.rs` (spawn, run to completion, log-don't-propagate
//! failures) — generalized here from a progress-reporting job to a single
//! transactional commit. Always opens a fresh connection from the shared
//! pool rather than reusing anything tied to the request.

use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use tracing::{error, info};

#[derive(Debug, Default, Clone, Copy)]
pub struct UsageTotals {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost_usd: f64,
}

pub struct PendingEvent {
    pub event_type: &'static str,
    pub event_name: Option<String>,
    pub event_data: Value,
}

/// Everything accumulated while streaming one turn, handed off to the
/// committer once the stream ends (successfully or not).
pub struct PendingCommit {
    pub chat_id: Uuid,
    pub events: Vec<PendingEvent>,
    pub assistant_content: String,
    pub accumulated_status: Vec<String>,
    pub thinking: String,
    pub accumulated_todos: Vec<Value>,
    pub usage: UsageTotals,
    pub sdk_session_id: Option<String>,
    pub stored_sdk_session_id: Option<String>,
}

/// Runs the deferred commit. Never panics and never propagates errors to the
/// caller — any failure here is logged and the chat turn is otherwise
/// already complete from the client's point of view.
pub async fn commit(pool: PgPool, pending: PendingCommit) {
    if let Err(e) = commit_inner(&pool, &pending).await {
        error!(chat_id = %pending.chat_id, error = %e, "failed to persist chat turn");
    }
}

async fn commit_inner(pool: &PgPool, pending: &PendingCommit) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for event in &pending.events {
        sqlx::query(
            "INSERT INTO chat_events (chat_id, event_type, event_name, event_data) VALUES ($1, $2, $3, $4)",
        )
        .bind(pending.chat_id)
        .bind(event.event_type)
        .bind(&event.event_name)
        .bind(&event.event_data)
        .execute(&mut *tx)
        .await?;
    }

    let mut metadata = json!({});
    if !pending.accumulated_status.is_empty() {
        metadata["processing"] = json!(pending.accumulated_status);
    }
    if !pending.thinking.is_empty() {
        metadata["thinking"] = json!(pending.thinking);
    }
    if !pending.accumulated_todos.is_empty() {
        metadata["todos"] = json!(pending.accumulated_todos);
    }
    let metadata = if metadata.as_object().map(|o| o.is_empty()).unwrap_or(true) {
        None
    } else {
        Some(metadata)
    };

    let should_save_message = !pending.assistant_content.is_empty()
        || !pending.accumulated_status.is_empty()
        || !pending.thinking.is_empty()
        || !pending.accumulated_todos.is_empty();

    if should_save_message {
        sqlx::query(
            "INSERT INTO chat_messages (chat_id, role, content, message_metadata) VALUES ($1, 'assistant', $2, $3)",
        )
        .bind(pending.chat_id)
        .bind(&pending.assistant_content)
        .bind(&metadata)
        .execute(&mut *tx)
        .await?;
    }

    if pending.usage.total_tokens > 0 || pending.usage.cost_usd > 0.0 {
        sqlx::query(
            "INSERT INTO chat_usage (chat_id, input_tokens, output_tokens, total_tokens, cost_usd) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(pending.chat_id)
        .bind(pending.usage.input_tokens as i32)
        .bind(pending.usage.output_tokens as i32)
        .bind(pending.usage.total_tokens as i32)
        .bind(pending.usage.cost_usd)
        .execute(&mut *tx)
        .await?;
    }

    if pending.sdk_session_id.is_some() && pending.sdk_session_id != pending.stored_sdk_session_id {
        sqlx::query("UPDATE chat_sessions SET sdk_session_id = $1 WHERE id = $2")
            .bind(&pending.sdk_session_id)
            .bind(pending.chat_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(chat_id = %pending.chat_id, events = pending.events.len(), "committed chat turn");
    Ok(())
}

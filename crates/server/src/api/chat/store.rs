//! Relational persistence for chat sessions, messages, events, and usage.
//!
//! Every query here runs against the shared `PgPool` in `AppState` — no
//! connection is held across request suspension points.

use sqlx::PgPool;
use uuid::Uuid;

use super::types::{title_from_prompt, MessageRow, SessionRow, CHAT_TITLE_PLACEHOLDER};

pub async fn find_session(pool: &PgPool, id: Uuid) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as::<_, SessionRow>(
        "SELECT id, title, agent_id, agent_name, sdk_session_id FROM chat_sessions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Resolves or creates the session for this turn, backfilling the title if
/// it was still the placeholder. Returns the session row and whether it was
/// just created.
pub async fn get_or_create_session(
    pool: &PgPool,
    id: Uuid,
    agent_id: &str,
    agent_name: &str,
    prompt: &str,
) -> Result<(SessionRow, bool), sqlx::Error> {
    if let Some(mut session) = find_session(pool, id).await? {
        if session.title.as_deref() == Some(CHAT_TITLE_PLACEHOLDER) {
            let title = title_from_prompt(prompt);
            sqlx::query("UPDATE chat_sessions SET title = $1, updated_at = now() WHERE id = $2")
                .bind(&title)
                .bind(id)
                .execute(pool)
                .await?;
            session.title = Some(title);
        }
        return Ok((session, false));
    }

    let title = title_from_prompt(prompt);
    sqlx::query(
        "INSERT INTO chat_sessions (id, title, agent_id, agent_name) VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(&title)
    .bind(agent_id)
    .bind(agent_name)
    .execute(pool)
    .await?;

    Ok((
        SessionRow {
            id,
            title: Some(title),
            agent_id: Some(agent_id.to_string()),
            agent_name: Some(agent_name.to_string()),
            sdk_session_id: None,
        },
        true,
    ))
}

pub async fn insert_user_message(pool: &PgPool, chat_id: Uuid, content: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO chat_messages (chat_id, role, content) VALUES ($1, 'user', $2)")
        .bind(chat_id)
        .bind(content)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE chat_sessions SET updated_at = now() WHERE id = $1")
        .bind(chat_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Loads every prior message for this session, oldest first. Callers
/// building worker history should not include the just-inserted user
/// message — filter it out by id or by count, not by re-querying.
pub async fn load_messages(pool: &PgPool, chat_id: Uuid) -> Result<Vec<MessageRow>, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>(
        "SELECT role, content FROM chat_messages WHERE chat_id = $1 ORDER BY created_at ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await
}

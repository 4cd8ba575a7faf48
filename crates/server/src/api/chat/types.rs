use serde::Deserialize;

pub const CHAT_TITLE_PLACEHOLDER: &str = "New Chat";

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Derive a session title from the opening prompt, matching the
/// `prompt[:50] + "..."` truncation rule used for every auto-named session.
pub fn title_from_prompt(prompt: &str) -> String {
    if prompt.chars().count() > 50 {
        let truncated: String = prompt.chars().take(50).collect();
        format!("{truncated}...")
    } else {
        prompt.to_string()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: uuid::Uuid,
    pub title: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub sdk_session_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub role: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompt_is_used_verbatim() {
        assert_eq!(title_from_prompt("hello there"), "hello there");
    }

    #[test]
    fn exactly_fifty_chars_is_not_truncated() {
        let prompt = "a".repeat(50);
        assert_eq!(title_from_prompt(&prompt), prompt);
    }

    #[test]
    fn long_prompt_is_truncated_with_ellipsis() {
        let prompt = "a".repeat(80);
        let title = title_from_prompt(&prompt);
        assert_eq!(title, format!("{}...", "a".repeat(50)));
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let prompt = "é".repeat(60);
        let title = title_from_prompt(&prompt);
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));
    }
}

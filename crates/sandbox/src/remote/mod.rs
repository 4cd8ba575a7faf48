mod docker;

pub use docker::DockerContainerProvider;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use crate::types::{AgentEvent, RunAgentRequest, SandboxError};

/// Abstraction over the concrete container SDK/CLI the remote backend talks
/// to. Kept pluggable because no concrete container-orchestration crate
/// exists as teacher/example grounding — the shipped implementation shells
/// out to the `docker` CLI, the one mechanism needing no unavailable
/// registry crate.
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    /// Reuse a container registered under `session_id` if one is alive and
    /// not past its timeout; otherwise create a fresh one from `image`.
    async fn ensure_container(
        &self,
        session_id: &str,
        image: &str,
        env: &std::collections::HashMap<String, String>,
        timeout_secs: u64,
        idle_timeout_secs: u64,
    ) -> Result<(), SandboxError>;

    /// Write `/workspace/prompt.txt` (and `history.txt` if present) into the
    /// container. Called on every run, including reuse, since a reused
    /// container must see the new turn's prompt.
    async fn write_workspace_files(&self, session_id: &str, prompt: &str, history: Option<&str>) -> Result<(), SandboxError>;

    /// Exec `command` inside the container and stream its stdout as
    /// `AgentEvent`s, synthesizing an `exit` event if the process exits
    /// non-zero.
    async fn exec_and_stream(&self, session_id: &str, command: &[String], tx: Sender<AgentEvent>) -> Result<(), SandboxError>;
}

/// Runs one agent turn against a reusable remote container.
///
/// Containers are deliberately not torn down after use — reuse across turns
/// in the same session relies on the provider's own idle/max-lifetime
/// eviction, matching how the original sandbox backend favors session
/// continuity over eager cleanup.
pub async fn run_agent(provider: &dyn ContainerProvider, req: RunAgentRequest, tx: Sender<AgentEvent>) {
    let Some(image) = req.image.clone() else {
        let _ = tx.send(AgentEvent::error("Agent has no configured image", None)).await;
        return;
    };

    let _ = tx.send(AgentEvent::status("Creating sandbox...")).await;
    if let Err(e) = provider
        .ensure_container(&req.session_id, &image, &req.env_vars, req.timeout_secs, req.idle_timeout_secs)
        .await
    {
        let (message, details) = classify_error(&e.to_string());
        let _ = tx.send(AgentEvent::error(message, Some(details))).await;
        return;
    }

    if let Err(e) = provider
        .write_workspace_files(&req.session_id, &req.prompt, req.history.as_deref())
        .await
    {
        let (message, details) = classify_error(&e.to_string());
        let _ = tx.send(AgentEvent::error(message, Some(details))).await;
        return;
    }
    let _ = tx.send(AgentEvent::status("Wrote prompt.txt and history.txt to sandbox")).await;

    let _ = tx.send(AgentEvent::status("Starting agent...")).await;
    if let Err(e) = provider.exec_and_stream(&req.session_id, &req.command, tx.clone()).await {
        let (message, details) = classify_error(&e.to_string());
        let _ = tx.send(AgentEvent::error(message, Some(details))).await;
    }
}

/// Best-effort classification of container-provider failures into a message
/// safe to show a user. Substring matching on the underlying error text is
/// brittle by nature — there is no typed error taxonomy to switch to without
/// a concrete container SDK crate to depend on, so this mirrors the original
/// sandbox backend's approach rather than inventing one.
fn classify_error(error_msg: &str) -> (String, String) {
    let lower = error_msg.to_lowercase();
    let message = if error_msg.contains("Image build") {
        "Failed to build agent image. Please check agent configuration.".to_string()
    } else if error_msg.contains("Token missing") || lower.contains("authenticate") {
        "Container registry authentication failed. Please check your credentials.".to_string()
    } else if lower.contains("not found") {
        "Agent image not found. Please check the image URL.".to_string()
    } else {
        format!("Agent execution failed: {error_msg}")
    };
    (message, error_msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_image_build_failures() {
        let (message, _) = classify_error("Image build failed: missing layer");
        assert_eq!(message, "Failed to build agent image. Please check agent configuration.");
    }

    #[test]
    fn classifies_auth_failures() {
        let (message, _) = classify_error("Token missing for registry");
        assert!(message.contains("authentication failed"));
    }

    #[test]
    fn classifies_not_found() {
        let (message, _) = classify_error("image not found: registry.example/foo:latest");
        assert!(message.contains("image not found"));
    }

    #[test]
    fn falls_back_to_generic_message() {
        let (message, _) = classify_error("connection reset by peer");
        assert_eq!(message, "Agent execution failed: connection reset by peer");
    }
}

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::Sender;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{AgentEvent, RunAgentRequest, SandboxError};

/// Runs one agent turn as a local subprocess.
///
/// Lays out `<agents_root>/<agent_id>/workspace/<session_id>/` with
/// `prompt.txt` and (if there's history) `history.txt`, points
/// `AGENT_WORKSPACE` at it, and streams the worker's stdout line-by-line as
/// `AgentEvent`s. Stderr is drained on its own task concurrently with stdout
/// — if it were read only after the worker exits, a worker that fills its
/// stderr pipe before producing output would deadlock on the write.
pub async fn run_agent(agents_root: &Path, req: RunAgentRequest, tx: Sender<AgentEvent>) {
    let agent_dir = agents_root.join(&req.agent_id);
    if !agent_dir.exists() {
        let _ = tx.send(AgentEvent::error(format!("Agent path not found: {}", req.agent_id), None)).await;
        return;
    }

    let workspace = agent_dir.join("workspace").join(&req.session_id);
    if let Err(e) = std::fs::create_dir_all(&workspace) {
        let _ = tx.send(AgentEvent::error(format!("Failed to prepare workspace: {e}"), None)).await;
        return;
    }
    if let Err(e) = std::fs::write(workspace.join("prompt.txt"), &req.prompt) {
        let _ = tx.send(AgentEvent::error(format!("Failed to write prompt: {e}"), None)).await;
        return;
    }
    if let Some(history) = &req.history {
        if let Err(e) = std::fs::write(workspace.join("history.txt"), history) {
            let _ = tx.send(AgentEvent::error(format!("Failed to write history: {e}"), None)).await;
            return;
        }
    }

    let _ = tx.send(AgentEvent::status("Starting agent locally...")).await;

    let Some((program, args)) = req.command.split_first() else {
        let _ = tx.send(AgentEvent::error("Agent command is empty", None)).await;
        return;
    };

    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.extend(req.env_vars.clone());
    env.insert("AGENT_WORKSPACE".to_string(), workspace.display().to_string());

    let mut child = match Command::new(program)
        .args(args)
        .current_dir(&agent_dir)
        .envs(&env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.send(AgentEvent::error(format!("Failed to start agent: {e}"), None)).await;
            return;
        }
    };

    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");

    let (cancel_tx, mut cancel_rx) = tokio::sync::oneshot::channel::<()>();
    let stdout_tx = tx.clone();
    let stdout_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut cancel_tx = Some(cancel_tx);
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let event = parse_worker_line(&line);
                    if stdout_tx.send(event).await.is_err() {
                        // consumer dropped the receiver — signal the main task to kill the child
                        if let Some(cancel_tx) = cancel_tx.take() {
                            let _ = cancel_tx.send(());
                        }
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "error reading agent stdout");
                    break;
                }
            }
        }
    });

    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut collected = Vec::new();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(stderr = %line, "agent stderr");
                    collected.push(line);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        collected
    });

    let timeout = Duration::from_secs(req.timeout_secs);
    let wait_result = tokio::select! {
        res = tokio::time::timeout(timeout, child.wait()) => res,
        _ = &mut cancel_rx => {
            warn!(session = %req.session_id, "consumer cancelled stream, killing agent process");
            let _ = child.start_kill();
            Ok(child.wait().await)
        }
    };
    let _ = stdout_task.await;
    let stderr_lines = stderr_task.await.unwrap_or_default();

    match wait_result {
        Err(_) => {
            warn!(session = %req.session_id, "agent exceeded timeout, killing");
            let _ = tx.send(AgentEvent::error("Agent execution timed out", None)).await;
        }
        Ok(Err(e)) => {
            let _ = tx.send(AgentEvent::error(format!("Failed waiting for agent process: {e}"), None)).await;
        }
        Ok(Ok(status)) => {
            if !status.success() {
                let stderr_text = stderr_lines.join("\n");
                let code = status.code().unwrap_or(-1);
                let message = if stderr_text.is_empty() {
                    format!("Agent exited with code {code}")
                } else {
                    format!("Agent exited with code {code}: {stderr_text}")
                };
                let _ = tx.send(AgentEvent::error(message, Some(stderr_text))).await;
            } else {
                info!(session = %req.session_id, "agent exited successfully");
            }
        }
    }
}

fn parse_worker_line(line: &str) -> AgentEvent {
    match serde_json::from_str::<AgentEvent>(line) {
        Ok(event) => event,
        Err(_) => AgentEvent::new("raw", serde_json::json!({ "content": line })),
    }
}

#[allow(dead_code)]
pub(crate) fn sandbox_error_from_spawn(e: std::io::Error) -> SandboxError {
    SandboxError::SpawnFailed(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streams_status_and_parsed_json_lines() {
        let root = tempfile::tempdir().unwrap();
        let agent_dir = root.path().join("echo-agent");
        std::fs::create_dir_all(&agent_dir).unwrap();

        let req = RunAgentRequest {
            session_id: "sess-1".to_string(),
            agent_id: "echo-agent".to_string(),
            image: None,
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                r#"echo '{"type":"start","data":{}}'; echo '{"type":"done","data":{}}'"#.to_string(),
            ],
            prompt: "hello".to_string(),
            history: None,
            env_vars: HashMap::new(),
            timeout_secs: 10,
            idle_timeout_secs: 10,
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel(32);
        run_agent(root.path(), req, tx).await;

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }

        assert_eq!(events[0].r#type, "status");
        assert_eq!(events[1].r#type, "start");
        assert_eq!(events[2].r#type, "done");
    }

    #[tokio::test]
    async fn missing_agent_path_emits_error() {
        let root = tempfile::tempdir().unwrap();
        let req = RunAgentRequest {
            session_id: "sess-1".to_string(),
            agent_id: "nonexistent".to_string(),
            image: None,
            command: vec!["true".to_string()],
            prompt: String::new(),
            history: None,
            env_vars: HashMap::new(),
            timeout_secs: 10,
            idle_timeout_secs: 10,
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        run_agent(root.path(), req, tx).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.r#type, "error");
    }

    #[tokio::test]
    async fn nonzero_exit_synthesizes_error_event() {
        let root = tempfile::tempdir().unwrap();
        let agent_dir = root.path().join("fail-agent");
        std::fs::create_dir_all(&agent_dir).unwrap();

        let req = RunAgentRequest {
            session_id: "sess-2".to_string(),
            agent_id: "fail-agent".to_string(),
            image: None,
            command: vec!["sh".to_string(), "-c".to_string(), "echo oops 1>&2; exit 3".to_string()],
            prompt: String::new(),
            history: None,
            env_vars: HashMap::new(),
            timeout_secs: 10,
            idle_timeout_secs: 10,
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel(32);
        run_agent(root.path(), req, tx).await;

        let mut last_error = None;
        while let Some(e) = rx.recv().await {
            if e.r#type == "error" {
                last_error = Some(e);
            }
        }
        let error = last_error.unwrap();
        assert!(error.data["message"].as_str().unwrap().contains("exited with code 3"));
    }
}

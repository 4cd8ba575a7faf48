use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use super::ContainerProvider;
use crate::types::{AgentEvent, SandboxError};

struct ContainerHandle {
    created_at: Instant,
    last_used: Instant,
}

/// Remote backend implemented by shelling out to the `docker` CLI.
///
/// Containers are named after the session id and reused across turns in the
/// same session; `registry` tracks each live container's age and idle time
/// so `ensure_container` knows when to recreate instead of reuse.
pub struct DockerContainerProvider {
    registry: Mutex<HashMap<String, ContainerHandle>>,
}

impl DockerContainerProvider {
    pub fn new() -> Self {
        Self { registry: Mutex::new(HashMap::new()) }
    }

    fn container_name(session_id: &str) -> String {
        format!("agent-{session_id}")
    }

    async fn is_running(name: &str) -> bool {
        let output = Command::new("docker")
            .args(["inspect", "--format", "{{.State.Running}}", name])
            .output()
            .await;
        matches!(output, Ok(out) if out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
    }

    async fn remove(name: &str) {
        let _ = Command::new("docker").args(["rm", "-f", name]).output().await;
    }
}

impl Default for DockerContainerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerProvider for DockerContainerProvider {
    async fn ensure_container(
        &self,
        session_id: &str,
        image: &str,
        env: &HashMap<String, String>,
        timeout_secs: u64,
        idle_timeout_secs: u64,
    ) -> Result<(), SandboxError> {
        let name = Self::container_name(session_id);

        let reusable = {
            let registry = self.registry.lock().unwrap();
            registry.get(&name).map(|h| {
                h.created_at.elapsed() < Duration::from_secs(timeout_secs)
                    && h.last_used.elapsed() < Duration::from_secs(idle_timeout_secs)
            })
        };

        if reusable == Some(true) && Self::is_running(&name).await {
            debug!(container = %name, "reusing live container");
            self.registry.lock().unwrap().get_mut(&name).unwrap().last_used = Instant::now();
            return Ok(());
        }

        // Dead, expired, or never created — replace it.
        Self::remove(&name).await;

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.clone(),
            "-w".to_string(),
            "/workspace".to_string(),
            "-e".to_string(),
            "PYTHONUNBUFFERED=1".to_string(),
        ];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(image.to_string());
        args.push("sleep".to_string());
        args.push("infinity".to_string());

        let output = Command::new("docker")
            .args(&args)
            .output()
            .await
            .map_err(|e| SandboxError::Container(format!("failed to spawn docker run: {e}")))?;

        if !output.status.success() {
            return Err(SandboxError::Container(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        Command::new("docker")
            .args(["exec", &name, "mkdir", "-p", "/workspace"])
            .output()
            .await
            .map_err(|e| SandboxError::Container(format!("failed to prepare workspace: {e}")))?;

        self.registry.lock().unwrap().insert(
            name,
            ContainerHandle { created_at: Instant::now(), last_used: Instant::now() },
        );
        Ok(())
    }

    async fn write_workspace_files(&self, session_id: &str, prompt: &str, history: Option<&str>) -> Result<(), SandboxError> {
        let name = Self::container_name(session_id);
        write_file_via_stdin(&name, "/workspace/prompt.txt", prompt).await?;
        if let Some(history) = history {
            write_file_via_stdin(&name, "/workspace/history.txt", history).await?;
        }
        Ok(())
    }

    async fn exec_and_stream(&self, session_id: &str, command: &[String], tx: Sender<AgentEvent>) -> Result<(), SandboxError> {
        let name = Self::container_name(session_id);
        let mut args = vec!["exec".to_string(), name.clone()];
        args.extend(command.iter().cloned());

        let mut child = Command::new("docker")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Container(format!("failed to exec in container: {e}")))?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let stdout_tx = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let event = match serde_json::from_str::<AgentEvent>(&line) {
                    Ok(event) => event,
                    Err(_) => AgentEvent::new("raw", serde_json::json!({ "line": line })),
                };
                if stdout_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(stderr = %line, "container exec stderr");
                collected.push(line);
            }
            collected
        });

        let status = child
            .wait()
            .await
            .map_err(|e| SandboxError::Container(format!("failed waiting for exec: {e}")))?;
        let _ = stdout_task.await;
        let stderr_lines = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            warn!(session = %session_id, code, "agent exec exited non-zero");
            let _ = tx
                .send(AgentEvent::new("exit", serde_json::json!({ "returncode": code, "stderr": stderr_lines.join("\n") })))
                .await;
        } else {
            info!(session = %session_id, "agent exec completed");
        }

        Ok(())
    }
}

async fn write_file_via_stdin(container: &str, path: &str, contents: &str) -> Result<(), SandboxError> {
    let mut child = Command::new("docker")
        .args(["exec", "-i", container, "sh", "-c", &format!("cat > {path}")])
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| SandboxError::Container(format!("failed to write {path}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(contents.as_bytes())
            .await
            .map_err(|e| SandboxError::Container(format!("failed to write {path}: {e}")))?;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| SandboxError::Container(format!("failed to write {path}: {e}")))?;
    if !status.success() {
        return Err(SandboxError::Container(format!("writing {path} exited non-zero")));
    }
    Ok(())
}

//! Agent descriptors: the YAML files under `agents/<id>/agent.yaml` that
//! tell the gateway how to run a given agent's worker.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Env vars the gateway is willing to forward into an agent's sandbox. An
/// agent descriptor can only request names on this list — it never gets to
/// name an arbitrary process env var and have it leaked into the sandbox.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GOOGLE_API_KEY",
    "GEMINI_API_KEY",
    "MISTRAL_API_KEY",
    "COHERE_API_KEY",
    "HUGGINGFACE_API_KEY",
    "GROQ_API_KEY",
    "TAVILY_API_KEY",
];

fn default_command() -> Vec<String> {
    vec!["python".to_string(), "/app/run_agent.py".to_string()]
}

fn default_framework() -> String {
    "claude".to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_idle_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize)]
struct AgentYaml {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default = "default_framework")]
    framework: String,
    image: Option<String>,
    command: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    #[serde(default)]
    env_vars: Vec<String>,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_idle_timeout")]
    idle_timeout: u64,
}

/// Metadata describing one agent, loaded from its `agent.yaml`.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub framework: String,
    pub image: Option<String>,
    pub command: Vec<String>,
    pub env_vars: Vec<String>,
    pub timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("agent config not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, serde_yaml::Error),
}

impl AgentDescriptor {
    /// Load `<agents_dir>/<agent_id>/agent.yaml`.
    pub fn load(agents_dir: &Path, agent_id: &str) -> Result<Self, DescriptorError> {
        let config_path = agents_dir.join(agent_id).join("agent.yaml");
        if !config_path.exists() {
            return Err(DescriptorError::NotFound(config_path));
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DescriptorError::Io(config_path.clone(), e))?;
        let parsed: AgentYaml =
            serde_yaml::from_str(&content).map_err(|e| DescriptorError::Parse(config_path.clone(), e))?;

        let command = parsed.command.or(parsed.entrypoint).unwrap_or_else(default_command);

        Ok(Self {
            id: agent_id.to_string(),
            name: parsed.name.unwrap_or_else(|| agent_id.to_string()),
            description: parsed.description,
            framework: parsed.framework,
            image: parsed.image,
            command,
            env_vars: parsed.env_vars,
            timeout_secs: parsed.timeout,
            idle_timeout_secs: parsed.idle_timeout,
        })
    }

    /// List every agent descriptor under `agents_dir`, sorted by name.
    pub fn list(agents_dir: &Path) -> Vec<Self> {
        let Ok(entries) = std::fs::read_dir(agents_dir) else {
            warn!(dir = %agents_dir.display(), "agents directory not found");
            return Vec::new();
        };

        let mut agents: Vec<Self> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let id = entry.file_name().to_string_lossy().into_owned();
                if id.starts_with('.') {
                    return None;
                }
                Self::load(agents_dir, &id).ok()
            })
            .collect();

        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    /// Resolve this descriptor's declared `env_vars` against the process
    /// environment, dropping anything not on [`ALLOWED_ENV_VARS`] or unset.
    pub fn resolve_env_vars(&self) -> HashMap<String, String> {
        let mut resolved = HashMap::new();
        for name in &self.env_vars {
            if !ALLOWED_ENV_VARS.contains(&name.as_str()) {
                warn!(agent = %self.id, var = %name, "agent requested non-whitelisted env var");
                continue;
            }
            match std::env::var(name) {
                Ok(value) if !value.is_empty() => {
                    info!(agent = %self.id, var = %name, "resolved env var for agent");
                    resolved.insert(name.clone(), value);
                }
                _ => warn!(agent = %self.id, var = %name, "agent requires env var but it is not set"),
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_agent(dir: &Path, id: &str, yaml: &str) {
        let agent_dir = dir.join(id);
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(agent_dir.join("agent.yaml"), yaml).unwrap();
    }

    #[test]
    fn loads_full_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(
            dir.path(),
            "hello-world",
            r#"
name: Hello World
description: A test agent
framework: claude
image: registry.example/hello:latest
command: ["python", "/app/run_agent.py"]
env_vars: ["ANTHROPIC_API_KEY"]
timeout: 300
idle_timeout: 60
"#,
        );

        let descriptor = AgentDescriptor::load(dir.path(), "hello-world").unwrap();
        assert_eq!(descriptor.name, "Hello World");
        assert_eq!(descriptor.image.as_deref(), Some("registry.example/hello:latest"));
        assert_eq!(descriptor.timeout_secs, 300);
    }

    #[test]
    fn entrypoint_field_is_accepted_as_command_alias() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "alt", "name: alt\nentrypoint: [\"node\", \"index.js\"]\n");

        let descriptor = AgentDescriptor::load(dir.path(), "alt").unwrap();
        assert_eq!(descriptor.command, vec!["node".to_string(), "index.js".to_string()]);
    }

    #[test]
    fn missing_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentDescriptor::load(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, DescriptorError::NotFound(_)));
    }

    #[test]
    fn resolve_env_vars_drops_non_whitelisted() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(
            dir.path(),
            "agent",
            "name: agent\nenv_vars: [\"ANTHROPIC_API_KEY\", \"SOME_SECRET\"]\n",
        );
        std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        std::env::remove_var("SOME_SECRET");

        let descriptor = AgentDescriptor::load(dir.path(), "agent").unwrap();
        let resolved = descriptor.resolve_env_vars();
        assert_eq!(resolved.get("ANTHROPIC_API_KEY").map(String::as_str), Some("test-key"));
        assert!(!resolved.contains_key("SOME_SECRET"));
    }

    #[test]
    fn list_sorts_by_name_and_skips_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "zeta", "name: Zeta\n");
        write_agent(dir.path(), "alpha", "name: Alpha\n");
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let agents = AgentDescriptor::list(dir.path());
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "Alpha");
        assert_eq!(agents[1].name, "Zeta");
    }
}

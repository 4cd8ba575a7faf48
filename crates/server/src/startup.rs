//! Server startup: shared state initialization.

use std::sync::Arc;

use tracing::warn;

use crate::db;
use crate::state::AppState;

/// Build `AppState`: the PostgreSQL pool backing chat persistence, the
/// directory of agent descriptors, and the remote sandbox backend.
pub async fn build_app_state(config: &stupid_core::Config) -> anyhow::Result<Arc<AppState>> {
    let pg_pool = db::init_pg_pool(&config.postgres).await;

    let agents_dir = std::env::var("CHAT_AGENTS_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| config.storage.data_dir.join("chat-agents"));
    if !agents_dir.exists() {
        warn!(
            "chat agents directory not found at {} — chat gateway will report no agents until one is added",
            agents_dir.display()
        );
    }

    let container_provider: Option<Arc<dyn stupid_sandbox::ContainerProvider>> =
        Some(Arc::new(stupid_sandbox::remote::DockerContainerProvider::new()));

    Ok(Arc::new(AppState {
        pg_pool,
        agents_dir,
        container_provider,
    }))
}

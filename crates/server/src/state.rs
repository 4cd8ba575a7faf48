use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    /// PostgreSQL connection pool backing chat session/message/event persistence.
    pub pg_pool: Option<sqlx::PgPool>,
    /// Directory of `agent.yaml` descriptors for the chat gateway's sandboxed agent workers.
    pub agents_dir: PathBuf,
    /// Remote sandbox backend for agents with a configured container image.
    pub container_provider: Option<Arc<dyn stupid_sandbox::ContainerProvider>>,
}

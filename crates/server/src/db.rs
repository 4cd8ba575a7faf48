use sqlx::PgPool;
use tracing::{info, warn};

/// Create a PostgreSQL connection pool and run migrations.
/// Returns None if no PG_USERNAME is configured.
pub async fn init_pg_pool(config: &stupid_core::config::PostgresConfig) -> Option<PgPool> {
    if !config.is_configured() {
        info!("PostgreSQL not configured (PG_USERNAME unset) — chat persistence disabled");
        return None;
    }
    let url = config.connection_string();
    // Log URL with password masked for debugging connection issues
    let masked = if let Some(at_pos) = url.find('@') {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        format!("{}***@{}", &url[..scheme_end], &url[at_pos + 1..])
    } else {
        url.clone()
    };
    info!("Connecting to PostgreSQL: {}", masked);

    match PgPool::connect(&url).await {
        Ok(pool) => {
            info!("PostgreSQL connected");
            match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(_) => {
                    info!("Database migrations applied successfully");
                    Some(pool)
                }
                Err(e) => {
                    warn!("Failed to run migrations: {} — chat persistence disabled", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("Failed to connect to PostgreSQL: {} — chat persistence disabled", e);
            None
        }
    }
}

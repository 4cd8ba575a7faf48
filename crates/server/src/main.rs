mod api;
mod app_config;
mod commit;
mod db;
mod router;
mod startup;
mod state;

use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = app_config::load_config();

    info!("Starting stupid-db server...");
    let state = startup::build_app_state(&config).await?;

    let app = router::build_router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("server error: {}", e);
    }

    Ok(())
}

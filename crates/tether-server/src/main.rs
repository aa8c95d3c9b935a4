use std::sync::Arc;

use tracing::{info, warn};

use tether_db::Database;
use tether_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug,tower_http=debug".into()),
        )
        .init();

    if config.uses_dev_secret() {
        warn!("TETHER_JWT_SECRET is not set, using the development secret");
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    let app = tether_server::build_app(db, &config);

    let addr = config.addr()?;
    info!("Tether server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

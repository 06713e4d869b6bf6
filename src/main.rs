use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use utxo_indexer::api::build_router;
use utxo_indexer::config::{get_global_config, init_global_config};
use utxo_indexer::engine::Engine;
use utxo_indexer::metrics;
use utxo_indexer::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_global_config()?;
    let config = get_global_config();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    metrics::register_all()?;

    let store = match Store::open(&config.db_path) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(%err, path = %config.db_path, "failed to open store");
            std::process::exit(1);
        }
    };

    let engine = match Engine::new(Arc::new(store)) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            tracing::error!(%err, "failed to recover engine state from store");
            std::process::exit(1);
        }
    };

    let app = build_router(engine);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

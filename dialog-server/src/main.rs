use std::sync::Arc;
use std::time::Duration;

use dialog_core::engine::{compile, Engine};
use dialog_core::store::VariableStore;
use dialog_core::store_sqlite::SqliteStore;
use tracing_subscriber::EnvFilter;

use dialog_server::config::DialogConfig;
use dialog_server::http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = DialogConfig::load()?;

    let sources: Vec<String> = config
        .source
        .iter()
        .map(|path| {
            std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))
        })
        .collect::<Result<_, _>>()?;

    let (schema, graph) = compile(&sources)?;
    tracing::info!(states = graph.len(), "script compiled");

    let store: Arc<dyn VariableStore> =
        Arc::new(SqliteStore::connect(&config.db_path, schema, config.fresh_db).await?);

    let engine = Arc::new(Engine::new(
        graph,
        store,
        config.key.clone().into_bytes(),
        Duration::from_secs(config.session_ttl_seconds),
    ));

    let app = http::router(engine);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "dialog-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

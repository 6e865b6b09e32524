use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use cyberquiz_backend::{
    config::{get_config, init_config},
    database::pool::{create_pool, run_migrations},
    middleware::cors::admin_cors,
    routes, telemetry, AppState,
    services::vector_index::{MemoryVectorIndex, QdrantIndex, VectorIndex},
};
use reqwest::Client;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    run_migrations(&pool).await?;

    let http_client = Client::builder()
        .timeout(Duration::from_secs(config.llm_timeout_secs + 30))
        .build()?;

    let index: Arc<dyn VectorIndex> = match &config.qdrant_url {
        Some(url) => {
            let qdrant = QdrantIndex::new(
                http_client.clone(),
                url.clone(),
                config.qdrant_collection.clone(),
            );
            qdrant.ensure_collection(config.embedding_dimensions).await?;
            info!(url = %url, collection = %config.qdrant_collection, "Using Qdrant vector index");
            Arc::new(qdrant)
        }
        None => {
            tracing::warn!("QDRANT_URL not set, using in-process vector index (not persisted)");
            Arc::new(MemoryVectorIndex::new())
        }
    };

    let app_state = AppState::new(pool, http_client, index);

    {
        let buffer = app_state.buffer.clone();
        let queued = buffer.ensure_filled().await;
        info!(queued, "Startup buffer check complete");
    }

    {
        // Safety net for shortfalls no admin action re-triggers.
        let buffer = app_state.buffer.clone();
        let period = Duration::from_secs(config.refill_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let queued = buffer.ensure_filled().await;
                if queued > 0 {
                    info!(queued, "Periodic refill queued jobs");
                }
            }
        });
    }

    let app = routes::app(app_state.clone(), config.admin_rps)
        .layer(admin_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown requested, waiting for the running generation job");
    if tokio::time::timeout(Duration::from_secs(30), state.buffer.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!("Generation still running at shutdown; abandoning it");
    }
}

//! RAG Server binary
//!
//! Run with: cargo run -p tenant-rag --bin tenant-rag-server

use tenant_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenant_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RagConfig::from_env_or_default()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Blob directory: {}", config.storage.blob_dir.display());
    tracing::info!("  - Embedding model: {} ({} dims)", config.embeddings.model, config.embeddings.dimensions);
    tracing::info!("  - Layout model: {}", config.extraction.model_id);
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );

    let server = RagServer::new(config).await?;

    let clients = server.state().clients();
    for (name, healthy) in [
        ("layout", clients.collaborators.layout.health_check().await),
        ("embeddings", clients.collaborators.embeddings.health_check().await),
    ] {
        match healthy {
            Ok(true) => tracing::info!("{} service reachable", name),
            Ok(false) => tracing::warn!("{} service reported unhealthy", name),
            Err(e) => tracing::warn!("{} service not available: {}", name, e),
        }
    }

    tracing::info!("API info: http://{}/api/info", server.address());
    server.start().await?;

    Ok(())
}

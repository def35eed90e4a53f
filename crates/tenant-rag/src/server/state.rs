//! Application state for the RAG server
//!
//! Service clients live in an immutable [`ClientBundle`]. Handlers take a snapshot
//! with [`AppState::clients`]; [`AppState::swap_clients`] replaces the whole bundle
//! at once, so no request ever sees a half-updated set of clients.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::embeddings::{Embedder, RetryPolicy};
use crate::error::Result;
use crate::ingestion::{ContentExtractor, IngestPipeline, TextChunker};
use crate::providers::{
    BlobStore, DocumentIntelligenceClient, EmbeddingProvider, LayoutAnalyzer, LocalBlobStore,
    OpenAiEmbeddingClient, SearchBackend,
};
use crate::retrieval::{CitationResolver, HybridSearcher};
use crate::storage::{Database, DocumentStore, SearchIndex, SqliteSearchBackend};

/// External services the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub blobs: Arc<dyn BlobStore>,
    pub layout: Arc<dyn LayoutAnalyzer>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub search: Arc<dyn SearchBackend>,
}

impl Collaborators {
    /// Concrete clients described by the configuration
    pub async fn from_config(config: &RagConfig, db: &Database) -> Result<Self> {
        let blobs = Arc::new(LocalBlobStore::new(&config.storage.blob_dir).await?);
        let layout = Arc::new(DocumentIntelligenceClient::new(&config.extraction)?);
        let embeddings = Arc::new(OpenAiEmbeddingClient::new(&config.embeddings)?);
        let search = Arc::new(SqliteSearchBackend::new(db.clone(), config.search.hybrid_alpha));

        tracing::info!(
            "Collaborators: blobs={}, layout={}, embeddings={}, search={}",
            blobs.name(),
            layout.name(),
            embeddings.name(),
            search.name()
        );

        Ok(Self {
            blobs,
            layout,
            embeddings,
            search,
        })
    }
}

/// Everything a request needs, wired once and never mutated
pub struct ClientBundle {
    pub pipeline: IngestPipeline,
    pub searcher: HybridSearcher,
    pub resolver: CitationResolver,
    pub documents: DocumentStore,
    pub collaborators: Collaborators,
}

impl ClientBundle {
    pub fn build(config: &RagConfig, db: Database, collaborators: Collaborators) -> Self {
        let index = SearchIndex::new(collaborators.search.clone(), config.search.index_batch_size);
        let documents = DocumentStore::new(db, collaborators.blobs.clone(), index.clone());
        let embedder = Arc::new(Embedder::new(
            collaborators.embeddings.clone(),
            RetryPolicy::from_config(&config.embeddings),
        ));

        let pipeline = IngestPipeline::new(
            config.upload.clone(),
            ContentExtractor::new(collaborators.layout.clone(), config.extraction.clone()),
            TextChunker::from_config(&config.chunking),
            embedder.clone(),
            documents.clone(),
            index.clone(),
        );
        let searcher = HybridSearcher::new(embedder, index.clone());
        let resolver = CitationResolver::new(index, documents.clone(), config.search.citation_candidates);

        Self {
            pipeline,
            searcher,
            resolver,
            documents,
            collaborators,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Current client bundle
    clients: RwLock<Arc<ClientBundle>>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Open storage and connect the configured services
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let db = Database::open(&config.storage.database_path)?;
        tracing::info!("Database opened at {}", config.storage.database_path.display());

        let collaborators = Collaborators::from_config(&config, &db).await?;
        let bundle = ClientBundle::build(&config, db, collaborators);

        let state = Self::with_clients(config, bundle);
        state.set_ready(true);
        tracing::info!("Application state initialized");
        Ok(state)
    }

    /// State around an already built bundle
    pub fn with_clients(config: RagConfig, bundle: ClientBundle) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                clients: RwLock::new(Arc::new(bundle)),
                ready: RwLock::new(false),
            }),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Snapshot of the current clients
    pub fn clients(&self) -> Arc<ClientBundle> {
        self.inner.clients.read().clone()
    }

    /// Replace the client bundle, returning the previous one
    pub fn swap_clients(&self, bundle: ClientBundle) -> Arc<ClientBundle> {
        let next = Arc::new(bundle);
        let previous = std::mem::replace(&mut *self.inner.clients.write(), next);
        tracing::info!("Client bundle swapped");
        previous
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}

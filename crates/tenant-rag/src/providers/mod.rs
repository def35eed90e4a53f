//! Provider abstractions for the managed services the pipeline talks to
//!
//! Blob storage, layout analysis, embeddings and chunk search are each a trait so the
//! pipeline can run against local implementations or test fakes.

pub mod blob_store;
pub mod document_intelligence;
pub mod embedding;
pub mod layout;
pub mod local;
pub mod search_backend;

pub use blob_store::{BlobProperties, BlobStore};
pub use document_intelligence::DocumentIntelligenceClient;
pub use embedding::{EmbeddingProvider, OpenAiEmbeddingClient};
pub use layout::{AnalyzeOperation, AnalyzeStatus, LayoutAnalyzer, LayoutLine, LayoutPage, LayoutResult};
pub use local::LocalBlobStore;
pub use search_backend::{FilterField, FilterValue, ScoredChunk, SearchBackend, SearchFilter, SearchQuery};

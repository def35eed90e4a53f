//! tenant-rag: Multi-tenant document ingestion and hybrid retrieval with citations
//!
//! Uploads are stored as versioned documents in a personal, group or default scope,
//! extracted into pages, chunked, embedded and indexed. Retrieval fans a hybrid
//! keyword/vector search out over every scope the caller can see, and citation tokens
//! in generated answers resolve back to the cited chunk and its source file.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use types::{
    citation::{CitationRequest, ResolvedCitation},
    document::{Chunk, DocumentMetadata, FileType, Scope},
    search::{RetrievedChunk, SearchRequest, SearchScope},
};

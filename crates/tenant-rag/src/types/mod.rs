//! Core types for the tenant RAG backend

pub mod citation;
pub mod document;
pub mod extraction;
pub mod search;

pub use citation::{CitationRequest, DocumentSource, ResolvedCitation, WorkspaceType};
pub use document::{Chunk, DocumentMetadata, FileType, IndexKind, Scope};
pub use extraction::{ExtractionOutcome, ExtractionResult, PageText};
pub use search::{RetrievedChunk, SearchRequest, SearchScope};

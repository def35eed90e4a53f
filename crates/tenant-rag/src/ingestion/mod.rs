//! Document ingestion: extraction, page-aware chunking and the upload pipeline

mod chunker;
mod extractor;
mod pipeline;

pub use chunker::{PageChunk, TextChunker, NO_PAGES_TEXT, NO_USABLE_CONTENT_TEXT};
pub use extractor::ContentExtractor;
pub use pipeline::{IngestPipeline, IngestReport};

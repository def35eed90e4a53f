//! Ingestion pipeline orchestration
//!
//! upload → blob store → extract → chunk → metadata record → embed → index.
//! Validation happens before any side effect. Failures after the metadata record is
//! written only degrade searchability; failures before it roll the blob back.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

use crate::config::UploadConfig;
use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::storage::{DocumentStore, SearchIndex};
use crate::types::document::{content_type_for, extension_of};
use crate::types::{Chunk, DocumentMetadata, ExtractionOutcome, Scope};

use super::chunker::{PageChunk, TextChunker};
use super::extractor::ContentExtractor;

/// What happened to one upload
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub metadata: DocumentMetadata,
    pub chunks_created: usize,
    /// Chunks stored without a vector
    pub embeddings_failed: usize,
    pub chunks_indexed: usize,
    pub failed_batches: usize,
    pub extraction: ExtractionOutcome,
}

/// Main ingestion pipeline
pub struct IngestPipeline {
    upload: UploadConfig,
    extractor: ContentExtractor,
    chunker: TextChunker,
    embedder: Arc<Embedder>,
    documents: DocumentStore,
    index: SearchIndex,
}

impl IngestPipeline {
    pub fn new(
        upload: UploadConfig,
        extractor: ContentExtractor,
        chunker: TextChunker,
        embedder: Arc<Embedder>,
        documents: DocumentStore,
        index: SearchIndex,
    ) -> Self {
        Self {
            upload,
            extractor,
            chunker,
            embedder,
            documents,
            index,
        }
    }

    /// Reject uploads by extension and size
    pub fn validate(&self, file_name: &str, size: u64) -> Result<()> {
        let ext = extension_of(file_name)
            .ok_or_else(|| Error::UnsupportedFileType(file_name.to_string()))?;
        if !self.upload.is_allowed(&ext) {
            return Err(Error::UnsupportedFileType(ext));
        }

        let max = self.upload.max_file_size_bytes();
        if size > max {
            return Err(Error::FileTooLarge { size, max });
        }
        Ok(())
    }

    /// Ingest one upload into `scope`
    pub async fn process_upload(&self, data: Bytes, file_name: &str, scope: &Scope) -> Result<IngestReport> {
        self.validate(file_name, data.len() as u64)?;

        tracing::info!("[{}] Ingesting {} bytes into {}", file_name, data.len(), scope);

        let locator = self
            .documents
            .blobs()
            .put(file_name, data.clone(), &content_type_for(file_name))
            .await?;

        match self.ingest_stored(&data, file_name, scope, &locator).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!("[{}] Ingestion failed, removing blob {}: {}", file_name, locator, e);
                if let Err(cleanup) = self.documents.blobs().delete(&locator).await {
                    tracing::warn!("[{}] Blob rollback failed: {}", file_name, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn ingest_stored(
        &self,
        data: &[u8],
        file_name: &str,
        scope: &Scope,
        locator: &str,
    ) -> Result<IngestReport> {
        let extracted = self.extractor.extract(file_name, data).await;
        let pieces = self.chunker.chunk(&extracted.pages);

        let metadata = self
            .documents
            .create_version(file_name, scope, locator, pieces.len() as u32)?;

        let (chunks, embeddings_failed) = self.embed_chunks(&metadata, pieces).await;
        if embeddings_failed > 0 {
            tracing::warn!(
                "[{}] {} of {} chunks have no embedding",
                file_name,
                embeddings_failed,
                chunks.len()
            );
        }

        let indexed = self.index.index_chunks(&chunks).await;

        tracing::info!(
            "[{}] v{} ingested: {} chunks, {} indexed",
            file_name,
            metadata.version,
            chunks.len(),
            indexed.indexed
        );

        Ok(IngestReport {
            document_id: metadata.id.clone(),
            chunks_created: chunks.len(),
            embeddings_failed,
            chunks_indexed: indexed.indexed,
            failed_batches: indexed.failed_batches,
            extraction: extracted.outcome,
            metadata,
        })
    }

    /// Embed chunks in sequence order; a missing vector is counted, not fatal
    async fn embed_chunks(&self, metadata: &DocumentMetadata, pieces: Vec<PageChunk>) -> (Vec<Chunk>, usize) {
        let mut chunks = Vec::with_capacity(pieces.len());
        let mut failed = 0;

        for (seq, piece) in pieces.into_iter().enumerate() {
            let embedding = self.embedder.embed(&piece.text).await;
            if embedding.is_none() {
                failed += 1;
            }
            chunks.push(Chunk::from_metadata(
                metadata,
                seq as u32,
                piece.text,
                piece.page_number,
                embedding,
            ));
        }

        (chunks, failed)
    }
}

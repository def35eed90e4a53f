//! Batched indexing and filtered deletion over a [`SearchBackend`]

use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::providers::search_backend::{
    FilterField, ScoredChunk, SearchBackend, SearchFilter, SearchQuery,
};
use crate::types::{Chunk, IndexKind};

/// Page size used when collecting chunk ids to delete
const DELETE_PAGE: usize = 1000;

/// Result of an indexing call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed_batches: usize,
}

/// Writes chunks to the index matching their scope
#[derive(Clone)]
pub struct SearchIndex {
    backend: Arc<dyn SearchBackend>,
    batch_size: usize,
}

impl SearchIndex {
    pub fn new(backend: Arc<dyn SearchBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    /// Upload chunks in batches; a failed batch is logged and skipped
    pub async fn index_chunks(&self, chunks: &[Chunk]) -> IndexReport {
        let mut report = IndexReport::default();

        for index in [IndexKind::Personal, IndexKind::Group] {
            let routed: Vec<Chunk> = chunks
                .iter()
                .filter(|c| route(c) == index)
                .cloned()
                .collect();

            for batch in routed.chunks(self.batch_size) {
                match self.backend.upsert(index, batch).await {
                    Ok(()) => report.indexed += batch.len(),
                    Err(e) => {
                        tracing::error!(
                            "Failed to index batch of {} chunks into {} index: {}",
                            batch.len(),
                            index.as_str(),
                            e
                        );
                        report.failed_batches += 1;
                    }
                }
            }
        }

        tracing::debug!(
            "Indexed {} chunks ({} failed batches)",
            report.indexed,
            report.failed_batches
        );
        report
    }

    /// Remove every chunk of a document, optionally only one version
    pub async fn delete_by_document_id(
        &self,
        index: IndexKind,
        document_id: &str,
        version: Option<u32>,
    ) -> Result<usize> {
        let mut filter = SearchFilter::document(document_id);
        if let Some(v) = version {
            filter = filter.and(SearchFilter::eq_int(FilterField::Version, v as i64));
        }

        let mut total = 0;
        loop {
            let page = self
                .backend
                .search(index, &SearchQuery::filtered(filter.clone(), DELETE_PAGE))
                .await?;
            if page.is_empty() {
                break;
            }

            let ids: Vec<String> = page.into_iter().map(|hit| hit.chunk.id).collect();
            let deleted = self.backend.delete(index, &ids).await?;
            total += deleted;
            if deleted == 0 {
                break;
            }
        }

        tracing::debug!(
            "Deleted {} chunks of document {} from {} index",
            total,
            document_id,
            index.as_str()
        );
        Ok(total)
    }

    pub async fn query(&self, index: IndexKind, query: &SearchQuery) -> Result<Vec<ScoredChunk>> {
        self.backend.search(index, query).await
    }
}

/// Group chunks go to the group index, everything else to personal
fn route(chunk: &Chunk) -> IndexKind {
    if chunk.group_id.is_some() && !chunk.is_default {
        IndexKind::Group
    } else {
        IndexKind::Personal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{Database, SqliteSearchBackend};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(doc: &str, seq: u32, group: Option<&str>, version: u32) -> Chunk {
        Chunk {
            id: Chunk::id_for(doc, seq),
            document_id: doc.to_string(),
            chunk_text: format!("chunk {} of {}", seq, doc),
            embedding: None,
            page_number: 1,
            sequence_index: seq,
            file_name: "f.txt".to_string(),
            user_id: if group.is_none() { Some("u".to_string()) } else { None },
            group_id: group.map(str::to_string),
            is_default: false,
            version,
            upload_timestamp: Utc::now(),
            storage_locator: "local://x".to_string(),
        }
    }

    fn sqlite_index(batch: usize) -> (SearchIndex, Arc<SqliteSearchBackend>) {
        let backend = Arc::new(SqliteSearchBackend::new(Database::in_memory().unwrap(), 0.5));
        (SearchIndex::new(backend.clone(), batch), backend)
    }

    #[tokio::test]
    async fn test_routes_chunks_by_scope() {
        let (index, backend) = sqlite_index(2);
        let chunks: Vec<Chunk> = (0..3)
            .map(|i| chunk("p", i, None, 1))
            .chain((0..2).map(|i| chunk("g", i, Some("team"), 1)))
            .collect();

        let report = index.index_chunks(&chunks).await;
        assert_eq!(report, IndexReport { indexed: 5, failed_batches: 0 });
        assert_eq!(backend.count(IndexKind::Personal).unwrap(), 3);
        assert_eq!(backend.count(IndexKind::Group).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_document_and_version() {
        let (index, backend) = sqlite_index(100);
        let mut chunks: Vec<Chunk> = (0..4).map(|i| chunk("a", i, None, 1)).collect();
        chunks.extend((0..2).map(|i| chunk("b", i, None, 1)));
        index.index_chunks(&chunks).await;

        assert_eq!(index.delete_by_document_id(IndexKind::Personal, "a", Some(2)).await.unwrap(), 0);
        assert_eq!(index.delete_by_document_id(IndexKind::Personal, "a", Some(1)).await.unwrap(), 4);
        assert_eq!(backend.count(IndexKind::Personal).unwrap(), 2);
        assert_eq!(index.delete_by_document_id(IndexKind::Personal, "a", None).await.unwrap(), 0);
    }

    /// Fails every other upsert
    struct FlakyBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchBackend for FlakyBackend {
        async fn upsert(&self, _index: IndexKind, _chunks: &[Chunk]) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                Err(Error::search_index("batch rejected"))
            } else {
                Ok(())
            }
        }

        async fn delete(&self, _index: IndexKind, _ids: &[String]) -> Result<usize> {
            Ok(0)
        }

        async fn search(&self, _index: IndexKind, _query: &SearchQuery) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_failed_batches_are_skipped() {
        let index = SearchIndex::new(Arc::new(FlakyBackend { calls: AtomicUsize::new(0) }), 2);
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk("a", i, None, 1)).collect();

        // batches of 2, 2, 1: the middle one fails
        let report = index.index_chunks(&chunks).await;
        assert_eq!(report, IndexReport { indexed: 3, failed_batches: 1 });
    }
}

//! Hybrid retrieval across the personal, default and group scopes
//!
//! A query is embedded once and sent to every scope the requester may see; each call
//! blends lexical and vector ranking. Results are merged and cut to `top_n`.

use futures::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;

use crate::embeddings::{EmbedFailure, Embedder};
use crate::providers::search_backend::{FilterField, SearchFilter, SearchQuery};
use crate::storage::SearchIndex;
use crate::types::{IndexKind, RetrievedChunk, SearchRequest};

/// Why a search returned nothing useful
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(EmbedFailure),

    #[error("search backend failed: {0}")]
    Backend(String),
}

/// One backend call of the fan-out
#[derive(Debug, Clone, PartialEq)]
struct ScopeCall {
    index: IndexKind,
    filter: SearchFilter,
}

/// Fans a query out over the scopes a requester can see
pub struct HybridSearcher {
    embedder: Arc<Embedder>,
    index: SearchIndex,
}

impl HybridSearcher {
    pub fn new(embedder: Arc<Embedder>, index: SearchIndex) -> Self {
        Self { embedder, index }
    }

    /// Search, collapsing any failure to an empty result
    pub async fn hybrid_search(&self, requester_id: &str, request: &SearchRequest) -> Vec<RetrievedChunk> {
        match self.try_hybrid_search(requester_id, request).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Hybrid search failed for '{}': {}", request.query, e);
                Vec::new()
            }
        }
    }

    /// Search, reporting why it failed
    pub async fn try_hybrid_search(
        &self,
        requester_id: &str,
        request: &SearchRequest,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let calls = plan_calls(requester_id, request);
        if calls.is_empty() || request.top_n == 0 {
            tracing::debug!("No searchable scope for request {:?}", request.scope);
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .try_embed(&request.query)
            .await
            .map_err(RetrievalError::Embedding)?;

        let searches = calls.iter().map(|call| {
            let query = SearchQuery::hybrid(
                request.query.clone(),
                vector.clone(),
                call.filter.clone(),
                request.top_n,
            );
            async move {
                tracing::debug!("Searching {} index with filter {}", call.index.as_str(), call.filter);
                self.index
                    .query(call.index, &query)
                    .await
                    .map(|hits| (call.index, hits))
            }
        });

        let batches = try_join_all(searches)
            .await
            .map_err(|e| RetrievalError::Backend(e.to_string()))?;

        let mut results: Vec<RetrievedChunk> = batches
            .into_iter()
            .flat_map(|(index, hits)| {
                hits.into_iter()
                    .map(move |hit| RetrievedChunk::from_chunk(hit.chunk, hit.score, index))
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(request.top_n);

        tracing::info!(
            "Hybrid search returned {} results over {} scope call(s)",
            results.len(),
            calls.len()
        );
        Ok(results)
    }
}

/// Backend calls for a request, in personal, default, group order
fn plan_calls(requester_id: &str, request: &SearchRequest) -> Vec<ScopeCall> {
    let document_id = request.document_id.as_deref();
    let pinned_to_group_document = request.document_group().is_some();
    let mut calls = Vec::new();

    if request.scope.includes_personal() && !pinned_to_group_document {
        calls.push(ScopeCall {
            index: IndexKind::Personal,
            filter: SearchFilter::eq_text(FilterField::UserId, requester_id).and_document(document_id),
        });
        calls.push(ScopeCall {
            index: IndexKind::Personal,
            filter: SearchFilter::eq_bool(FilterField::IsDefault, true).and_document(document_id),
        });
    }

    if request.scope.includes_group() {
        if let Some(group) = request.target_group() {
            calls.push(ScopeCall {
                index: IndexKind::Group,
                filter: SearchFilter::eq_text(FilterField::GroupId, group).and_document(document_id),
            });
        }
    }

    calls
}

//! Retrieval endpoints: hybrid search and citation lookup

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::generation::build_system_prompt;
use crate::server::state::AppState;
use crate::types::{CitationRequest, ResolvedCitation, RetrievedChunk, SearchRequest};

use super::Requester;

/// Search results plus the grounded prompt built from them
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RetrievedChunk>,
    pub system_prompt: String,
    pub search_time_ms: u64,
}

/// POST /api/search - Hybrid search over every scope the caller can see
pub async fn search(
    State(state): State<AppState>,
    requester: Requester,
    Json(mut request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    if request.query.trim().is_empty() {
        return Err(Error::BadRequest("query must not be empty".to_string()));
    }
    if request.active_group_id.is_none() {
        request.active_group_id = requester.group_id.clone();
    }

    let start = Instant::now();
    let results = state
        .clients()
        .searcher
        .hybrid_search(&requester.user_id, &request)
        .await;

    Ok(Json(SearchResponse {
        system_prompt: build_system_prompt(&results),
        results,
        search_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    }))
}

/// POST /api/get_citation - Resolve a citation token to its source
pub async fn get_citation(
    State(state): State<AppState>,
    requester: Requester,
    Json(request): Json<CitationRequest>,
) -> Result<Json<ResolvedCitation>> {
    if request.citation_id.trim().is_empty() {
        return Err(Error::BadRequest("missing citation_id".to_string()));
    }

    let resolved = state
        .clients()
        .resolver
        .resolve(&request, Some(&requester.user_id))
        .await;
    Ok(Json(resolved))
}

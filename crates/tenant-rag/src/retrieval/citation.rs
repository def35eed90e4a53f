//! Citation resolution: token or file name hint to an exact source location
//!
//! Lookup order: the hinted group, then the expected file name, then the citation
//! token itself (personal index before group index). Every strategy that errors is
//! logged and skipped; when all come up empty the degraded payload is returned.

use reqwest::Url;

use crate::error::Result;
use crate::providers::search_backend::{FilterField, SearchFilter, SearchQuery};
use crate::storage::{DocumentStore, SearchIndex};
use crate::types::citation::parse_citation_token;
use crate::types::{
    CitationRequest, Chunk, DocumentMetadata, DocumentSource, FileType, IndexKind,
    ResolvedCitation, Scope, WorkspaceType,
};

/// Base used only to run relative URLs through the query encoder
const URL_BASE: &str = "http://localhost";

/// Inline content by storage locator
pub const PROXY_PATH: &str = "/api/document-proxy";
/// Opens a proxied file at a page
pub const VIEWER_PATH: &str = "/api/document-viewer";

/// Maps citation tokens back to documents
pub struct CitationResolver {
    index: SearchIndex,
    documents: DocumentStore,
    /// Hits examined when matching by file name
    candidates: usize,
}

/// A located chunk and the metadata record it resolves to
struct Located {
    chunk: Chunk,
    index: IndexKind,
    metadata: Option<DocumentMetadata>,
}

impl CitationResolver {
    pub fn new(index: SearchIndex, documents: DocumentStore, candidates: usize) -> Self {
        Self {
            index,
            documents,
            candidates: candidates.max(1),
        }
    }

    /// Resolve a citation for `requester`.
    ///
    /// With a requester, personal-index lookups only match that user's chunks and
    /// default documents.
    pub async fn resolve(&self, request: &CitationRequest, requester: Option<&str>) -> ResolvedCitation {
        let token = parse_citation_token(&request.citation_id);
        let expected_name = request
            .expected_file_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        if let (Some(group), Some((document_id, _))) = (request.group_id.as_deref(), token) {
            match self.in_group(&request.citation_id, document_id, group).await {
                Ok(Some(found)) => return self.respond(found),
                Ok(None) => {}
                Err(e) => tracing::warn!("Group citation lookup failed: {}", e),
            }
        }

        if let Some(name) = expected_name {
            match self.by_file_name(name, requester).await {
                Ok(Some(found)) => return self.respond(found),
                Ok(None) => {}
                Err(e) => tracing::warn!("File name citation lookup failed: {}", e),
            }
        }

        if let Some((document_id, sequence)) = token {
            match self.by_token(&request.citation_id, document_id, sequence, requester).await {
                Ok(Some(found)) => return self.respond(found),
                Ok(None) => {}
                Err(e) => tracing::warn!("Citation id lookup failed: {}", e),
            }
        }

        tracing::info!("Citation {} could not be resolved", request.citation_id);
        ResolvedCitation::not_found(expected_name, request.expected_page)
    }

    async fn in_group(&self, citation_id: &str, document_id: &str, group: &str) -> Result<Option<Located>> {
        let filter = SearchFilter::document(document_id)
            .and(SearchFilter::eq_text(FilterField::GroupId, group));
        let hits = self
            .index
            .query(IndexKind::Group, &SearchQuery::filtered(filter, self.candidates))
            .await?;

        let chunk = match hits.iter().position(|h| h.chunk.id == citation_id) {
            Some(i) => hits.into_iter().nth(i),
            None => hits.into_iter().next(),
        };
        self.locate(chunk.map(|h| h.chunk), IndexKind::Group)
    }

    async fn by_file_name(&self, name: &str, requester: Option<&str>) -> Result<Option<Located>> {
        let wanted = name.to_lowercase();

        for index in [IndexKind::Personal, IndexKind::Group] {
            let query = SearchQuery::text(name, visibility(index, requester), self.candidates);
            let hits = self.index.query(index, &query).await?;

            let Some(hit) = hits
                .into_iter()
                .find(|h| h.chunk.file_name.to_lowercase() == wanted)
            else {
                continue;
            };

            let mut found = match self.locate(Some(hit.chunk), index)? {
                Some(found) => found,
                None => continue,
            };

            let resolved_name = found
                .metadata
                .as_ref()
                .map(|m| m.file_name.as_str())
                .unwrap_or(&found.chunk.file_name);
            if resolved_name.to_lowercase() != wanted {
                tracing::warn!(
                    "Resolved file {} does not match expected {}, looking for a closer record",
                    resolved_name,
                    name
                );
                let kinds: &[&str] = match index {
                    IndexKind::Personal => &["personal", "default"],
                    IndexKind::Group => &["group"],
                };
                if let Some(better) = self
                    .documents
                    .find_by_file_name_containing(kinds, name)?
                    .into_iter()
                    .next()
                {
                    found.metadata = Some(better);
                }
            }

            return Ok(Some(found));
        }

        Ok(None)
    }

    async fn by_token(
        &self,
        citation_id: &str,
        document_id: &str,
        sequence: u32,
        requester: Option<&str>,
    ) -> Result<Option<Located>> {
        for index in [IndexKind::Personal, IndexKind::Group] {
            let scope = visibility(index, requester);

            let by_id = scope.clone().and(SearchFilter::eq_text(FilterField::Id, citation_id));
            let mut hits = self.index.query(index, &SearchQuery::filtered(by_id, 1)).await?;

            if hits.is_empty() {
                let by_position = scope
                    .and(SearchFilter::document(document_id))
                    .and(SearchFilter::eq_int(FilterField::SequenceIndex, sequence as i64));
                hits = self.index.query(index, &SearchQuery::filtered(by_position, 1)).await?;
            }

            if let Some(hit) = hits.into_iter().next() {
                return self.locate(Some(hit.chunk), index);
            }
        }
        Ok(None)
    }

    fn locate(&self, chunk: Option<Chunk>, index: IndexKind) -> Result<Option<Located>> {
        let Some(chunk) = chunk else {
            return Ok(None);
        };
        let metadata = self.documents.get(&chunk.document_id)?;
        Ok(Some(Located { chunk, index, metadata }))
    }

    fn respond(&self, found: Located) -> ResolvedCitation {
        let Located { chunk, index, metadata } = found;

        let workspace_type = match (chunk.scope(), index) {
            (Some(Scope::Default), _) => WorkspaceType::Default,
            (Some(Scope::Group(_)), _) | (None, IndexKind::Group) => WorkspaceType::Group,
            (Some(Scope::Personal(_)), _) | (None, IndexKind::Personal) => WorkspaceType::Personal,
        };

        let (document_id, file_name, locator, version) = match &metadata {
            Some(m) => (m.id.clone(), m.file_name.clone(), m.storage_locator.clone(), m.version),
            None => (
                chunk.document_id.clone(),
                chunk.file_name.clone(),
                chunk.storage_locator.clone(),
                chunk.version,
            ),
        };

        let file_type = Some(FileType::from_file_name(&file_name)).filter(|t| *t != FileType::Unknown);
        let is_viewable = file_type.map(|t| t.is_viewable()).unwrap_or(false);
        let requires_preview = file_type.map(|t| t.needs_preview()).unwrap_or(false);
        let page = chunk.page_number.max(1);
        let group_id = chunk.group_id.clone();

        let document_url = Some(locator).filter(|l| !l.is_empty());
        let proxy_url = document_url
            .as_deref()
            .map(|url| relative_url(PROXY_PATH, &[("url", url)]));

        let viewer_url = match (&proxy_url, file_type) {
            (Some(proxy), Some(t)) if is_viewable => {
                let page = page.to_string();
                Some(relative_url(
                    VIEWER_PATH,
                    &[("file", proxy), ("page", &page), ("name", &file_name), ("type", t.as_str())],
                ))
            }
            _ => None,
        };

        // One download route serves every scope; access is checked per caller
        let download_url = document_url
            .as_ref()
            .map(|_| format!("/api/documents/{}/download", document_id));

        tracing::debug!("Resolved citation to {} page {} ({:?})", file_name, page, workspace_type);

        ResolvedCitation {
            document_source: DocumentSource {
                name: file_name,
                page,
                workspace_type,
                file_type,
                is_viewable,
                requires_preview,
                group_id,
                document_id: Some(document_id),
                version: Some(version),
            },
            cited_text: chunk.chunk_text,
            found: true,
            document_url,
            document_proxy_url: proxy_url,
            document_viewer_url: viewer_url,
            download_url,
        }
    }
}

/// Personal-index restriction for a requester
fn visibility(index: IndexKind, requester: Option<&str>) -> SearchFilter {
    match (index, requester) {
        (IndexKind::Personal, Some(user)) => SearchFilter::eq_text(FilterField::UserId, user)
            .or(SearchFilter::eq_bool(FilterField::IsDefault, true)),
        _ => SearchFilter::All,
    }
}

/// `path?k=v&…` with values form-encoded
fn relative_url(path: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse_with_params(&format!("{}{}", URL_BASE, path), pairs) {
        Ok(url) => match url.query() {
            Some(query) if !query.is_empty() => format!("{}?{}", url.path(), query),
            _ => url.path().to_string(),
        },
        Err(e) => {
            tracing::warn!("Could not build URL for {}: {}", path, e);
            path.to_string()
        }
    }
}

//! Retrieval request and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{Chunk, IndexKind};

/// Which indexes a search fans out to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    All,
    Personal,
    Group,
}

impl SearchScope {
    pub fn includes_personal(&self) -> bool {
        matches!(self, SearchScope::All | SearchScope::Personal)
    }

    pub fn includes_group(&self) -> bool {
        matches!(self, SearchScope::All | SearchScope::Group)
    }
}

/// Hybrid search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Narrows every call to one document
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub scope: SearchScope,
    /// Group selected by the requester
    #[serde(default)]
    pub active_group_id: Option<String>,
    /// Group of the specific document; only used together with `document_id`
    #[serde(default)]
    pub document_group_id: Option<String>,
}

fn default_top_n() -> usize {
    12
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            document_id: None,
            top_n: default_top_n(),
            scope: SearchScope::All,
            active_group_id: None,
            document_group_id: None,
        }
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_active_group(mut self, group_id: impl Into<String>) -> Self {
        self.active_group_id = Some(group_id.into());
        self
    }

    pub fn with_document_group(mut self, group_id: impl Into<String>) -> Self {
        self.document_group_id = Some(group_id.into());
        self
    }

    /// Owning group of the pinned document; ignored without a document
    pub fn document_group(&self) -> Option<&str> {
        self.document_id.as_ref()?;
        self.document_group_id.as_deref().filter(|g| !g.is_empty())
    }

    /// Group the group index is filtered by, if any
    pub fn target_group(&self) -> Option<&str> {
        self.document_group()
            .or_else(|| self.active_group_id.as_deref().filter(|g| !g.is_empty()))
    }
}

/// A chunk returned by hybrid search, annotated with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Citation token (`{document_id}_{sequence_index}`)
    pub id: String,
    pub document_id: String,
    pub chunk_text: String,
    pub file_name: String,
    pub page_number: u32,
    pub sequence_index: u32,
    pub version: u32,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub is_default: bool,
    pub storage_locator: String,
    pub upload_timestamp: DateTime<Utc>,
    pub score: f32,
    pub index: IndexKind,
}

impl RetrievedChunk {
    pub fn from_chunk(chunk: Chunk, score: f32, index: IndexKind) -> Self {
        Self {
            id: chunk.id,
            document_id: chunk.document_id,
            chunk_text: chunk.chunk_text,
            file_name: chunk.file_name,
            page_number: chunk.page_number.max(1),
            sequence_index: chunk.sequence_index,
            version: chunk.version,
            user_id: chunk.user_id,
            group_id: chunk.group_id,
            is_default: chunk.is_default,
            storage_locator: chunk.storage_locator,
            upload_timestamp: chunk.upload_timestamp,
            score,
            index,
        }
    }
}

//! Search backend trait and typed filters

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::types::{Chunk, IndexKind};

/// Filterable chunk fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Id,
    DocumentId,
    UserId,
    GroupId,
    IsDefault,
    Version,
    SequenceIndex,
}

impl FilterField {
    pub fn name(&self) -> &'static str {
        match self {
            FilterField::Id => "id",
            FilterField::DocumentId => "document_id",
            FilterField::UserId => "user_id",
            FilterField::GroupId => "group_id",
            FilterField::IsDefault => "is_default",
            FilterField::Version => "version",
            FilterField::SequenceIndex => "sequence_index",
        }
    }
}

/// Literal compared against a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

/// Boolean filter over chunk fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchFilter {
    /// Matches everything
    #[default]
    All,
    Eq(FilterField, FilterValue),
    And(Vec<SearchFilter>),
    Or(Vec<SearchFilter>),
}

impl SearchFilter {
    pub fn eq_text(field: FilterField, value: impl Into<String>) -> Self {
        SearchFilter::Eq(field, FilterValue::Text(value.into()))
    }

    pub fn eq_int(field: FilterField, value: i64) -> Self {
        SearchFilter::Eq(field, FilterValue::Int(value))
    }

    pub fn eq_bool(field: FilterField, value: bool) -> Self {
        SearchFilter::Eq(field, FilterValue::Bool(value))
    }

    pub fn document(document_id: impl Into<String>) -> Self {
        Self::eq_text(FilterField::DocumentId, document_id)
    }

    /// Conjunction, flattening `All`
    pub fn and(self, other: SearchFilter) -> Self {
        match (self, other) {
            (SearchFilter::All, f) | (f, SearchFilter::All) => f,
            (SearchFilter::And(mut a), SearchFilter::And(b)) => {
                a.extend(b);
                SearchFilter::And(a)
            }
            (SearchFilter::And(mut a), f) => {
                a.push(f);
                SearchFilter::And(a)
            }
            (f, SearchFilter::And(mut b)) => {
                b.insert(0, f);
                SearchFilter::And(b)
            }
            (a, b) => SearchFilter::And(vec![a, b]),
        }
    }

    pub fn or(self, other: SearchFilter) -> Self {
        match (self, other) {
            (SearchFilter::All, _) | (_, SearchFilter::All) => SearchFilter::All,
            (SearchFilter::Or(mut a), f) => {
                a.push(f);
                SearchFilter::Or(a)
            }
            (a, b) => SearchFilter::Or(vec![a, b]),
        }
    }

    /// Narrow by an optional document id
    pub fn and_document(self, document_id: Option<&str>) -> Self {
        match document_id {
            Some(id) => self.and(Self::document(id)),
            None => self,
        }
    }
}

/// Renders in OData syntax for logs
impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchFilter::All => write!(f, "*"),
            SearchFilter::Eq(field, value) => match value {
                FilterValue::Text(s) => write!(f, "{} eq '{}'", field.name(), s.replace('\'', "''")),
                FilterValue::Int(i) => write!(f, "{} eq {}", field.name(), i),
                FilterValue::Bool(b) => write!(f, "{} eq {}", field.name(), b),
            },
            SearchFilter::And(parts) | SearchFilter::Or(parts) => {
                let op = if matches!(self, SearchFilter::And(_)) { " and " } else { " or " };
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|p| match p {
                        SearchFilter::And(_) | SearchFilter::Or(_) => format!("({})", p),
                        _ => p.to_string(),
                    })
                    .collect();
                write!(f, "{}", rendered.join(op))
            }
        }
    }
}

/// One backend query: lexical text and/or vector, filtered, top-k
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// `None` or `"*"` matches everything
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub filter: SearchFilter,
    pub top: usize,
}

impl SearchQuery {
    /// Filter-only lookup
    pub fn filtered(filter: SearchFilter, top: usize) -> Self {
        Self {
            text: None,
            vector: None,
            filter,
            top,
        }
    }

    /// Combined lexical and vector query
    pub fn hybrid(text: impl Into<String>, vector: Vec<f32>, filter: SearchFilter, top: usize) -> Self {
        Self {
            text: Some(text.into()),
            vector: Some(vector),
            filter,
            top,
        }
    }

    /// Lexical-only query
    pub fn text(text: impl Into<String>, filter: SearchFilter, top: usize) -> Self {
        Self {
            text: Some(text.into()),
            vector: None,
            filter,
            top,
        }
    }

    pub fn has_text(&self) -> bool {
        self.text
            .as_deref()
            .map(|t| !t.trim().is_empty() && t.trim() != "*")
            .unwrap_or(false)
    }
}

/// A stored chunk with its relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Trait for the per-index chunk search service
///
/// Implementations:
/// - `SqliteSearchBackend`: FTS5 + stored vectors in SQLite
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Insert or replace chunks by id
    async fn upsert(&self, index: IndexKind, chunks: &[Chunk]) -> Result<()>;

    /// Delete chunks by id; returns how many existed
    async fn delete(&self, index: IndexKind, ids: &[String]) -> Result<usize>;

    /// Ranked search, best first
    async fn search(&self, index: IndexKind, query: &SearchQuery) -> Result<Vec<ScoredChunk>>;

    /// Check if the backend is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_rendering() {
        let f = SearchFilter::eq_text(FilterField::UserId, "alice").and_document(Some("d1"));
        assert_eq!(f.to_string(), "user_id eq 'alice' and document_id eq 'd1'");

        let f = SearchFilter::eq_bool(FilterField::IsDefault, true);
        assert_eq!(f.to_string(), "is_default eq true");

        let f = SearchFilter::eq_text(FilterField::UserId, "o'neil")
            .or(SearchFilter::eq_bool(FilterField::IsDefault, true))
            .and(SearchFilter::eq_int(FilterField::Version, 2));
        assert_eq!(
            f.to_string(),
            "(user_id eq 'o''neil' or is_default eq true) and version eq 2"
        );
    }

    #[test]
    fn test_and_flattens_all() {
        assert_eq!(SearchFilter::All.and(SearchFilter::All), SearchFilter::All);
        let f = SearchFilter::All.and(SearchFilter::document("x"));
        assert_eq!(f, SearchFilter::document("x"));
        assert_eq!(SearchFilter::All.and_document(None), SearchFilter::All);
    }

    #[test]
    fn test_has_text() {
        assert!(!SearchQuery::filtered(SearchFilter::All, 1).has_text());
        assert!(!SearchQuery::text("*", SearchFilter::All, 1).has_text());
        assert!(SearchQuery::text("budget", SearchFilter::All, 1).has_text());
    }
}

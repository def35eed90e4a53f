//! Document, chunk and scope types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ownership domain of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Scope {
    /// Owned by a single user
    Personal(String),
    /// Shared within a group
    Group(String),
    /// Admin-provided, visible to everyone
    Default,
}

impl Scope {
    /// Build a scope from its wire form (`personal` / `group` / `default` plus owner id)
    pub fn from_parts(kind: &str, owner: Option<&str>) -> Result<Self> {
        let owner = owner.map(str::trim).filter(|s| !s.is_empty());
        match (kind.to_ascii_lowercase().as_str(), owner) {
            ("personal" | "user", Some(id)) => Ok(Scope::Personal(id.to_string())),
            ("group", Some(id)) => Ok(Scope::Group(id.to_string())),
            ("default", _) => Ok(Scope::Default),
            ("personal" | "user" | "group", None) => Err(Error::BadRequest(format!(
                "scope '{}' requires an owner id",
                kind
            ))),
            _ => Err(Error::BadRequest(format!("unknown scope '{}'", kind))),
        }
    }

    /// Logical index holding this scope's chunks
    pub fn index(&self) -> IndexKind {
        match self {
            Scope::Personal(_) | Scope::Default => IndexKind::Personal,
            Scope::Group(_) => IndexKind::Group,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Personal(_) => "personal",
            Scope::Group(_) => "group",
            Scope::Default => "default",
        }
    }

    /// Owner id, empty for default documents
    pub fn owner_id(&self) -> &str {
        match self {
            Scope::Personal(id) | Scope::Group(id) => id,
            Scope::Default => "",
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Scope::Personal(id) => Some(id),
            _ => None,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            Scope::Group(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Scope::Default)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Default => write!(f, "default"),
            other => write!(f, "{}:{}", other.kind(), other.owner_id()),
        }
    }
}

/// The two logical search indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// User documents plus default documents
    Personal,
    /// Group documents
    Group,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Personal => "personal",
            IndexKind::Group => "group",
        }
    }
}

/// One upload event of a logical file; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Unique per upload
    pub id: String,
    pub file_name: String,
    pub scope: Scope,
    /// Starts at 1 per (file_name, scope)
    pub version: u32,
    pub upload_timestamp: DateTime<Utc>,
    pub num_chunks: u32,
    /// Where the raw bytes live
    pub storage_locator: String,
}

/// A searchable text window of a document version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}_{sequence_index}`, doubles as the citation token
    pub id: String,
    pub document_id: String,
    pub chunk_text: String,
    /// Missing when embedding failed; the chunk is then only lexically searchable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub page_number: u32,
    pub sequence_index: u32,
    pub file_name: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub is_default: bool,
    pub version: u32,
    pub upload_timestamp: DateTime<Utc>,
    pub storage_locator: String,
}

impl Chunk {
    /// Chunk id for a document and position
    pub fn id_for(document_id: &str, sequence_index: u32) -> String {
        format!("{}_{}", document_id, sequence_index)
    }

    /// Build a chunk carrying its document's provenance
    pub fn from_metadata(
        metadata: &DocumentMetadata,
        sequence_index: u32,
        chunk_text: String,
        page_number: u32,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            id: Self::id_for(&metadata.id, sequence_index),
            document_id: metadata.id.clone(),
            chunk_text,
            embedding,
            page_number: page_number.max(1),
            sequence_index,
            file_name: metadata.file_name.clone(),
            user_id: metadata.scope.user_id().map(str::to_string),
            group_id: metadata.scope.group_id().map(str::to_string),
            is_default: metadata.scope.is_default(),
            version: metadata.version,
            upload_timestamp: metadata.upload_timestamp,
            storage_locator: metadata.storage_locator.clone(),
        }
    }

    /// Scope reconstructed from the mirrored fields
    pub fn scope(&self) -> Option<Scope> {
        if self.is_default {
            return Some(Scope::Default);
        }
        match (&self.group_id, &self.user_id) {
            (Some(group), _) => Some(Scope::Group(group.clone())),
            (None, Some(user)) => Some(Scope::Personal(user.clone())),
            (None, None) => None,
        }
    }
}

/// Viewer classification of a file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Image,
    Docx,
    Xlsx,
    Pptx,
    Text,
    Csv,
    Unknown,
}

impl FileType {
    pub fn from_file_name(file_name: &str) -> Self {
        Self::from_extension(extension_of(file_name).unwrap_or_default().as_str())
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => Self::Image,
            "docx" | "doc" => Self::Docx,
            "xlsx" | "xls" => Self::Xlsx,
            "pptx" | "ppt" => Self::Pptx,
            "txt" | "log" | "md" => Self::Text,
            "csv" => Self::Csv,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
            Self::Text => "text",
            Self::Csv => "csv",
            Self::Unknown => "unknown",
        }
    }

    /// Rendered directly by the document viewer
    pub fn is_viewable(&self) -> bool {
        matches!(self, Self::Pdf | Self::Image | Self::Text | Self::Csv)
    }

    /// Office formats go through the external preview service
    pub fn needs_preview(&self) -> bool {
        matches!(self, Self::Docx | Self::Xlsx | Self::Pptx)
    }
}

/// Lowercase extension without the dot
pub fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Content type recorded with the stored blob
pub fn content_type_for(file_name: &str) -> String {
    match extension_of(file_name).as_deref() {
        Some("pdf") => "application/pdf".to_string(),
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string()
        }
        Some("xlsx") => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string()
        }
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation".to_string()
        }
        Some("txt") => "text/plain".to_string(),
        Some("csv") => "text/csv".to_string(),
        Some(_) => mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
        None => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(scope: Scope) -> DocumentMetadata {
        DocumentMetadata {
            id: "doc-1".to_string(),
            file_name: "report.pdf".to_string(),
            scope,
            version: 3,
            upload_timestamp: Utc::now(),
            num_chunks: 2,
            storage_locator: "local://x/report.pdf".to_string(),
        }
    }

    #[test]
    fn test_scope_index_routing() {
        assert_eq!(Scope::Personal("u".into()).index(), IndexKind::Personal);
        assert_eq!(Scope::Default.index(), IndexKind::Personal);
        assert_eq!(Scope::Group("g".into()).index(), IndexKind::Group);
    }

    #[test]
    fn test_scope_from_parts() {
        assert_eq!(
            Scope::from_parts("personal", Some("alice")).unwrap(),
            Scope::Personal("alice".into())
        );
        assert_eq!(Scope::from_parts("default", None).unwrap(), Scope::Default);
        assert!(Scope::from_parts("group", Some("  ")).is_err());
        assert!(Scope::from_parts("team", Some("x")).is_err());
    }

    #[test]
    fn test_chunk_mirrors_scope() {
        let meta = metadata(Scope::Group("g1".into()));
        let chunk = Chunk::from_metadata(&meta, 4, "text".into(), 0, None);
        assert_eq!(chunk.id, "doc-1_4");
        assert_eq!(chunk.page_number, 1);
        assert_eq!(chunk.group_id.as_deref(), Some("g1"));
        assert_eq!(chunk.user_id, None);
        assert!(!chunk.is_default);
        assert_eq!(chunk.version, 3);
        assert_eq!(chunk.scope(), Some(Scope::Group("g1".into())));

        let chunk = Chunk::from_metadata(&metadata(Scope::Default), 0, "t".into(), 2, None);
        assert!(chunk.is_default);
        assert_eq!(chunk.scope(), Some(Scope::Default));
    }

    #[test]
    fn test_file_type_classification() {
        assert_eq!(FileType::from_file_name("a.PDF"), FileType::Pdf);
        assert_eq!(FileType::from_file_name("a.webp"), FileType::Image);
        assert_eq!(FileType::from_file_name("a.doc"), FileType::Docx);
        assert_eq!(FileType::from_file_name("a.log"), FileType::Text);
        assert_eq!(FileType::from_file_name("noext"), FileType::Unknown);
        assert!(FileType::Csv.is_viewable());
        assert!(!FileType::Xlsx.is_viewable());
        assert!(FileType::Pptx.needs_preview());
    }

    #[test]
    fn test_extension_and_content_type() {
        assert_eq!(extension_of("x.tar.GZ").as_deref(), Some("gz"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("a.csv"), "text/csv");
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}

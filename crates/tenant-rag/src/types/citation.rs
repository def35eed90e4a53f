//! Citation lookup types

use serde::{Deserialize, Serialize};

use super::document::FileType;

/// Message shown when a cited chunk cannot be located
pub const CITATION_NOT_FOUND_TEXT: &str = "The cited source cannot be found or accessed. The document may have been deleted or you may not have access to it.";

/// Incoming citation lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationRequest {
    /// `{document_id}_{sequence_index}` as emitted in the prompt
    pub citation_id: String,
    #[serde(default, alias = "expected_filename")]
    pub expected_file_name: Option<String>,
    #[serde(default)]
    pub expected_page: Option<u32>,
    /// Group the cited document is believed to belong to
    #[serde(default, alias = "doc_group_id")]
    pub group_id: Option<String>,
}

impl CitationRequest {
    pub fn new(citation_id: impl Into<String>) -> Self {
        Self {
            citation_id: citation_id.into(),
            ..Default::default()
        }
    }

    pub fn with_expected_file_name(mut self, name: impl Into<String>) -> Self {
        self.expected_file_name = Some(name.into());
        self
    }

    pub fn with_expected_page(mut self, page: u32) -> Self {
        self.expected_page = Some(page);
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// Split a citation token at its last underscore
///
/// Document ids may themselves contain underscores; the trailing segment must be a
/// sequence number.
pub fn parse_citation_token(token: &str) -> Option<(&str, u32)> {
    let (document_id, sequence) = token.rsplit_once('_')?;
    if document_id.is_empty() {
        return None;
    }
    let sequence = sequence.parse().ok()?;
    Some((document_id, sequence))
}

/// Workspace a citation was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceType {
    Personal,
    Group,
    Default,
    Unknown,
}

/// Where the cited text lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSource {
    pub name: String,
    pub page: u32,
    pub workspace_type: WorkspaceType,
    pub file_type: Option<FileType>,
    pub is_viewable: bool,
    /// Office formats open through the external preview service
    #[serde(default)]
    pub requires_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Resolved citation, or the degraded not-found payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCitation {
    pub document_source: DocumentSource,
    pub cited_text: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_proxy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_viewer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ResolvedCitation {
    /// Payload returned when every lookup strategy came up empty
    pub fn not_found(expected_file_name: Option<&str>, expected_page: Option<u32>) -> Self {
        Self {
            document_source: DocumentSource {
                name: expected_file_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or("Document")
                    .to_string(),
                page: expected_page.unwrap_or(1).max(1),
                workspace_type: WorkspaceType::Unknown,
                file_type: None,
                is_viewable: false,
                requires_preview: false,
                group_id: None,
                document_id: None,
                version: None,
            },
            cited_text: CITATION_NOT_FOUND_TEXT.to_string(),
            found: false,
            document_url: None,
            document_proxy_url: None,
            document_viewer_url: None,
            download_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_citation_token() {
        assert_eq!(parse_citation_token("abcd1234_5"), Some(("abcd1234", 5)));
        assert_eq!(parse_citation_token("a_b_c_12"), Some(("a_b_c", 12)));
        assert_eq!(parse_citation_token("nounderscore"), None);
        assert_eq!(parse_citation_token("doc_x"), None);
        assert_eq!(parse_citation_token("_3"), None);
    }

    #[test]
    fn test_not_found_payload() {
        let payload = ResolvedCitation::not_found(None, None);
        assert!(!payload.found);
        assert_eq!(payload.document_source.name, "Document");
        assert_eq!(payload.document_source.page, 1);
        assert_eq!(payload.document_source.workspace_type, WorkspaceType::Unknown);
        assert_eq!(payload.cited_text, CITATION_NOT_FOUND_TEXT);

        let payload = ResolvedCitation::not_found(Some("plan.pdf"), Some(7));
        assert_eq!(payload.document_source.name, "plan.pdf");
        assert_eq!(payload.document_source.page, 7);
    }

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let req: CitationRequest = serde_json::from_str(
            r#"{"citation_id":"d_1","expected_filename":"a.pdf","doc_group_id":"g"}"#,
        )
        .unwrap();
        assert_eq!(req.expected_file_name.as_deref(), Some("a.pdf"));
        assert_eq!(req.group_id.as_deref(), Some("g"));
    }
}

//! Layout analysis provider trait (OCR and page segmentation service)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Status of an analysis operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalyzeStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl AnalyzeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// One text line on a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutLine {
    pub content: String,
}

/// One page of the analysis, lines in reading order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPage {
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub lines: Vec<LayoutLine>,
}

/// Analysis output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutResult {
    #[serde(default)]
    pub pages: Vec<LayoutPage>,
    /// Whole-document text, used when pages carry nothing
    #[serde(default)]
    pub content: Option<String>,
}

/// Snapshot of a pollable analysis job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeOperation {
    pub status: AnalyzeStatus,
    pub result: Option<LayoutResult>,
    pub error: Option<String>,
}

/// Trait for the external layout service
///
/// Implementations:
/// - `DocumentIntelligenceClient`: REST analyze/poll protocol
#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    /// Submit a document; returns a handle to poll
    async fn begin_analyze(&self, data: &[u8], content_type: &str) -> Result<String>;

    /// Current state of a submitted document
    async fn poll(&self, operation: &str) -> Result<AnalyzeOperation>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

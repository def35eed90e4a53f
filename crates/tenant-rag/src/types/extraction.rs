//! Extraction output types

use serde::{Deserialize, Serialize};

/// Page text used when nothing could be extracted
pub const EMPTY_EXTRACTION_TEXT: &str = "No text content could be extracted from this document.";

/// Page text used when extraction failed outright
pub const FAILED_EXTRACTION_TEXT: &str = "Error processing document.";

/// Text of one 1-based page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// How the pages were obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// Read directly (plain text, markdown, JSON)
    Direct,
    /// Pages reported by the layout service
    Structured,
    /// Full text split into fixed word windows
    Synthetic,
    /// No text anywhere; single placeholder page
    Empty,
    /// Extraction failed; single error page
    Failed { reason: String },
}

/// Ordered per-page text of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub pages: Vec<PageText>,
    pub outcome: ExtractionOutcome,
}

impl ExtractionResult {
    pub fn single(text: impl Into<String>, outcome: ExtractionOutcome) -> Self {
        Self {
            pages: vec![PageText::new(1, text)],
            outcome,
        }
    }

    pub fn empty() -> Self {
        Self::single(EMPTY_EXTRACTION_TEXT, ExtractionOutcome::Empty)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::single(
            FAILED_EXTRACTION_TEXT,
            ExtractionOutcome::Failed {
                reason: reason.into(),
            },
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Failed { .. })
    }
}

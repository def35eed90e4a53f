//! Content extraction: raw upload bytes to ordered per-page text
//!
//! Plain text formats are read in-process. Everything else goes through the layout
//! service, whose per-page line output is stitched back into pages.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::providers::{AnalyzeStatus, LayoutAnalyzer, LayoutResult};
use crate::types::document::{content_type_for, extension_of};
use crate::types::{ExtractionOutcome, ExtractionResult, PageText};

/// How a file's text is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    PlainText,
    Json,
    Layout,
}

fn route_for(file_name: &str) -> Route {
    match extension_of(file_name).as_deref() {
        Some("txt" | "md" | "csv") => Route::PlainText,
        Some("json") => Route::Json,
        _ => Route::Layout,
    }
}

/// Extracts page text from uploads
pub struct ContentExtractor {
    layout: Arc<dyn LayoutAnalyzer>,
    config: ExtractionConfig,
}

impl ContentExtractor {
    pub fn new(layout: Arc<dyn LayoutAnalyzer>, config: ExtractionConfig) -> Self {
        Self { layout, config }
    }

    /// Extract pages from a file. Never fails: internal errors yield a single
    /// error page.
    pub async fn extract(&self, file_name: &str, data: &[u8]) -> ExtractionResult {
        let result = match route_for(file_name) {
            Route::PlainText => Ok(ExtractionResult::single(
                String::from_utf8_lossy(data).into_owned(),
                ExtractionOutcome::Direct,
            )),
            Route::Json => pretty_json(data),
            Route::Layout => self.extract_with_layout(file_name, data).await,
        };

        match result {
            Ok(extracted) => {
                tracing::info!(
                    "[{}] Extracted {} page(s) ({:?})",
                    file_name,
                    extracted.pages.len(),
                    extracted.outcome
                );
                extracted
            }
            Err(e) => {
                tracing::error!("[{}] Extraction failed: {}", file_name, e);
                ExtractionResult::failed(e.to_string())
            }
        }
    }

    async fn extract_with_layout(&self, file_name: &str, data: &[u8]) -> Result<ExtractionResult> {
        let content_type = content_type_for(file_name);
        let operation = self.layout.begin_analyze(data, &content_type).await?;
        tracing::debug!("[{}] Submitted to {}: {}", file_name, self.layout.name(), operation);

        let layout = self.wait_for(&operation).await?;
        Ok(pages_from_layout(&layout, self.config.words_per_page))
    }

    /// Poll until the operation is terminal or the wall-clock ceiling passes
    async fn wait_for(&self, operation: &str) -> Result<LayoutResult> {
        let started = Instant::now();
        let max_wait = self.config.max_wait();

        loop {
            let snapshot = self.layout.poll(operation).await?;
            match snapshot.status {
                AnalyzeStatus::Succeeded => return Ok(snapshot.result.unwrap_or_default()),
                AnalyzeStatus::Failed | AnalyzeStatus::Canceled => {
                    return Err(Error::extraction(format!(
                        "analysis {:?}: {}",
                        snapshot.status,
                        snapshot.error.unwrap_or_else(|| "no details".to_string())
                    )));
                }
                AnalyzeStatus::NotStarted | AnalyzeStatus::Running => {}
            }

            if started.elapsed() >= max_wait {
                return Err(Error::Timeout(format!(
                    "layout analysis did not finish within {}s",
                    max_wait.as_secs()
                )));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}

fn pretty_json(data: &[u8]) -> Result<ExtractionResult> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    let text = serde_json::to_string_pretty(&value)?;
    Ok(ExtractionResult::single(text, ExtractionOutcome::Direct))
}

/// Rebuild pages from layout output, falling back to synthetic word windows
fn pages_from_layout(layout: &LayoutResult, words_per_page: usize) -> ExtractionResult {
    let pages: Vec<PageText> = layout
        .pages
        .iter()
        .enumerate()
        .filter_map(|(i, page)| {
            let text: String = page
                .lines
                .iter()
                .map(|line| format!("{}\n", line.content))
                .collect();
            if text.trim().is_empty() {
                None
            } else {
                Some(PageText::new(i as u32 + 1, text))
            }
        })
        .collect();

    if !pages.is_empty() {
        return ExtractionResult {
            pages,
            outcome: ExtractionOutcome::Structured,
        };
    }

    match layout.content.as_deref().map(str::trim) {
        Some(content) if !content.is_empty() => ExtractionResult {
            pages: synthetic_pages(content, words_per_page),
            outcome: ExtractionOutcome::Synthetic,
        },
        _ => ExtractionResult::empty(),
    }
}

/// Split text into pages of `words_per_page` whitespace-separated words
fn synthetic_pages(content: &str, words_per_page: usize) -> Vec<PageText> {
    let words: Vec<&str> = content.split_whitespace().collect();
    words
        .chunks(words_per_page.max(1))
        .enumerate()
        .map(|(i, window)| PageText::new(i as u32 + 1, window.join(" ")))
        .collect()
}

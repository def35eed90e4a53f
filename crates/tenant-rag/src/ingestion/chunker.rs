//! Page-aware text chunking
//!
//! Each page is windowed independently so a chunk never spans two pages. Sizes and
//! offsets count characters, not bytes.

use serde::{Deserialize, Serialize};

use crate::config::ChunkingConfig;
use crate::types::PageText;

/// Chunk text used when the page list is empty
pub const NO_PAGES_TEXT: &str = "No content was extracted from this document.";

/// Chunk text used when every page was blank
pub const NO_USABLE_CONTENT_TEXT: &str =
    "Document processing completed, but no usable content was found.";

/// Break points tried in order when refining a window end
const BREAKS: [&[char]; 3] = [&['.', ' '], &['\n'], &[' ']];

/// A chunk of text and the page it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageChunk {
    pub text: String,
    pub page_number: u32,
}

impl PageChunk {
    fn new(text: impl Into<String>, page_number: u32) -> Self {
        Self {
            text: text.into(),
            page_number,
        }
    }
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between consecutive windows
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Chunk all pages in order. Never returns an empty list.
    pub fn chunk(&self, pages: &[PageText]) -> Vec<PageChunk> {
        if pages.is_empty() {
            return vec![PageChunk::new(NO_PAGES_TEXT, 1)];
        }

        let chunks: Vec<PageChunk> = pages
            .iter()
            .flat_map(|page| {
                let page_number = page.page_number.max(1);
                self.chunk_page(&page.text)
                    .into_iter()
                    .map(move |text| PageChunk::new(text, page_number))
            })
            .collect();

        if chunks.is_empty() {
            tracing::warn!("No usable content in {} page(s)", pages.len());
            return vec![PageChunk::new(NO_USABLE_CONTENT_TEXT, 1)];
        }
        chunks
    }

    /// Window one page's text
    fn chunk_page(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let half = self.chunk_size / 2;

        if len < half {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut pos = 0;

        while pos < len {
            let mut end = (pos + self.chunk_size).min(len);

            if end < len && end - pos > half {
                if let Some(brk) = find_break(&chars, pos, end, pos + half) {
                    end = brk + 1;
                }
            }

            let chunk: String = chars[pos..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            pos = if end < len {
                end.saturating_sub(self.overlap).max(pos + 1)
            } else {
                len
            };
        }

        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// Last break in `chars[start..end]` lying beyond `floor`, by break priority
fn find_break(chars: &[char], start: usize, end: usize, floor: usize) -> Option<usize> {
    BREAKS.iter().find_map(|pattern| {
        let window = &chars[start..end];
        window
            .windows(pattern.len())
            .rposition(|w| w == *pattern)
            .map(|i| start + i)
            .filter(|&i| i > floor)
    })
}

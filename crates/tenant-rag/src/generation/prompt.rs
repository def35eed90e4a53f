//! System prompts built from retrieved chunks

use crate::types::RetrievedChunk;

/// Instruction placed above the excerpts
const GROUNDING_INSTRUCTION: &str = "\
You are an AI assistant provided with SPECIFIC DOCUMENT EXCERPTS relevant to the user's question.
Answer ONLY from these excerpts and do not use general knowledge.
If the excerpts do not contain the answer, say that the information is not in the provided documents.
Cite sources with the citation given after each excerpt, in the form (Source: filename, Page: page number) [#ID].";

/// Prompt used when retrieval found nothing
pub const NO_RESULTS_PROMPT: &str = "\
You are an AI assistant, but the user has chosen to only use document search for this question.
Unfortunately, no relevant documents were found for this query.
Tell the user that no relevant documents were found, and suggest a different query or turning \
document search off to get an answer from general knowledge.";

/// Prompt builder for retrieval-grounded answers
pub struct PromptBuilder;

impl PromptBuilder {
    /// Citation suffix for one chunk
    pub fn citation(chunk: &RetrievedChunk) -> String {
        format!(
            "(Source: {}, Page: {}) [#{}]",
            chunk.file_name,
            chunk.page_number.max(1),
            chunk.id
        )
    }

    /// Excerpts, each followed by its citation, separated by blank lines
    pub fn build_context(results: &[RetrievedChunk]) -> String {
        results
            .iter()
            .map(|chunk| format!("{}\n{}", chunk.chunk_text, Self::citation(chunk)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// System prompt for an answer; falls back to [`NO_RESULTS_PROMPT`]
    pub fn build_system_prompt(results: &[RetrievedChunk]) -> String {
        if results.is_empty() {
            return NO_RESULTS_PROMPT.to_string();
        }
        format!("{}\n\n{}", GROUNDING_INSTRUCTION, Self::build_context(results))
    }
}

/// Shorthand for [`PromptBuilder::build_system_prompt`]
pub fn build_system_prompt(results: &[RetrievedChunk]) -> String {
    PromptBuilder::build_system_prompt(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexKind;
    use chrono::Utc;

    fn retrieved(id: &str, file: &str, page: u32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            chunk_text: text.to_string(),
            file_name: file.to_string(),
            page_number: page,
            sequence_index: 0,
            version: 1,
            user_id: Some("u".to_string()),
            group_id: None,
            is_default: false,
            storage_locator: String::new(),
            upload_timestamp: Utc::now(),
            score: 1.0,
            index: IndexKind::Personal,
        }
    }

    #[test]
    fn test_context_format() {
        let results = vec![
            retrieved("doc_0", "a.pdf", 3, "first"),
            retrieved("doc_1", "b.txt", 0, "second"),
        ];
        assert_eq!(
            PromptBuilder::build_context(&results),
            "first\n(Source: a.pdf, Page: 3) [#doc_0]\n\nsecond\n(Source: b.txt, Page: 1) [#doc_1]"
        );

        let prompt = build_system_prompt(&results);
        assert!(prompt.starts_with("You are an AI assistant provided with SPECIFIC DOCUMENT EXCERPTS"));
        assert!(prompt.ends_with("[#doc_1]"));
    }

    #[test]
    fn test_empty_results_use_no_results_prompt() {
        assert_eq!(build_system_prompt(&[]), NO_RESULTS_PROMPT);
        assert!(NO_RESULTS_PROMPT.contains("no relevant documents were found"));
    }
}

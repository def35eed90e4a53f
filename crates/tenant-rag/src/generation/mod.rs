//! Answer assembly: grounded system prompts and citation extraction

pub mod citation;
pub mod prompt;

pub use citation::extract_citation_ids;
pub use prompt::{build_system_prompt, PromptBuilder, NO_RESULTS_PROMPT};

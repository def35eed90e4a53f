//! Citation token extraction from generated answers

use regex::Regex;
use std::sync::OnceLock;

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[#([^\]\s]+)\]").expect("Invalid regex"))
}

/// Citation ids (`[#id]`) in order of first appearance
pub fn extract_citation_ids(answer: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for cap in citation_pattern().captures_iter(answer) {
        let id = &cap[1];
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

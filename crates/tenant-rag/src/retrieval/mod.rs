//! Retrieval: hybrid search over visible scopes and citation resolution

mod citation;
mod hybrid;

pub use citation::{CitationResolver, PROXY_PATH, VIEWER_PATH};
pub use hybrid::{HybridSearcher, RetrievalError};

//! API routes for the RAG server

pub mod documents;
pub mod search;

use async_trait::async_trait;
use axum::{
    extract::{DefaultBodyLimit, FromRequestParts},
    http::request::Parts,
    routing::{delete, get, post},
    Router,
};

use crate::error::Error;
use crate::server::state::AppState;
use crate::types::{DocumentMetadata, Scope};

/// Header carrying the caller's user id
pub const USER_HEADER: &str = "x-user-id";
/// Header carrying the caller's active group
pub const GROUP_HEADER: &str = "x-group-id";

/// Caller identity, as forwarded by the authenticating proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub group_id: Option<String>,
}

impl Requester {
    /// Whether the caller may see a document
    pub fn can_access(&self, doc: &DocumentMetadata) -> bool {
        match &doc.scope {
            Scope::Personal(owner) => *owner == self.user_id,
            Scope::Group(group) => self.group_id.as_deref() == Some(group.as_str()),
            Scope::Default => true,
        }
    }

    /// Scope named by a wire kind, owned by this caller
    pub fn scope(&self, kind: &str, group_override: Option<&str>) -> Result<Scope, Error> {
        let owner = match kind.to_ascii_lowercase().as_str() {
            "group" => group_override.or(self.group_id.as_deref()),
            _ => Some(self.user_id.as_str()),
        };
        Scope::from_parts(kind, owner)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Requester {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let user_id = header(USER_HEADER)
            .ok_or_else(|| Error::BadRequest(format!("missing {} header", USER_HEADER)))?;
        Ok(Self {
            user_id,
            group_id: header(GROUP_HEADER),
        })
    }
}

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Document management
        .route(
            "/documents/upload",
            post(documents::upload_document).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/documents", get(documents::list_documents))
        .route("/documents/:id", delete(documents::delete_document))
        .route("/documents/:id/versions", get(documents::list_versions))
        .route("/documents/:id/versions/:version", delete(documents::delete_version))
        .route("/documents/:id/download", get(documents::download_document))
        .route("/document-proxy", get(documents::proxy_document))
        .route("/document-viewer", get(documents::view_document))
        // Retrieval
        .route("/search", post(search::search))
        .route("/get_citation", post(search::get_citation))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "tenant-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-tenant document ingestion and hybrid retrieval with citations",
        "endpoints": {
            "POST /api/documents/upload": "Upload a document into a scope (multipart: file, scope, group_id)",
            "GET /api/documents?scope=": "Latest version of every file in a scope",
            "GET /api/documents/:id/versions": "Version history of a document",
            "GET /api/documents/:id/download": "Download the stored file",
            "GET /api/document-proxy?url=": "Inline content of a stored file by locator",
            "GET /api/document-viewer?file=&page=": "Open a proxied file at a page",
            "DELETE /api/documents/:id": "Delete every version of a document",
            "DELETE /api/documents/:id/versions/:version": "Delete one version",
            "POST /api/search": "Hybrid search with a grounded system prompt",
            "POST /api/get_citation": "Resolve a citation token to its source"
        },
        "identity_headers": [USER_HEADER, GROUP_HEADER]
    }))
}

//! HTTP server for the RAG backend

pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Room for multipart framing on top of the largest accepted file
const MULTIPART_SLACK_BYTES: usize = 1024 * 1024;

/// RAG HTTP Server
pub struct RagServer {
    state: AppState,
}

impl RagServer {
    /// Create a new RAG server
    pub async fn new(config: RagConfig) -> Result<Self> {
        let state = AppState::new(config).await?;
        Ok(Self { state })
    }

    /// Serve an already wired state
    pub fn with_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let config = self.state.config();
        let max_upload = config.upload.max_file_size_bytes() as usize + MULTIPART_SLACK_BYTES;

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness))
            .nest("/api", routes::api_routes(max_upload))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new());

        if config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let address = self.address();
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address {}: {}", address, e)))?;

        let router = self.build_router();

        tracing::info!("Starting RAG server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        let server = &self.state.config().server;
        format!("{}:{}", server.host, server.port)
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint
async fn readiness(state: axum::extract::State<AppState>) -> axum::http::StatusCode {
    if state.is_ready() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{AnalyzeOperation, EmbeddingProvider, LayoutAnalyzer, LocalBlobStore};
    use crate::storage::{Database, SqliteSearchBackend};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use routes::{GROUP_HEADER, USER_HEADER};
    use serde_json::{json, Value};
    use state::{ClientBundle, Collaborators};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "tenant-rag-test-boundary";

    struct NoLayout;

    #[async_trait]
    impl LayoutAnalyzer for NoLayout {
        async fn begin_analyze(&self, _data: &[u8], _content_type: &str) -> Result<String> {
            Err(Error::extraction("layout service unavailable"))
        }

        async fn poll(&self, _operation: &str) -> Result<AnalyzeOperation> {
            Err(Error::extraction("layout service unavailable"))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }

        fn name(&self) -> &str {
            "none"
        }
    }

    /// Counts a few marker words so related texts land close together
    struct WordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for WordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(["revenue", "holiday", "budget"]
                .iter()
                .map(|w| lower.matches(w).count() as f32 + 0.01)
                .collect())
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "words"
        }
    }

    async fn server() -> (RagServer, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = RagConfig::default();
        config.storage.database_path = dir.path().join("rag.db");
        config.storage.blob_dir = dir.path().join("blobs");

        let db = Database::in_memory().unwrap();
        let collaborators = Collaborators {
            blobs: Arc::new(LocalBlobStore::new(&config.storage.blob_dir).await.unwrap()),
            layout: Arc::new(NoLayout),
            embeddings: Arc::new(WordEmbedder),
            search: Arc::new(SqliteSearchBackend::new(db.clone(), config.search.hybrid_alpha)),
        };
        let bundle = ClientBundle::build(&config, db, collaborators);
        let state = AppState::with_clients(config, bundle);
        state.set_ready(true);
        (RagServer::with_state(state), dir)
    }

    fn upload_request(user: &str, group: Option<&str>, scope: &str, file_name: &str, content: &str) -> Request<Body> {
        let mut body = String::new();
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"scope\"\r\n\r\n{scope}\r\n"
        ));
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/plain\r\n\r\n{content}\r\n"
        ));
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/documents/upload")
            .header(USER_HEADER, user)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"));
        if let Some(group) = group {
            builder = builder.header(GROUP_HEADER, group);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn json_request(method: &str, uri: &str, user: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_HEADER, user)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_HEADER, user)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let (status, body) = send(&router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        server.state().set_ready(false);
        let (status, _) = send(&router, Request::get("/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let request = Request::post("/api/search")
            .header("content-type", "application/json")
            .body(Body::from(json!({"query": "revenue"}).to_string()))
            .unwrap();
        let (status, body) = send_json(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "bad_request");
    }

    #[tokio::test]
    async fn test_upload_search_and_cite() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let (status, report) = send_json(
            &router,
            upload_request("alice", None, "personal", "q3.txt", "Quarterly revenue grew by ten percent."),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["chunks_created"], 1);
        assert_eq!(report["metadata"]["version"], 1);
        let doc_id = report["document_id"].as_str().unwrap().to_string();

        let (status, found) = send_json(
            &router,
            json_request("POST", "/api/search", "alice", json!({"query": "revenue"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(found["search_time_ms"].is_u64());
        let results = found["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["document_id"], doc_id.as_str());
        let prompt = found["system_prompt"].as_str().unwrap();
        assert!(prompt.contains(&format!("[#{}_0]", doc_id)));
        assert!(prompt.contains("(Source: q3.txt, Page: 1)"));

        // Another user sees nothing
        let (_, found) = send_json(
            &router,
            json_request("POST", "/api/search", "bob", json!({"query": "revenue"})),
        )
        .await;
        assert!(found["results"].as_array().unwrap().is_empty());

        let (status, citation) = send_json(
            &router,
            json_request(
                "POST",
                "/api/get_citation",
                "alice",
                json!({"citation_id": format!("{}_0", doc_id)}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(citation["found"], true);
        assert_eq!(citation["document_source"]["name"], "q3.txt");
        assert_eq!(
            citation["download_url"],
            format!("/api/documents/{}/download", doc_id).as_str()
        );
    }

    #[tokio::test]
    async fn test_resolved_links_are_served() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let (_, group_doc) = send_json(
            &router,
            upload_request("alice", Some("team-a"), "group", "plan.txt", "budget plan"),
        )
        .await;
        let (_, default_doc) = send_json(
            &router,
            upload_request("admin", None, "default", "policy.txt", "holiday policy"),
        )
        .await;

        let cite = |doc: &Value, group: Option<&str>| {
            let mut request = json_request(
                "POST",
                "/api/get_citation",
                "alice",
                json!({
                    "citation_id": format!("{}_0", doc["document_id"].as_str().unwrap()),
                    "group_id": group,
                }),
            );
            if let Some(group) = group {
                request.headers_mut().insert(GROUP_HEADER, group.parse().unwrap());
            }
            request
        };
        let with_group = |uri: &str, user: &str, group: &str| {
            let mut request = empty_request("GET", uri, user);
            request.headers_mut().insert(GROUP_HEADER, group.parse().unwrap());
            request
        };

        let (_, group_citation) = send_json(&router, cite(&group_doc, Some("team-a"))).await;
        assert_eq!(group_citation["found"], true);
        let download = group_citation["download_url"].as_str().unwrap();

        let (status, bytes) = send(&router, with_group(download, "alice", "team-a")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"budget plan");

        // Outside the group the link reveals nothing
        let (status, _) = send(&router, with_group(download, "bob", "team-b")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, default_citation) = send_json(&router, cite(&default_doc, None)).await;
        assert_eq!(default_citation["document_source"]["workspace_type"], "default");

        let download = default_citation["download_url"].as_str().unwrap();
        let (status, bytes) = send(&router, empty_request("GET", download, "bob")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"holiday policy");

        let proxy = default_citation["document_proxy_url"].as_str().unwrap();
        let (status, bytes) = send(&router, empty_request("GET", proxy, "bob")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"holiday policy");

        let viewer = default_citation["document_viewer_url"].as_str().unwrap();
        let response = router
            .clone()
            .oneshot(empty_request("GET", viewer, "bob"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], proxy);
    }

    #[tokio::test]
    async fn test_viewer_rejects_foreign_targets() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let (status, _) = send(
            &router,
            empty_request("GET", "/api/document-viewer?file=https%3A%2F%2Fevil.example&page=1", "alice"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_upload() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let (status, body) = send_json(
            &router,
            upload_request("alice", None, "personal", "tool.exe", "MZ"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "unsupported_type");
    }

    #[tokio::test]
    async fn test_group_upload_requires_group() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let (status, _) = send_json(
            &router,
            upload_request("alice", None, "group", "plan.txt", "budget"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, report) = send_json(
            &router,
            upload_request("alice", Some("team-a"), "group", "plan.txt", "budget"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["metadata"]["scope"]["kind"], "group");
        assert_eq!(report["metadata"]["scope"]["id"], "team-a");
    }

    #[tokio::test]
    async fn test_versions_download_and_delete() {
        let (server, _dir) = server().await;
        let router = server.build_router();

        let (_, first) = send_json(
            &router,
            upload_request("alice", None, "personal", "notes.txt", "holiday plan one"),
        )
        .await;
        let (_, second) = send_json(
            &router,
            upload_request("alice", None, "personal", "notes.txt", "holiday plan two"),
        )
        .await;
        assert_eq!(second["metadata"]["version"], 2);
        let first_id = first["document_id"].as_str().unwrap().to_string();
        let second_id = second["document_id"].as_str().unwrap().to_string();

        let (status, listed) = send_json(&router, empty_request("GET", "/api/documents?scope=personal", "alice")).await;
        assert_eq!(status, StatusCode::OK);
        let documents = listed["documents"].as_array().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["version"], 2);

        let (_, versions) = send_json(
            &router,
            empty_request("GET", &format!("/api/documents/{}/versions", second_id), "alice"),
        )
        .await;
        assert_eq!(versions["documents"].as_array().unwrap().len(), 2);

        // Bob cannot see alice's document
        let (status, _) = send_json(
            &router,
            empty_request("GET", &format!("/api/documents/{}/versions", second_id), "bob"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, bytes) = send(
            &router,
            empty_request("GET", &format!("/api/documents/{}/download", first_id), "alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"holiday plan one");

        let (status, deleted) = send_json(
            &router,
            empty_request("DELETE", &format!("/api/documents/{}/versions/1", second_id), "alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["document_id"], first_id.as_str());

        let (status, deleted) = send_json(
            &router,
            empty_request("DELETE", &format!("/api/documents/{}", second_id), "alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["deleted_versions"], 1);

        let (_, listed) = send_json(&router, empty_request("GET", "/api/documents", "alice")).await;
        assert!(listed["documents"].as_array().unwrap().is_empty());
    }
}

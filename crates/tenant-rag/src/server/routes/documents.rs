//! Document upload, listing, download and deletion endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ingestion::IngestReport;
use crate::retrieval::PROXY_PATH;
use crate::server::state::{AppState, ClientBundle};
use crate::types::DocumentMetadata;

use super::Requester;

/// Response body for listings
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentList {
    pub documents: Vec<DocumentMetadata>,
}

/// Response body for deletions
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub document_id: String,
    pub deleted_versions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "personal".to_string()
}

/// POST /api/documents/upload - Upload one file into a scope
pub async fn upload_document(
    State(state): State<AppState>,
    requester: Requester,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestReport>)> {
    let mut scope_kind = default_scope();
    let mut group_id: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "scope" => {
                scope_kind = field
                    .text()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read scope: {}", e)))?;
            }
            "group_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read group_id: {}", e)))?;
                group_id = Some(value).filter(|g| !g.trim().is_empty());
            }
            _ => {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((file_name, data));
            }
        }
    }

    let (file_name, data) = file.ok_or_else(|| Error::BadRequest("no file in upload".to_string()))?;
    let scope = requester.scope(scope_kind.trim(), group_id.as_deref())?;

    tracing::info!("Upload of {} ({} bytes) by {} into {}", file_name, data.len(), requester.user_id, scope);

    let report = state
        .clients()
        .pipeline
        .process_upload(data, &file_name, &scope)
        .await?;

    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/documents?scope= - Latest version of each file in a scope
pub async fn list_documents(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<ListQuery>,
) -> Result<Json<DocumentList>> {
    let scope = requester.scope(&query.scope, None)?;
    let latest = state.clients().documents.list_latest_per_file(&scope)?;

    Ok(Json(DocumentList {
        documents: latest.into_values().collect(),
    }))
}

/// GET /api/documents/:id/versions - Version history, newest first
pub async fn list_versions(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<Json<DocumentList>> {
    let clients = state.clients();
    visible_document(&clients.documents.get(&id)?, &requester, &id)?;

    Ok(Json(DocumentList {
        documents: clients.documents.list_versions(&id)?,
    }))
}

/// GET /api/documents/:id/download - Raw bytes of one upload
pub async fn download_document(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<Response> {
    let clients = state.clients();
    let record = clients.documents.get(&id)?;
    let doc = visible_document(&record, &requester, &id)?;

    serve_blob(&clients, doc, "attachment").await
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

/// GET /api/document-proxy?url= - Inline content by storage locator
pub async fn proxy_document(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<ProxyQuery>,
) -> Result<Response> {
    let clients = state.clients();
    let doc = clients
        .documents
        .find_by_locator(&query.url)?
        .into_iter()
        .find(|doc| requester.can_access(doc))
        .ok_or_else(|| Error::DocumentNotFound(query.url.clone()))?;

    serve_blob(&clients, &doc, "inline").await
}

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub file: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, rename = "type")]
    pub file_type: Option<String>,
}

/// GET /api/document-viewer - Open a proxied file, at the cited page for PDFs
pub async fn view_document(Query(query): Query<ViewerQuery>) -> Result<Redirect> {
    if !query.file.starts_with(&format!("{}?", PROXY_PATH)) {
        return Err(Error::BadRequest("viewer only opens proxied documents".to_string()));
    }

    let target = match (query.file_type.as_deref(), query.page) {
        (Some("pdf"), Some(page)) => format!("{}#page={}", query.file, page.max(1)),
        _ => query.file,
    };
    Ok(Redirect::to(&target))
}

async fn serve_blob(clients: &ClientBundle, doc: &DocumentMetadata, disposition: &str) -> Result<Response> {
    let blobs = clients.documents.blobs();
    let properties = blobs.properties(&doc.storage_locator).await?;
    let data = blobs.get(&doc.storage_locator).await?;

    let disposition = format!(
        "{}; filename=\"{}\"",
        disposition,
        doc.file_name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, properties.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

/// DELETE /api/documents/:id - Delete every version
pub async fn delete_document(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let clients = state.clients();
    visible_document(&clients.documents.get(&id)?, &requester, &id)?;

    let deleted_versions = clients.documents.delete_all_versions(&id).await?;
    Ok(Json(DeleteResponse {
        document_id: id,
        deleted_versions,
    }))
}

/// DELETE /api/documents/:id/versions/:version - Delete one version of the document
pub async fn delete_version(
    State(state): State<AppState>,
    requester: Requester,
    Path((id, version)): Path<(String, u32)>,
) -> Result<Json<DeleteResponse>> {
    let clients = state.clients();
    visible_document(&clients.documents.get(&id)?, &requester, &id)?;

    let target = clients
        .documents
        .list_versions(&id)?
        .into_iter()
        .find(|doc| doc.version == version)
        .ok_or_else(|| Error::DocumentNotFound(format!("{} v{}", id, version)))?;

    clients.documents.delete_version(&target.id, version).await?;
    Ok(Json(DeleteResponse {
        document_id: target.id,
        deleted_versions: 1,
    }))
}

/// Documents the caller cannot see are reported as missing
fn visible_document<'a>(
    doc: &'a Option<DocumentMetadata>,
    requester: &Requester,
    id: &str,
) -> Result<&'a DocumentMetadata> {
    match doc {
        Some(doc) if requester.can_access(doc) => Ok(doc),
        _ => Err(Error::DocumentNotFound(id.to_string())),
    }
}

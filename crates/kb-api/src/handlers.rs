//! Route handler functions for all API endpoints.
//!
//! Handlers never check roles; the router's middleware does. They read the
//! [`Principal`] extension only to attribute created documents.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use kb_core::types::{Document, KnowledgeBaseStats, Principal, SearchResult};
use kb_service::ImportReport;

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: Option<String>,
    pub category: Option<String>,
    /// Kept as text so a malformed value gets a JSON 400 from the handler.
    pub max_results: Option<String>,
}

impl SearchParams {
    /// Requested result cap, clamped to `[1, max_limit]`.
    fn result_cap(&self, default: usize, max_limit: usize) -> Result<usize, ApiError> {
        let requested = match self.max_results.as_deref().map(str::trim) {
            None | Some("") => default as i64,
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                ApiError::BadRequest(format!(
                    "Parameter 'maxResults' must be an integer, got '{}'",
                    raw
                ))
            })?,
        };
        Ok(requested.clamp(1, max_limit.max(1) as i64) as usize)
    }
}

/// Body of POST and PUT `/api/documents`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DocumentRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl DocumentRequest {
    /// Trimmed title and content, or 400 if either is blank.
    fn validated(&self) -> Result<(&str, &str), ApiError> {
        let title = self.title.as_deref().map(str::trim).unwrap_or_default();
        let content = self.content.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() || content.is_empty() {
            return Err(ApiError::BadRequest(
                "Title and content are required".to_string(),
            ));
        }
        Ok((title, content))
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub engine_healthy: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthCheckResponse {
    pub authenticated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub username: String,
    pub role: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub total_results: usize,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// =============================================================================
// Public
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        engine_healthy: state.kb.store().is_engine_healthy().await,
    })
}

/// GET /api/auth/check - whether the request carries a valid token.
pub async fn auth_check(State(state): State<AppState>, headers: HeaderMap) -> Json<AuthCheckResponse> {
    Json(AuthCheckResponse {
        authenticated: auth::authenticate(&state, &headers).is_ok(),
    })
}

// =============================================================================
// Authenticated
// =============================================================================

/// GET /api/auth/me
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse {
        role: principal.role.as_str().to_string(),
        is_admin: principal.is_admin(),
        username: principal.username,
    })
}

/// GET /api/documents
pub async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.kb.all_documents().await?))
}

/// GET /api/documents/{id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    state
        .kb
        .get_document(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {}", id)))
}

/// GET /api/search?query=&category=&maxResults=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Parameter 'query' is required".to_string()))?
        .to_string();

    let search = &state.config.search;
    let max_results = params.result_cap(search.default_max_results, search.max_limit)?;

    let results = state
        .kb
        .semantic_search_in_category(&query, max_results, params.category.as_deref())
        .await;

    Ok(Json(SearchResponse {
        query,
        total_results: results.len(),
        results,
    }))
}

/// GET /api/categories
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.kb.categories().await?))
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Json<KnowledgeBaseStats> {
    Json(state.kb.stats().await)
}

// =============================================================================
// Admin
// =============================================================================

/// POST /api/documents
pub async fn create_document(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<DocumentRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let (title, content) = body.validated()?;
    let doc = state
        .kb
        .add_document(
            title,
            content,
            body.category.as_deref(),
            Some(principal.username),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// PUT /api/documents/{id}
pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DocumentRequest>,
) -> Result<Json<Document>, ApiError> {
    let (title, content) = body.validated()?;
    state
        .kb
        .update_document(&id, title, content, body.category.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {}", id)))
}

/// DELETE /api/documents/{id}
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<MessageResponse> {
    state.kb.delete_document(&id).await;
    Json(MessageResponse {
        message: "Document deleted successfully".to_string(),
    })
}

/// DELETE /api/documents/all
pub async fn delete_all(State(state): State<AppState>) -> Result<Json<SuccessResponse>, ApiError> {
    state.kb.delete_all().await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/engine/stats
pub async fn engine_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.kb.engine_stats().await)
}

/// POST /api/import - multipart upload with a `file` field.
pub async fn import(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    mut multipart: Multipart,
) -> Result<Json<ImportReport>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no name".to_string()))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Please select a file to upload".to_string()));
        }

        let report = state
            .importer
            .import_file(&filename, bytes.to_vec(), &principal.username)
            .await?;
        return Ok(Json(report));
    }
    Err(ApiError::BadRequest("Missing 'file' field".to_string()))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

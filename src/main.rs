//! Doc Inbox - document search/filter and upload lifecycle server.

mod catalog;
mod config;
mod filter;
mod notifications;
mod schema;
mod service;
mod upload;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use catalog::DocumentCatalog;
use config::AppConfig;
use filter::{InboxSession, SearchFilters, ViewMode};
use notifications::NotificationLog;
use schema::{Document, DocumentStats, FacetParseError};
use serde::Serialize;
use service::{ServiceError, UploadHandle};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload::{DropzonePolicy, FileRef, IntakeRejection, UploadNotification, UploadSnapshot, UploadTask};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    catalog: Arc<DocumentCatalog>,
    uploads: UploadHandle,
    notifications: NotificationLog,
    dropzone: DropzonePolicy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "doc_inbox=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let catalog = match &config.documents_dir {
        Some(dir) => DocumentCatalog::load_from_dir(dir)?,
        None => {
            info!("INBOX_DOCUMENTS_DIR not set, serving the sample catalog");
            DocumentCatalog::sample()
        }
    };
    info!("Catalog ready: {} documents", catalog.len());

    let notifications = NotificationLog::new(config.notification_history);
    let uploads = service::spawn(config.timing(), config.failure_rate, notifications.clone());

    let state = AppState {
        catalog: Arc::new(catalog),
        uploads,
        notifications,
        dropzone: DropzonePolicy::new(config.max_upload_bytes),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/documents", get(list_documents))
        .route("/documents/:id", get(get_document))
        .route("/stats", get(get_stats))
        .route("/uploads", post(create_uploads).get(list_uploads))
        .route("/uploads/:id", delete(remove_upload))
        .route("/uploads/:id/retry", post(retry_upload))
        .route("/notifications", get(list_notifications))
        .layer(DefaultBodyLimit::max(256 * 1024 * 1024)) // 256MB per request, files checked individually
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

type ApiError = (StatusCode, String);

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Deserialize)]
struct DocumentsQuery {
    q: Option<String>,
    status: Option<String>,
    language: Option<String>,
    date_range: Option<String>,
    view: Option<String>,
}

/// Search and filter the inbox.
async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<DocumentsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = session_from_query(&query).map_err(bad_request)?;
    let view = session.view(state.catalog.documents());
    serde_json::to_value(&view).map(Json).map_err(|e| {
        error!("Failed to render inbox view: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to render inbox: {}", e))
    })
}

/// Get a single document.
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, StatusCode> {
    state
        .catalog
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Status counts over the whole catalog.
async fn get_stats(State(state): State<AppState>) -> Json<DocumentStats> {
    Json(state.catalog.stats())
}

#[derive(Serialize)]
struct UploadResponse {
    accepted: Vec<UploadTask>,
    rejected: Vec<IntakeRejection>,
}

/// Accept any number of `file` fields and start an upload for each.
async fn create_uploads(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if !matches!(field.name(), Some("file") | Some("files")) {
            continue;
        }
        let name = field.file_name().unwrap_or("document").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
        })?;

        let mut file = FileRef::new(name, data.len() as u64);
        file.content_type = content_type;
        files.push(file);
    }

    if files.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    info!("Received {} files for upload", files.len());
    let (accepted, rejected) = state.dropzone.partition(files);
    let accepted = state.uploads.intake(accepted).await.map_err(unavailable)?;
    Ok(Json(UploadResponse { accepted, rejected }))
}

/// Every managed upload plus status counts.
async fn list_uploads(State(state): State<AppState>) -> Result<Json<UploadSnapshot>, ApiError> {
    state.uploads.snapshot().await.map(Json).map_err(unavailable)
}

/// Remove an upload in any state. Unknown ids are not an error.
async fn remove_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.uploads.remove(&id).await.map_err(unavailable)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restart an upload under a new id.
async fn retry_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UploadTask>, ApiError> {
    state
        .uploads
        .retry(&id)
        .await
        .map_err(unavailable)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown upload: {}", id)))
}

#[derive(serde::Deserialize)]
struct NotificationsQuery {
    limit: Option<usize>,
}

/// Most recent upload notifications, newest first.
async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Json<Vec<UploadNotification>> {
    Json(state.notifications.recent(query.limit.unwrap_or(20)))
}

// ============================================================================
// Helper functions
// ============================================================================

fn session_from_query(query: &DocumentsQuery) -> Result<InboxSession, FacetParseError> {
    let filters = SearchFilters::from_params(
        query.status.as_deref(),
        query.language.as_deref(),
        query.date_range.as_deref(),
    )?;
    let view_mode = match query.view.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(view) => view.parse::<ViewMode>()?,
        None => ViewMode::default(),
    };
    Ok(InboxSession::with_state(
        query.q.clone().unwrap_or_default(),
        filters,
        view_mode,
    ))
}

fn bad_request(e: FacetParseError) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn unavailable(e: ServiceError) -> ApiError {
    error!("Upload service error: {}", e);
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}

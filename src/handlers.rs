//! HTTP Handlers
//!
//! REST endpoints for sessions, search and document upload.

use crate::error::{AuthError, ServiceError};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::middleware;
use crate::models::*;
use crate::state::AppState;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::services::ServeDir;
use validator::Validate;

// ============================================
// Route Builder
// ============================================

/// Create the API and archive routes
pub fn create_routes(state: AppState) -> Router {
    // Public routes (no authentication required)
    let public = Router::new()
        .route("/api/login", post(login))
        .route("/api/refresh", post(refresh));

    // Routes that behave differently for signed-in callers
    let optional = Router::new()
        .route("/api/session", get(session))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/register", post(register))
        .route("/api/authChecker", get(auth_checker))
        .route("/api/search", get(search))
        .route("/api/uploadHtmlFile", post(upload_html_file))
        .route("/api/upload", post(add_document))
        .nest_service("/archive", ServeDir::new(state.archive.root()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(optional)
        .merge(protected)
        .with_state(state)
}

// ============================================
// Sessions
// ============================================

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    let response = state.sessions.login(&req.username, &req.password).await?;

    Ok(Json(response))
}

/// POST /api/register
///
/// Accounts are created by already signed-in users.
pub async fn register(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let response = state.sessions.register(&req.username, &req.password).await?;

    tracing::info!(
        created_by = caller.identity.id,
        user_id = response.user.id,
        "Account created"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    let response = state.sessions.refresh(&req.token).await?;

    Ok(Json(response))
}

/// GET /api/session
pub async fn session(MaybeUser(context): MaybeUser) -> impl IntoResponse {
    match context {
        Some(context) => Json(serde_json::json!({
            "authenticated": true,
            "user": UserResponse::from(&context.identity),
            "expires_at": context.claims.expires_at(),
        })),
        None => Json(serde_json::json!({ "authenticated": false })),
    }
}

/// GET /api/authChecker
pub async fn auth_checker(CurrentUser(context): CurrentUser) -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Already logged in",
        "user": UserResponse::from(&context.identity),
    }))
}

// ============================================
// Search
// ============================================

/// GET /api/search?q=&p=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let keyword = query.q.trim();
    if keyword.is_empty() {
        return Err(ServiceError::Validation(
            "Missing query parameter 'q'".into(),
        ));
    }

    let page = match query.p.as_deref().map(str::trim) {
        None | Some("") => 1,
        Some(p) => p
            .parse::<u64>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ServiceError::Validation("Parameter 'p' must be a positive integer".into()))?,
    };

    let results = state.search.query(keyword, page).await?;

    Ok(Json(results))
}

// ============================================
// Uploads
// ============================================

/// POST /api/uploadHtmlFile
pub async fn upload_html_file(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .ok_or_else(|| ServiceError::Validation("No filename provided".into()))?
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        state.archive.store_upload(&filename, &data).await?;

        tracing::info!(user_id = caller.identity.id, file = %filename, "HTML file uploaded");

        return Ok(Json(MessageResponse::new("File uploaded successfully")));
    }

    Err(ServiceError::Validation("No file uploaded".into()))
}

/// POST /api/upload
///
/// Adds one uploaded file to the index and moves it into the archive.
pub async fn add_document(
    State(state): State<AppState>,
    Json(req): Json<AddDocumentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    if req.domain.trim().is_empty() {
        return Err(ServiceError::Validation("Domain is required".into()));
    }

    let [file] = req.files.as_slice() else {
        return Err(ServiceError::Validation(
            "Exactly one file must be submitted".into(),
        ));
    };

    if file.name.trim().is_empty() {
        return Err(ServiceError::Validation("File name is required".into()));
    }

    let document = state.archive.prepare(&file.name, &req.domain).await?;

    // The upload stays in place until indexing succeeds, so a failed
    // attempt can be retried
    state.search.add_document(document.clone()).await?;
    state.archive.promote(&document).await?;

    Ok(Json(serde_json::json!({
        "message": "File indexed successfully",
        "id": document.id,
        "path": document.path,
    })))
}

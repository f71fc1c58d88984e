//! HTTP surface and the thin orchestration around the resolver.
//!
//! Handlers stay small: they read the session, delegate to
//! [`process_submission`] or a repository call, and shape the JSON
//! response. `process_submission` itself is independent of axum so the
//! integration tests drive the full resolve → render-URL → persist
//! sequence without a listening server.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, instrument};

use crate::db::{self, Pool, QrHistoryEntry};
use crate::model::{FrameStyle, RawSubmission, ShapeStyle, StylingOptions, UploadedFile};
use crate::render::{render_url, RenderService};
use crate::resolver::{self, ResolveError, ValidationErrors};
use crate::session;
use crate::upload::UploadService;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub renderer: Arc<dyn RenderService>,
    pub uploader: Arc<dyn UploadService>,
    pub render_base: Url,
    pub background: String,
    pub session_ttl_hours: i64,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid submission: {0}")]
    Validation(ValidationErrors),
    #[error("unsupported content kind: {0}")]
    UnsupportedKind(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("upstream service failure")]
    Upstream(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Invalid(errors) => ApiError::Validation(errors),
            ResolveError::UnsupportedKind(tag) => ApiError::UnsupportedKind(tag),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "Validation failed.", "errors": errors.into_map() }),
            ),
            ApiError::UnsupportedKind(tag) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Invalid QR code type: {}.", tag) }),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid email or password." }),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Authentication required." }),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Not found." })),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::Upstream(err) => {
                error!(?err, "upstream collaborator failure");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Upstream service failure." }),
                )
            }
            ApiError::Internal(err) => {
                error!(?err, "request failed unexpectedly");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An unexpected error occurred." }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// One content submission as posted by the form UI. Field values are all
/// strings, mirroring form-data semantics; the optional `file` carries the
/// reference returned by `/api/upload`.
#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub file: Option<UploadedFile>,
    #[serde(flatten)]
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub qr_image_url: String,
    pub text: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session_info))
        .route("/api/qr", post(generate))
        .route("/api/upload", post(upload))
        .route("/api/qr/history", get(history))
        .route("/api/qr/history/{id}", delete(delete_entry))
        .route("/api/qr/history/{id}/image", get(history_image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Sequence a submission end to end: resolve, build the render URL, and
/// persist to the owner's history when one is present. Resolution failures
/// abort before anything is written or fetched.
#[instrument(skip_all)]
pub async fn process_submission(
    pool: &Pool,
    owner: Option<i64>,
    request: SubmissionRequest,
    render_base: &Url,
    background: &str,
) -> Result<GenerateResponse, ApiError> {
    let raw = RawSubmission::from_parts(request.fields, request.file);
    let resolved = resolver::resolve(&request.kind, &raw)?;
    let image_url = render_url(render_base, &resolved.payload, &resolved.styling, background);

    let record_id = match owner {
        Some(user_id) => Some(db::insert_qr_code(pool, user_id, &resolved).await?),
        None => None,
    };

    Ok(GenerateResponse {
        qr_image_url: image_url.to_string(),
        text: resolved.display_text,
        message: "QR Code generated!".to_string(),
        record_id,
    })
}

async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = session::current_owner(&state.pool, &headers).await?;
    let response =
        process_submission(&state.pool, owner, request, &state.render_base, &state.background)
            .await?;
    Ok(Json(response))
}

async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = ValidationErrors::default();
    if !resolver::is_email(&credentials.email) {
        errors.add("email", "Invalid email address.");
    }
    if credentials.password.len() < 8 {
        errors.add("password", "Password must be at least 8 characters.");
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let hash = bcrypt::hash(&credentials.password, bcrypt::DEFAULT_COST)
        .map_err(anyhow::Error::from)?;
    let Some(user_id) = db::create_user(&state.pool, &credentials.email, &hash).await? else {
        let mut errors = ValidationErrors::default();
        errors.add("email", "An account with this email already exists.");
        return Err(ApiError::Validation(errors));
    };

    let token = session::issue(&state.pool, user_id, state.session_ttl_hours).await?;
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session::set_cookie(&token, state.session_ttl_hours))],
        Json(json!({ "userId": user_id })),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let user = db::find_user_by_email(&state.pool, &credentials.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;
    let valid = bcrypt::verify(&credentials.password, &user.password_hash)
        .map_err(anyhow::Error::from)?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    let token = session::issue(&state.pool, user.id, state.session_ttl_hours).await?;
    Ok((
        [(header::SET_COOKIE, session::set_cookie(&token, state.session_ttl_hours))],
        Json(json!({ "userId": user.id })),
    ))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    session::clear(&state.pool, &headers).await?;
    Ok((
        [(header::SET_COOKIE, session::clear_cookie())],
        Json(json!({ "ok": true })),
    ))
}

async fn session_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner = session::current_owner(&state.pool, &headers).await?;
    Ok(Json(json!({ "userId": owner })))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Invalid multipart body: {}.", err)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.bin").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(format!("Invalid multipart body: {}.", err)))?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty.".to_string()));
        }

        let stored = state
            .uploader
            .store(&file_name, &content_type, bytes.to_vec())
            .await
            .map_err(ApiError::Upstream)?;
        return Ok(Json(stored));
    }
    Err(ApiError::BadRequest(
        "Multipart field 'file' is required.".to_string(),
    ))
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner = require_owner(&state, &headers).await?;
    let entries = db::list_qr_history(&state.pool, owner).await?;
    Ok(Json(entries))
}

async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = require_owner(&state, &headers).await?;
    if !db::delete_qr_code(&state.pool, owner, id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "deleted": true })))
}

/// Proxy the rendered PNG for a stored history entry, re-rendering from the
/// persisted display text and styling exactly like the dashboard cards do.
async fn history_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = require_owner(&state, &headers).await?;
    let entry = db::get_qr_code(&state.pool, owner, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let styling = styling_from_entry(&entry);
    let url = render_url(&state.render_base, &entry.display_text, &styling, &state.background);
    let bytes = state
        .renderer
        .fetch_image(&url)
        .await
        .map_err(ApiError::Upstream)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"qrcode-{}.png\"", entry.id),
            ),
        ],
        bytes,
    ))
}

async fn require_owner(state: &AppState, headers: &HeaderMap) -> Result<i64, ApiError> {
    session::current_owner(&state.pool, headers)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// Rebuild styling from a stored row. Tags that no longer parse degrade to
/// unstyled rather than failing the whole request.
pub fn styling_from_entry(entry: &QrHistoryEntry) -> StylingOptions {
    StylingOptions {
        color: entry.color.clone(),
        size: entry.size.clamp(50, 1000) as u32,
        frame: entry.frame.as_deref().and_then(FrameStyle::parse),
        shape: entry.shape.as_deref().and_then(ShapeStyle::parse),
        logo_url: entry.logo_url.clone(),
    }
}

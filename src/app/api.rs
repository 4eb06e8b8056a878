pub mod auth;
pub mod state;

use super::ingest::{Upload, UploadDir};
use super::model::prompt::PromptSpec;
use super::service::{SessionInfo, Segmentation};
use crate::error::Error;
pub use state::ApiState;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::error;

/// Routes of the segmentation server, with stored uploads served under `/uploads`.
pub fn router(state: ApiState, max_upload_bytes: usize) -> Router {
    let uploads = ServeDir::new(state.service.store().uploads().root());

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth", post(auth_handler))
        .route("/session/start", post(start_session_handler))
        .route("/segment", post(segment_handler))
        .route("/session/end", post(end_session_handler))
        .nest_service(UploadDir::URL_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `Error` as an HTTP response with a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::ImageDecode(_) | Error::InvalidPrompt(_) => StatusCode::BAD_REQUEST,
            Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Error::AuthFailure => StatusCode::UNAUTHORIZED,
            Error::ModelFailure(_) | Error::Config(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// embedding and prediction occupy a thread for their whole duration
async fn run_blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::ModelFailure(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cuda_device_name: Option<String>,
    sessions: usize,
}

async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    let device = state.service.device();

    Json(HealthResponse {
        status: "ok",
        device: device.device.to_string(),
        cuda_device_name: device.name.clone(),
        sessions: state.service.active_sessions(),
    })
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    #[serde(default)]
    password: Option<String>,
}

async fn auth_handler(
    State(state): State<ApiState>,
    Json(request): Json<AuthRequest>,
) -> ApiResult<Value> {
    state
        .auth
        .check(request.password.as_deref().unwrap_or_default())?;

    Ok(Json(json!({ "ok": true })))
}

async fn start_session_handler(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> ApiResult<SessionInfo> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::ImageDecode(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::ImageDecode(e.to_string()))?;
        upload = Some(Upload {
            bytes: bytes.to_vec(),
            filename,
        });
        break;
    }

    let upload =
        upload.ok_or_else(|| Error::ImageDecode("missing multipart field 'file'".to_string()))?;

    let service = state.service.clone();
    let info = run_blocking(move || service.start_session(upload)).await?;
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
struct SegmentRequest {
    session_id: String,
    #[serde(flatten)]
    prompt: PromptSpec,
}

async fn segment_handler(
    State(state): State<ApiState>,
    Json(request): Json<SegmentRequest>,
) -> ApiResult<Segmentation> {
    let service = state.service.clone();
    let segmentation =
        run_blocking(move || service.segment(&request.session_id, &request.prompt)).await?;

    Ok(Json(segmentation))
}

#[derive(Debug, Deserialize)]
struct EndSessionRequest {
    session_id: String,
}

async fn end_session_handler(
    State(state): State<ApiState>,
    Json(request): Json<EndSessionRequest>,
) -> ApiResult<Value> {
    state.service.end_session(&request.session_id)?;

    Ok(Json(json!({ "status": "ended" })))
}

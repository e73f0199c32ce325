//! REST API server
//!
//! Bearer-authenticated chat, upload, history and profile endpoints, plus
//! static serving of rendered graphs.

use axum::{
    extract::{FromRequestParts, Multipart, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::error::OrchestrationError;
use crate::models::CurrentUser;
use crate::service::ChatService;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub query: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            Err(e) => {
                error!("Failed to serialize response data: {}", e);
                Self::error("Failed to serialize response".to_string())
            }
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// Error Mapping
/// =============================

/// Maps domain errors to a status and a short client message.
#[derive(Debug)]
pub struct ApiError(pub OrchestrationError);

impl From<OrchestrationError> for ApiError {
    fn from(e: OrchestrationError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            OrchestrationError::Auth(_) => {
                (StatusCode::UNAUTHORIZED, "Could not validate credentials".to_string())
            }
            OrchestrationError::AlreadyConcluded => (
                StatusCode::FORBIDDEN,
                "This interview has already been concluded.".to_string(),
            ),
            OrchestrationError::UnknownRole(role) => {
                (StatusCode::BAD_REQUEST, format!("Unknown role: {}", role))
            }
            OrchestrationError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            OrchestrationError::Invocation(_) => {
                (StatusCode::BAD_GATEWAY, "Model provider request failed".to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", self.0);
        } else {
            warn!(status = status.as_u16(), "Request rejected: {}", self.0);
        }

        (status, Json(ApiResponse::error(message))).into_response()
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ChatService>,
    pub auth: Arc<dyn Authenticator>,
    /// Rendered graphs directory
    pub graph_dir: PathBuf,
    /// Path the graphs directory is mounted at
    pub graph_url_prefix: String,
}

/// Authenticated caller, resolved from `Authorization: Bearer <token>`.
pub struct AuthUser(pub CurrentUser);

#[axum::async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| OrchestrationError::Auth("Missing bearer token".to_string()))?;

        let user = state.auth.current_user(token).await?;
        Ok(AuthUser(user))
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    info!(user = %user.username, "Received chat request");

    let payload = state.service.chat(&user, &req.query).await?;
    Ok(Json(ApiResponse::success(payload)))
}

async fn upload_handler(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        OrchestrationError::InvalidRequest(format!("Malformed upload: {}", e))
    };

    let mut query: Option<String> = None;
    let mut file: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => file = Some(field.bytes().await.map_err(invalid)?.to_vec()),
            Some("query") => query = Some(field.text().await.map_err(invalid)?),
            _ => {}
        }
    }

    let file = file.ok_or_else(|| OrchestrationError::InvalidRequest("Missing file field".to_string()))?;
    info!(user = %user.username, bytes = file.len(), "Received upload");

    let payload = state.service.upload(&user, query.as_deref(), &file).await?;
    Ok(Json(ApiResponse::success(payload)))
}

async fn history_handler(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse>, ApiError> {
    let history = state.service.history(&user).await?;
    Ok(Json(ApiResponse::success(history)))
}

async fn me_handler(State(state): State<ApiState>, AuthUser(user): AuthUser) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.service.me(&user)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/upload", post(upload_handler))
        .route("/api/history", get(history_handler))
        .route("/api/me", get(me_handler));

    let prefix = state.graph_url_prefix.trim_end_matches('/');
    if prefix.starts_with('/') && prefix.len() > 1 {
        router = router.nest_service(prefix, ServeDir::new(&state.graph_dir));
    }

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

//! Admin HTTP API
//!
//! JSON endpoints under `/admin/api`, all behind bearer-token authentication.
//! Every authenticated request lands in the admin action log.

use super::auth::{AdminAuthenticator, AdminIdentity};
use super::AdminService;
use crate::types::ParticipantId;
use anyhow::{Context, Result};
use axum::{
    extract::{OriginalUri, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct AdminServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for AdminServerConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AdminApiState {
    pub service: Arc<AdminService>,
    pub authenticator: Arc<dyn AdminAuthenticator>,
}

/// Handler failure rendered as a JSON error body
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Admin request failed: {:#}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message, "code": "AUTH_ERROR" })),
    )
        .into_response()
}

/// Resolve the bearer token to an admin and log the request
async fn require_admin(
    State(state): State<AdminApiState>,
    OriginalUri(uri): OriginalUri,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token else {
        return unauthorized("Missing bearer token");
    };

    let identity = match state.authenticator.authenticate(token).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return unauthorized("Invalid token"),
        Err(e) => {
            error!("Admin authentication error: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Authentication unavailable", "code": "AUTH_ERROR" })),
            )
                .into_response();
        }
    };

    let action = format!("{} {}", request.method(), uri.path());
    debug!("Admin {} requested {}", identity.admin_id, action);

    request.extensions_mut().insert(identity.clone());
    let response = next.run(request).await;

    state
        .service
        .record_action(&identity.admin_id, &action)
        .await;

    response
}

/// Build the admin router
pub fn create_router(state: AdminApiState) -> Router {
    let api = Router::new()
        .route("/stats", get(stats_handler))
        .route("/users", get(users_handler))
        .route("/users/{id}", get(user_handler))
        .route("/users/{id}/messages", get(user_messages_handler))
        .route("/users/{id}/ban", post(ban_handler))
        .route("/users/{id}/unban", post(unban_handler))
        .route("/messages", get(messages_handler))
        .route("/search", get(search_handler))
        .route("/actions", get(actions_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .nest("/admin/api", api)
        .with_state(state)
}

async fn stats_handler(State(state): State<AdminApiState>) -> ApiResult<super::SystemStats> {
    Ok(Json(state.service.system_stats().await?))
}

async fn users_handler(
    State(state): State<AdminApiState>,
) -> ApiResult<Vec<crate::types::ParticipantRecord>> {
    Ok(Json(state.service.list_participants().await?))
}

async fn user_handler(
    State(state): State<AdminApiState>,
    Path(id): Path<ParticipantId>,
) -> ApiResult<super::UserAnalytics> {
    match state.service.user_analytics(id).await? {
        Some(analytics) => Ok(Json(analytics)),
        None => Err(ApiError::not_found(format!("Participant {} not found", id))),
    }
}

async fn user_messages_handler(
    State(state): State<AdminApiState>,
    Path(id): Path<ParticipantId>,
) -> ApiResult<Vec<crate::types::MessageRecord>> {
    Ok(Json(state.service.user_history(id).await?))
}

async fn messages_handler(
    State(state): State<AdminApiState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<crate::types::MessageRecord>> {
    Ok(Json(state.service.recent_messages(params.limit).await?))
}

async fn search_handler(
    State(state): State<AdminApiState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<crate::types::MessageRecord>> {
    Ok(Json(state.service.search_messages(&params.q).await?))
}

async fn actions_handler(
    State(state): State<AdminApiState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<crate::types::AdminAction>> {
    Ok(Json(state.service.recent_admin_actions(params.limit).await?))
}

async fn set_banned(
    state: &AdminApiState,
    admin: &AdminIdentity,
    id: ParticipantId,
    banned: bool,
) -> ApiResult<serde_json::Value> {
    if state.service.set_banned(&admin.admin_id, id, banned).await? {
        Ok(Json(json!({ "participant": id, "banned": banned })))
    } else {
        Err(ApiError::not_found(format!("Participant {} not found", id)))
    }
}

async fn ban_handler(
    State(state): State<AdminApiState>,
    Extension(admin): Extension<AdminIdentity>,
    Path(id): Path<ParticipantId>,
) -> ApiResult<serde_json::Value> {
    set_banned(&state, &admin, id, true).await
}

async fn unban_handler(
    State(state): State<AdminApiState>,
    Extension(admin): Extension<AdminIdentity>,
    Path(id): Path<ParticipantId>,
) -> ApiResult<serde_json::Value> {
    set_banned(&state, &admin, id, false).await
}

/// HTTP server for the admin API
pub struct AdminServer {
    config: AdminServerConfig,
    state: AdminApiState,
    shutdown_tx: broadcast::Sender<()>,
}

impl AdminServer {
    pub fn new(
        config: AdminServerConfig,
        service: Arc<AdminService>,
        authenticator: Arc<dyn AdminAuthenticator>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: AdminApiState {
                service,
                authenticator,
            },
            shutdown_tx,
        }
    }

    /// Serve until [`AdminServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid admin server address")?;

        let app = create_router(self.state.clone());
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind admin server to {}", addr))?;

        info!("Admin API listening on http://{}/admin/api", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Admin server shutdown signal received");
            })
            .await?;

        info!("Admin server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to admin server: {}", e);
        }
    }
}

//! Monitoring HTTP server: health probes, Prometheus scrape and live stats
//!
//! Routes:
//! - `/health` JSON liveness summary, 503 when unhealthy
//! - `/ready` and `/alive` plain text probes for orchestrators
//! - `/metrics` Prometheus text exposition
//! - `/stats` queue sizes, session counters and the audit trail totals

use crate::admin::SystemStats;
use crate::metrics::collector::MetricsCollector;
use crate::service::app::ServiceContext;
use crate::service::health::{ComponentCheck, HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "anon-chat";

/// Monitoring server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub context: Option<Arc<ServiceContext>>,
}

pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                context: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the running service; without it every probe reports 503
    pub fn with_context(mut self, context: Arc<ServiceContext>) -> Self {
        self.state.context = Some(context);
        self
    }

    /// Bind and serve until [`HealthServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid monitoring server address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind monitoring server to {}", addr))?;
        info!("Monitoring server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("Monitoring server stopped");
        Ok(())
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/alive", get(alive))
            .route("/metrics", get(metrics))
            .route("/stats", get(stats))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Monitoring server was not running");
        }
        Ok(())
    }
}

/// Encode every registered metric in the Prometheus text format
pub fn render_metrics(metrics_collector: &MetricsCollector) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&metrics_collector.registry().gather())
        .context("Failed to encode metrics")
}

fn not_initialized() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": HealthStatus::Unhealthy,
            "service": SERVICE_NAME,
            "error": "Service not initialized"
        })),
    )
        .into_response()
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": crate::VERSION,
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"]
    }))
}

async fn health(State(state): State<HealthServerState>) -> Response {
    let Some(context) = state.context else {
        return not_initialized();
    };

    let status = HealthCheck::liveness_check(context.clone())
        .await
        .unwrap_or(HealthStatus::Unhealthy);
    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": context.config().service.name,
            "version": crate::VERSION
        })),
    )
        .into_response()
}

async fn ready(State(state): State<HealthServerState>) -> (StatusCode, &'static str) {
    let Some(context) = state.context else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::readiness_check(context).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

async fn alive(State(state): State<HealthServerState>) -> (StatusCode, &'static str) {
    let Some(context) = state.context else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::liveness_check(context).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Alive"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
    }
}

async fn metrics(State(state): State<HealthServerState>) -> Response {
    match render_metrics(&state.metrics_collector) {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("{:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct WaitingView {
    male: usize,
    female: usize,
    any: usize,
}

#[derive(Debug, Serialize)]
struct SessionsView {
    active: usize,
    matched: u64,
    ended: u64,
    searches_cancelled: u64,
}

/// Body of `/stats`
#[derive(Debug, Serialize)]
struct StatsView {
    service: String,
    version: &'static str,
    status: HealthStatus,
    uptime: String,
    waiting: WaitingView,
    sessions: SessionsView,
    audit_pending: usize,
    /// Totals from the audit trail; null when storage is unreachable
    system: Option<SystemStats>,
    components: Vec<ComponentCheck>,
    timestamp: DateTime<Utc>,
}

async fn stats(State(state): State<HealthServerState>) -> Response {
    let Some(context) = state.context else {
        return not_initialized();
    };

    let report = match HealthCheck::check(context.clone()).await {
        Ok(report) => report,
        Err(e) => {
            error!("Failed to collect service stats: {:#}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Failed to collect service stats" })),
            )
                .into_response();
        }
    };

    let system = context
        .admin()
        .system_stats()
        .await
        .map_err(|e| warn!("Failed to load system stats: {:#}", e))
        .ok();

    let pairing = report.stats;
    debug!("Serving stats for {} active sessions", pairing.active_sessions);

    Json(StatsView {
        service: report.service,
        version: crate::VERSION,
        status: report.status,
        uptime: pairing.uptime_info,
        waiting: WaitingView {
            male: pairing.waiting_male,
            female: pairing.waiting_female,
            any: pairing.waiting_any,
        },
        sessions: SessionsView {
            active: pairing.active_sessions,
            matched: pairing.matches_made,
            ended: pairing.sessions_ended,
            searches_cancelled: pairing.searches_cancelled,
        },
        audit_pending: pairing.audit_pending,
        system,
        components: report.checks,
        timestamp: Utc::now(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Preference;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn bare_router() -> Router {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        HealthServer::new(HealthServerConfig::default(), collector).router()
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_probes_report_unavailable_without_service() {
        let app = bare_router();

        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let response = get(&app, uri).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }

        let body = json_body(get(&app, "/health").await).await;
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(get(&app, "/").await.status(), StatusCode::OK);
        assert_eq!(get(&app, "/nope").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        collector.record_inbound_event("text", true);

        let app = HealthServer::new(HealthServerConfig::default(), collector.clone()).router();
        let response = get(&app, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.contains("text/plain"));
        assert!(render_metrics(&collector).unwrap().contains("anon_chat"));
    }

    #[tokio::test]
    async fn test_stats_with_running_service() {
        let context = crate::service::app::test_context();
        context.set_running(true).await;
        context.engine().request_match(5, Preference::Female).unwrap();

        let app = HealthServer::new(HealthServerConfig::default(), context.metrics_collector())
            .with_context(context)
            .router();

        assert_eq!(get(&app, "/ready").await.status(), StatusCode::OK);
        assert_eq!(get(&app, "/alive").await.status(), StatusCode::OK);

        let response = get(&app, "/stats").await;
        assert_eq!(response.status(), StatusCode::OK);

        let stats = json_body(response).await;
        assert_eq!(stats["waiting"]["female"], 1);
        assert_eq!(stats["sessions"]["active"], 0);
        assert_eq!(stats["system"]["active_session_count"], 0);
    }
}

//! Health checks and monitoring
//!
//! Component checks for the chat service, plus the readiness and liveness
//! probes served by the health server.

use crate::service::app::ServiceContext;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value (0=unhealthy, 1=degraded, 2=healthy)
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// Fold a component status into an overall one
    fn combine(self, component: HealthStatus) -> HealthStatus {
        match (self, component) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Reason when not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

impl ComponentCheck {
    fn finish(name: &str, start: Instant, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Live pairing figures for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub waiting_male: usize,
    pub waiting_female: usize,
    pub waiting_any: usize,
    pub active_sessions: usize,
    /// Since service start
    pub matches_made: u64,
    pub sessions_ended: u64,
    pub searches_cancelled: u64,
    /// Audit records waiting for a retry
    pub audit_pending: usize,
    pub uptime_info: String,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(context: Arc<ServiceContext>) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(&context).await,
            Self::check_pairing_engine(&context),
            Self::check_audit_buffer(&context),
            Self::check_database(&context).await,
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |overall, check| {
                overall.combine(check.status)
            });

        Ok(HealthCheck {
            status,
            service: context.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(&context),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(context: Arc<ServiceContext>) -> Result<HealthStatus> {
        if context.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - the service runs and the pairing state is usable.
    ///
    /// Storage trouble only degrades readiness; relaying keeps working while
    /// audit records wait in the buffer.
    pub async fn readiness_check(context: Arc<ServiceContext>) -> Result<HealthStatus> {
        if !context.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_pairing_engine(&context)
            .status
            .combine(Self::check_audit_buffer(&context).status))
    }

    async fn check_service_running(context: &ServiceContext) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if context.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck::finish("service_running", start, status, message)
    }

    fn check_pairing_engine(context: &ServiceContext) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match context.engine().stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Pairing engine check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Pairing state unavailable: {}", e)),
                )
            }
        };

        ComponentCheck::finish("pairing_engine", start, status, message)
    }

    fn check_audit_buffer(context: &ServiceContext) -> ComponentCheck {
        let start = Instant::now();

        let pending = context.audit_buffer().pending_count();
        let (status, message) = if pending == 0 {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Degraded,
                Some(format!("{} audit records waiting for retry", pending)),
            )
        };

        ComponentCheck::finish("audit_buffer", start, status, message)
    }

    async fn check_database(context: &ServiceContext) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match context.storage().history.counts().await {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Database check failed: {}", e);
                (
                    HealthStatus::Degraded,
                    Some(format!("Database query failed: {}", e)),
                )
            }
        };

        ComponentCheck::finish("database", start, status, message)
    }

    fn gather_service_stats(context: &ServiceContext) -> ServiceStats {
        let uptime_info = format!("Up {}s", context.uptime().as_secs());
        let audit_pending = context.audit_buffer().pending_count();

        match context.engine().stats() {
            Ok(stats) => ServiceStats {
                waiting_male: stats.waiting_male,
                waiting_female: stats.waiting_female,
                waiting_any: stats.waiting_any,
                active_sessions: stats.active_sessions,
                matches_made: stats.matches_made,
                sessions_ended: stats.sessions_ended,
                searches_cancelled: stats.searches_cancelled,
                audit_pending,
                uptime_info,
            },
            Err(e) => {
                debug!("Failed to get pairing stats for health check: {}", e);
                ServiceStats {
                    audit_pending,
                    uptime_info,
                    ..ServiceStats::default()
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::app::test_context;
    use crate::types::Preference;

    #[test]
    fn test_status_combination() {
        assert_eq!(
            HealthStatus::Healthy.combine(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.combine(HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
        assert_eq!(HealthStatus::Healthy.as_gauge(), 2);
    }

    #[tokio::test]
    async fn test_stopped_service_is_not_alive() {
        let context = test_context();
        assert_eq!(
            HealthCheck::liveness_check(context.clone()).await.unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::readiness_check(context).await.unwrap(),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_running_service_reports_pairing_stats() {
        let context = test_context();
        context.set_running(true).await;
        context.engine().request_match(1, Preference::Any).unwrap();
        context.engine().request_match(2, Preference::Male).unwrap();

        let health = HealthCheck::check(context.clone()).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.stats.active_sessions, 1);
        assert_eq!(health.stats.matches_made, 1);
        assert_eq!(health.checks.len(), 4);
        assert!(health.to_json().unwrap().contains("pairing_engine"));

        assert_eq!(
            HealthCheck::readiness_check(context).await.unwrap(),
            HealthStatus::Healthy
        );
    }
}

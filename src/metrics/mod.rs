//! Metrics and monitoring for the anonymous chat service
//!
//! Prometheus collectors for pairing, relay, audit and transport activity,
//! and the HTTP server exposing them next to the health probes.

pub mod collector;
pub mod health;

pub use collector::{
    AuditMetrics, MetricsCollector, MetricsTimer, PairingMetrics, RelayMetrics, ServiceMetrics,
    TransportMetrics,
};
pub use health::{render_metrics, HealthServer, HealthServerConfig};

use std::sync::Arc;

/// Owns the monitoring server for the lifetime of the service
#[derive(Clone)]
pub struct MetricsService {
    collector: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
}

impl MetricsService {
    pub fn new(collector: Arc<MetricsCollector>, health_server: Arc<HealthServer>) -> Self {
        Self {
            collector,
            health_server,
        }
    }

    /// Serve until [`MetricsService::stop`]; marks the service healthy while up
    pub async fn start(&self) -> anyhow::Result<()> {
        self.collector.update_health_status(2);
        let result = self.health_server.start().await;
        self.collector.update_health_status(0);
        result
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.health_server.stop().await
    }
}

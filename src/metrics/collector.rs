//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the anonymous chat service:
//! pairing activity, message relay, audit persistence and transport calls.

use crate::pairing::engine::PairingStats;
use crate::types::{MatchOutcome, Preference};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the chat service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Matching and session metrics
    pairing_metrics: PairingMetrics,

    /// Message relay metrics
    relay_metrics: RelayMetrics,

    /// Audit sink metrics
    audit_metrics: AuditMetrics,

    /// Transport adapter metrics
    transport_metrics: TransportMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Inbound events handled, by kind
    pub inbound_events_total: IntCounterVec,

    /// Events that failed inside the handler
    pub event_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Matching and session metrics
#[derive(Clone)]
pub struct PairingMetrics {
    /// Participants currently waiting, by preference
    pub participants_waiting: IntGaugeVec,

    /// Sessions currently open
    pub active_sessions: IntGauge,

    /// Match requests by preference and outcome
    pub match_requests_total: IntCounterVec,

    /// Sessions opened
    pub sessions_started_total: IntCounter,

    /// Sessions closed, by reason
    pub sessions_ended_total: IntCounterVec,

    /// Searches cancelled before a partner was found
    pub searches_cancelled_total: IntCounter,

    /// Time spent in a queue before being matched
    pub wait_time_seconds: HistogramVec,

    /// Session lifetime
    pub session_duration_seconds: Histogram,
}

/// Message relay metrics
#[derive(Clone)]
pub struct RelayMetrics {
    /// Relayed messages by status
    pub messages_total: IntCounterVec,

    /// Relay latency including the transport call
    pub relay_duration: Histogram,

    /// Sessions torn down because the partner was unreachable
    pub partner_unreachable_total: IntCounter,
}

/// Audit sink metrics
#[derive(Clone)]
pub struct AuditMetrics {
    /// Audit writes by record kind and status
    pub writes_total: IntCounterVec,

    /// Records waiting in the local retry buffer
    pub pending_records: IntGauge,

    /// Records dropped because the retry buffer was full
    pub dropped_records_total: IntCounter,
}

/// Transport adapter metrics
#[derive(Clone)]
pub struct TransportMetrics {
    /// Transport calls by operation and status
    pub operations_total: IntCounterVec,

    /// Transport errors by kind
    pub errors_total: IntCounterVec,

    /// Transport call durations
    pub operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let pairing_metrics = PairingMetrics::new(&registry)?;
        let relay_metrics = RelayMetrics::new(&registry)?;
        let audit_metrics = AuditMetrics::new(&registry)?;
        let transport_metrics = TransportMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            pairing_metrics,
            relay_metrics,
            audit_metrics,
            transport_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn pairing(&self) -> &PairingMetrics {
        &self.pairing_metrics
    }

    pub fn relay(&self) -> &RelayMetrics {
        &self.relay_metrics
    }

    pub fn audit(&self) -> &AuditMetrics {
        &self.audit_metrics
    }

    pub fn transport(&self) -> &TransportMetrics {
        &self.transport_metrics
    }

    /// Refresh the live gauges from an engine snapshot
    pub fn update_from_pairing_stats(&self, stats: &PairingStats) {
        for preference in Preference::ALL {
            self.pairing_metrics
                .participants_waiting
                .with_label_values(&[preference.as_str()])
                .set(stats.waiting_for(preference) as i64);
        }

        self.pairing_metrics
            .active_sessions
            .set(stats.active_sessions as i64);
    }

    /// Record the outcome of one match request
    pub fn record_match_request(&self, preference: Preference, outcome: &MatchOutcome) {
        let outcome_str = match outcome {
            MatchOutcome::Matched(_) => "matched",
            MatchOutcome::Waiting => "waiting",
            MatchOutcome::AlreadyInSession(_) => "already_in_session",
        };

        self.pairing_metrics
            .match_requests_total
            .with_label_values(&[preference.as_str(), outcome_str])
            .inc();

        if matches!(outcome, MatchOutcome::Matched(_)) {
            self.pairing_metrics.sessions_started_total.inc();
        }
    }

    /// Record how long the matched partner waited in its queue
    pub fn record_wait_time(&self, preference: Preference, waited: Duration) {
        self.pairing_metrics
            .wait_time_seconds
            .with_label_values(&[preference.as_str()])
            .observe(waited.as_secs_f64());
    }

    /// Record a session being closed
    pub fn record_session_ended(&self, reason: &str, lifetime: Duration) {
        self.pairing_metrics
            .sessions_ended_total
            .with_label_values(&[reason])
            .inc();

        self.pairing_metrics
            .session_duration_seconds
            .observe(lifetime.as_secs_f64());
    }

    pub fn record_search_cancelled(&self) {
        self.pairing_metrics.searches_cancelled_total.inc();
    }

    /// Record one relay attempt
    pub fn record_relay(&self, delivered: bool, duration: Duration) {
        let status = if delivered { "delivered" } else { "failed" };

        self.relay_metrics
            .messages_total
            .with_label_values(&[status])
            .inc();

        self.relay_metrics
            .relay_duration
            .observe(duration.as_secs_f64());

        if !delivered {
            self.relay_metrics.partner_unreachable_total.inc();
        }
    }

    /// Record an audit write attempt
    pub fn record_audit_write(&self, record: &str, success: bool) {
        let status = if success { "success" } else { "error" };

        self.audit_metrics
            .writes_total
            .with_label_values(&[record, status])
            .inc();
    }

    pub fn set_audit_pending(&self, pending: usize) {
        self.audit_metrics.pending_records.set(pending as i64);
    }

    pub fn record_audit_dropped(&self) {
        self.audit_metrics.dropped_records_total.inc();
    }

    /// Record a transport operation
    pub fn record_transport_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.transport_metrics
            .operations_total
            .with_label_values(&[operation, status])
            .inc();

        self.transport_metrics
            .operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Record a classified transport error
    pub fn record_transport_error(&self, kind: &str) {
        self.transport_metrics
            .errors_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record an inbound event by kind
    pub fn record_inbound_event(&self, kind: &str, success: bool) {
        self.service_metrics
            .inbound_events_total
            .with_label_values(&[kind])
            .inc();

        if !success {
            self.service_metrics
                .event_errors_total
                .with_label_values(&[kind])
                .inc();
        }
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("anon_chat_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let inbound_events_total = IntCounterVec::new(
            Opts::new("anon_chat_inbound_events_total", "Inbound events handled"),
            &["kind"],
        )?;
        registry.register(Box::new(inbound_events_total.clone()))?;

        let event_errors_total = IntCounterVec::new(
            Opts::new("anon_chat_event_errors_total", "Inbound events that failed"),
            &["kind"],
        )?;
        registry.register(Box::new(event_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "anon_chat_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("anon_chat_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            inbound_events_total,
            event_errors_total,
            health_status,
            component_health,
        })
    }
}

impl PairingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let participants_waiting = IntGaugeVec::new(
            Opts::new(
                "anon_chat_participants_waiting",
                "Participants currently waiting for a partner",
            ),
            &["preference"],
        )?;
        registry.register(Box::new(participants_waiting.clone()))?;

        let active_sessions =
            IntGauge::new("anon_chat_active_sessions", "Currently open chat sessions")?;
        registry.register(Box::new(active_sessions.clone()))?;

        let match_requests_total = IntCounterVec::new(
            Opts::new("anon_chat_match_requests_total", "Match requests handled"),
            &["preference", "outcome"],
        )?;
        registry.register(Box::new(match_requests_total.clone()))?;

        let sessions_started_total =
            IntCounter::new("anon_chat_sessions_started_total", "Sessions opened")?;
        registry.register(Box::new(sessions_started_total.clone()))?;

        let sessions_ended_total = IntCounterVec::new(
            Opts::new("anon_chat_sessions_ended_total", "Sessions closed"),
            &["reason"],
        )?;
        registry.register(Box::new(sessions_ended_total.clone()))?;

        let searches_cancelled_total = IntCounter::new(
            "anon_chat_searches_cancelled_total",
            "Searches cancelled before matching",
        )?;
        registry.register(Box::new(searches_cancelled_total.clone()))?;

        let wait_time_seconds = HistogramVec::new(
            HistogramOpts::new(
                "anon_chat_wait_time_seconds",
                "Time spent waiting before a match",
            )
            .buckets(vec![0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0]),
            &["preference"],
        )?;
        registry.register(Box::new(wait_time_seconds.clone()))?;

        let session_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("anon_chat_session_duration_seconds", "Session lifetime")
                .buckets(vec![5.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        )?;
        registry.register(Box::new(session_duration_seconds.clone()))?;

        Ok(Self {
            participants_waiting,
            active_sessions,
            match_requests_total,
            sessions_started_total,
            sessions_ended_total,
            searches_cancelled_total,
            wait_time_seconds,
            session_duration_seconds,
        })
    }
}

impl RelayMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let messages_total = IntCounterVec::new(
            Opts::new("anon_chat_relayed_messages_total", "Relayed messages"),
            &["status"],
        )?;
        registry.register(Box::new(messages_total.clone()))?;

        let relay_duration = Histogram::with_opts(
            HistogramOpts::new("anon_chat_relay_duration_seconds", "Message relay time")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(relay_duration.clone()))?;

        let partner_unreachable_total = IntCounter::new(
            "anon_chat_partner_unreachable_total",
            "Sessions torn down after a failed delivery",
        )?;
        registry.register(Box::new(partner_unreachable_total.clone()))?;

        Ok(Self {
            messages_total,
            relay_duration,
            partner_unreachable_total,
        })
    }
}

impl AuditMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let writes_total = IntCounterVec::new(
            Opts::new("anon_chat_audit_writes_total", "Audit sink writes"),
            &["record", "status"],
        )?;
        registry.register(Box::new(writes_total.clone()))?;

        let pending_records = IntGauge::new(
            "anon_chat_audit_pending_records",
            "Audit records waiting for retry",
        )?;
        registry.register(Box::new(pending_records.clone()))?;

        let dropped_records_total = IntCounter::new(
            "anon_chat_audit_dropped_records_total",
            "Audit records dropped on buffer overflow",
        )?;
        registry.register(Box::new(dropped_records_total.clone()))?;

        Ok(Self {
            writes_total,
            pending_records,
            dropped_records_total,
        })
    }
}

impl TransportMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let operations_total = IntCounterVec::new(
            Opts::new("anon_chat_transport_operations_total", "Transport calls"),
            &["operation", "status"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("anon_chat_transport_errors_total", "Transport errors"),
            &["kind"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "anon_chat_transport_operation_duration_seconds",
                "Transport call duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            operations_total,
            errors_total,
            operation_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _pairing = collector.pairing();
        let _relay = collector.relay();
        let _audit = collector.audit();
        let _transport = collector.transport();
    }

    #[test]
    fn test_match_request_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_match_request(Preference::Male, &MatchOutcome::Waiting);
        collector.record_wait_time(Preference::Male, Duration::from_secs(3));

        let waiting = collector
            .pairing()
            .match_requests_total
            .with_label_values(&["male", "waiting"])
            .get();
        assert_eq!(waiting, 1);
        assert_eq!(collector.pairing().sessions_started_total.get(), 0);
    }

    #[test]
    fn test_relay_and_audit_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_relay(true, Duration::from_millis(4));
        collector.record_relay(false, Duration::from_millis(40));
        collector.record_audit_write("message", false);
        collector.set_audit_pending(3);
        collector.record_audit_dropped();

        assert_eq!(collector.relay().partner_unreachable_total.get(), 1);
        assert_eq!(collector.audit().pending_records.get(), 3);
        assert_eq!(collector.audit().dropped_records_total.get(), 1);
    }

    #[test]
    fn test_pairing_stats_update() {
        let collector = MetricsCollector::new().unwrap();
        let stats = PairingStats {
            waiting_male: 2,
            waiting_female: 1,
            waiting_any: 4,
            active_sessions: 3,
            ..PairingStats::default()
        };

        collector.update_from_pairing_stats(&stats);

        let any = collector
            .pairing()
            .participants_waiting
            .with_label_values(&["any"])
            .get();
        assert_eq!(any, 4);
        assert_eq!(collector.pairing().active_sessions.get(), 3);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("pairing_engine", true);
        collector.update_component_health("audit_sink", false);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();
        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}

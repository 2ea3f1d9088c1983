//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use anon_chat::bot::ChatHandler;
use anon_chat::metrics::MetricsCollector;
use anon_chat::pairing::{PairingEngine, Relay};
use anon_chat::store::{AuditSink, InMemoryStore, StoreError, StoreResult};
use anon_chat::transport::{Transport, TransportError};
use anon_chat::types::{
    AdminAction, InboundEvent, MessageRecord, ParticipantId, ParticipantProfile, SessionRecord,
};
use anon_chat::utils::current_timestamp;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport capturing every outbound message; selected participants are
/// unreachable
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ParticipantId, String)>>,
    unreachable: Mutex<HashSet<ParticipantId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unreachable(&self, participant: ParticipantId) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.insert(participant);
        }
    }

    /// Texts delivered to `participant`, in order
    pub fn sent_to(&self, participant: ParticipantId) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| {
                sent.iter()
                    .filter(|(to, _)| *to == participant)
                    .map(|(_, text)| text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn total_sent(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        participant: ParticipantId,
        text: &str,
    ) -> Result<(), TransportError> {
        let unreachable = self
            .unreachable
            .lock()
            .map(|u| u.contains(&participant))
            .unwrap_or(false);
        if unreachable {
            return Err(TransportError::Unreachable {
                participant,
                reason: "bot was blocked by the user".to_string(),
            });
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push((participant, text.to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Audit sink whose every write fails
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    attempts: AtomicUsize,
}

impl FailingAuditSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> StoreResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("disk full".to_string()))
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record_message(&self, _message: &MessageRecord) -> StoreResult<()> {
        self.fail()
    }

    async fn record_session(&self, _session: &SessionRecord) -> StoreResult<()> {
        self.fail()
    }

    async fn record_admin_action(&self, _action: &AdminAction) -> StoreResult<()> {
        self.fail()
    }
}

/// Everything a chat scenario needs, wired over an in-memory store
pub struct TestSystem {
    pub engine: PairingEngine,
    pub relay: Relay,
    pub handler: ChatHandler,
    pub store: Arc<InMemoryStore>,
    pub transport: Arc<RecordingTransport>,
}

pub fn create_test_system() -> TestSystem {
    let store = Arc::new(InMemoryStore::new());
    create_test_system_with_audit(store.clone(), store)
}

pub fn create_test_system_with_audit(
    store: Arc<InMemoryStore>,
    audit: Arc<dyn AuditSink>,
) -> TestSystem {
    let metrics_collector = Arc::new(MetricsCollector::new().expect("metrics collector"));
    let engine = PairingEngine::with_metrics(metrics_collector.clone());
    let transport = Arc::new(RecordingTransport::new());

    let relay = Relay::new(
        engine.clone(),
        transport.clone(),
        audit,
        store.clone(),
        metrics_collector.clone(),
    );
    let handler = ChatHandler::new(relay.clone(), store.clone(), metrics_collector);

    TestSystem {
        engine,
        relay,
        handler,
        store,
        transport,
    }
}

/// Inbound event as a transport would produce it
pub fn event(participant: ParticipantId, payload: &str) -> InboundEvent {
    InboundEvent {
        participant,
        profile: Some(ParticipantProfile::new(participant)),
        payload: payload.to_string(),
        received_at: current_timestamp(),
    }
}

//! Message relay between session partners
//!
//! Wraps the [`PairingEngine`] with the I/O around it: the transport for
//! delivery, the audit sink for the record of every attempt, and the
//! participant store for activity counters and stored preferences.

use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::pairing::engine::PairingEngine;
use crate::store::{AuditSink, ParticipantStore};
use crate::transport::Transport;
use crate::types::{
    MatchOutcome, MessageRecord, ParticipantId, Preference, RelayOutcome, Session, SessionRecord,
};
use crate::utils::{current_timestamp, preview};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Text the partner sees for a relayed message
pub fn forwarded_text(text: &str) -> String {
    format!("🗣️: {}", text)
}

#[derive(Clone)]
pub struct Relay {
    engine: PairingEngine,
    transport: Arc<dyn Transport>,
    audit: Arc<dyn AuditSink>,
    participants: Arc<dyn ParticipantStore>,
    metrics_collector: Arc<MetricsCollector>,
}

impl Relay {
    pub fn new(
        engine: PairingEngine,
        transport: Arc<dyn Transport>,
        audit: Arc<dyn AuditSink>,
        participants: Arc<dyn ParticipantStore>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            engine,
            transport,
            audit,
            participants,
            metrics_collector,
        }
    }

    pub fn engine(&self) -> &PairingEngine {
        &self.engine
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Run matching for `participant` and persist the session if one opened
    pub async fn request_match(
        &self,
        participant: ParticipantId,
        preference: Preference,
    ) -> Result<MatchOutcome> {
        let outcome = self.engine.request_match(participant, preference)?;

        if let MatchOutcome::Matched(session) = &outcome {
            self.audit_session(session).await;
        }

        Ok(outcome)
    }

    /// Forward `text` from `sender` to its partner.
    ///
    /// Every attempt is audited. Any final `TransportError` closes the
    /// session, a `Rejected` message included, not only an unreachable
    /// partner; the sender then goes through matching again with its stored
    /// preference.
    pub async fn deliver(&self, sender: ParticipantId, text: &str) -> Result<RelayOutcome> {
        let Some(session) = self.engine.session_of(sender)? else {
            debug!("Participant {} sent text outside a session", sender);
            return Ok(RelayOutcome::NotInSession);
        };
        let Some(recipient) = session.partner_of(sender) else {
            return Ok(RelayOutcome::NotInSession);
        };

        let start = Instant::now();
        let result = self
            .transport
            .send(recipient, &forwarded_text(text))
            .await;
        let delivered = result.is_ok();
        self.metrics_collector.record_relay(delivered, start.elapsed());

        let record = MessageRecord {
            session_id: session.id,
            from: sender,
            to: recipient,
            text: text.to_string(),
            timestamp: current_timestamp(),
            delivered,
        };
        if let Err(e) = self.audit.record_message(&record).await {
            warn!(
                "Failed to record message {} -> {} in session {}: {}",
                sender, recipient, session.id, e
            );
        }

        match result {
            Ok(()) => {
                debug!(
                    "Relayed message {} -> {} in session {}: '{}'",
                    sender,
                    recipient,
                    session.id,
                    preview(text, 32)
                );
                if let Err(e) = self.participants.touch_activity(sender).await {
                    warn!("Failed to update activity for participant {}: {}", sender, e);
                }
                Ok(RelayOutcome::Delivered { recipient })
            }
            Err(e) => {
                info!(
                    "Delivery to {} failed in session {}: {} - re-matching {}",
                    recipient, session.id, e, sender
                );

                if let Some(closed) = self.engine.close_if_current(session.id)? {
                    self.audit_session(&closed).await;
                }

                let preference = match self.participants.get_preference(sender).await {
                    Ok(preference) => preference,
                    Err(e) => {
                        warn!(
                            "Failed to load preference for participant {}, using any: {}",
                            sender, e
                        );
                        Preference::Any
                    }
                };

                let rematch = self.request_match(sender, preference).await?;
                Ok(RelayOutcome::DeliveryFailed { recipient, rematch })
            }
        }
    }

    /// End the caller's session and return the partner, if there was one
    pub async fn end_session(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<ParticipantId>> {
        let Some(closed) = self.engine.end_session(participant)? else {
            return Ok(None);
        };

        self.audit_session(&closed).await;
        Ok(closed.partner_of(participant))
    }

    /// Withdraw a waiting participant from matching
    pub fn cancel_search(&self, participant: ParticipantId) -> Result<bool> {
        self.engine.cancel_search(participant)
    }

    async fn audit_session(&self, session: &Session) {
        if let Err(e) = self.audit.record_session(&SessionRecord::from(session)).await {
            warn!("Failed to record session {}: {}", session.id, e);
        }
    }
}

//! Inbound event handling for the chat bot
//!
//! Turns each inbound event into relay calls and the notices participants
//! see. Failures of the pairing core become a notice to the sender; nothing
//! here panics on bad input.

use crate::bot::commands::Command;
use crate::bot::notices;
use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::pairing::Relay;
use crate::store::ParticipantStore;
use crate::transport::Transport;
use crate::types::{
    InboundEvent, MatchOutcome, ParticipantId, ParticipantProfile, Preference, RelayOutcome,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handles inbound events for one transport
#[derive(Clone)]
pub struct ChatHandler {
    relay: Relay,
    transport: Arc<dyn Transport>,
    participants: Arc<dyn ParticipantStore>,
    metrics_collector: Arc<MetricsCollector>,
}

impl ChatHandler {
    pub fn new(
        relay: Relay,
        participants: Arc<dyn ParticipantStore>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            transport: relay.transport(),
            relay,
            participants,
            metrics_collector,
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Process one inbound event.
    ///
    /// On error the sender gets a generic notice and the error is returned
    /// for logging by the dispatcher.
    pub async fn on_event(&self, event: InboundEvent) -> Result<()> {
        let participant = event.participant;
        let command = Command::parse(&event.payload);
        let kind = command.kind();

        debug!("Inbound event from {}: {}", participant, command);

        let result = self.handle(participant, event.profile, command).await;
        self.metrics_collector.record_inbound_event(kind, result.is_ok());

        if let Err(e) = &result {
            error!(
                "Failed to handle {} from participant {}: {}",
                kind, participant, e
            );
            self.notify(participant, notices::SERVICE_UNAVAILABLE).await;
        }

        result
    }

    async fn handle(
        &self,
        participant: ParticipantId,
        profile: Option<ParticipantProfile>,
        command: Command,
    ) -> Result<()> {
        match command {
            Command::Start => self.start(participant, profile).await,
            Command::Help => {
                self.notify(participant, notices::HELP).await;
                Ok(())
            }
            Command::Search => {
                if self.reject_banned(participant).await {
                    return Ok(());
                }
                self.search(participant).await
            }
            Command::Stop => self.stop(participant).await,
            Command::Gender(None) => {
                self.notify(participant, notices::GENDER_PROMPT).await;
                Ok(())
            }
            Command::Gender(Some(preference)) => {
                self.participants
                    .set_preference(participant, preference)
                    .await
                    .map_err(|e| ChatError::PersistenceWriteFailure {
                        message: e.to_string(),
                    })?;
                info!("Participant {} set preference {}", participant, preference);
                self.notify(participant, &notices::gender_set(preference)).await;

                // A waiting participant searches again under the new preference
                let waiting = self
                    .relay
                    .engine()
                    .inspect(|state| state.queues().contains(participant))?;
                if waiting {
                    let outcome = self.relay.request_match(participant, preference).await?;
                    self.announce_outcome(participant, &outcome).await;
                }
                Ok(())
            }
            Command::Text(text) => {
                if self.reject_banned(participant).await {
                    return Ok(());
                }
                self.relay_text(participant, &text).await
            }
            Command::Unknown(raw) => {
                debug!("Unknown command from {}: {}", participant, raw);
                self.notify(participant, notices::UNKNOWN_COMMAND).await;
                Ok(())
            }
        }
    }

    async fn start(
        &self,
        participant: ParticipantId,
        profile: Option<ParticipantProfile>,
    ) -> Result<()> {
        let profile = profile.unwrap_or_else(|| ParticipantProfile::new(participant));
        let record = self
            .participants
            .upsert_participant(&profile)
            .await
            .map_err(|e| ChatError::PersistenceWriteFailure {
                message: e.to_string(),
            })?;

        info!(
            "Participant {} registered - username: {:?}, joined: {}",
            participant, record.profile.username, record.joined_at
        );

        if record.is_banned {
            self.notify(participant, notices::BANNED).await;
        } else {
            self.notify(participant, notices::WELCOME).await;
        }
        Ok(())
    }

    async fn search(&self, participant: ParticipantId) -> Result<()> {
        let preference = match self.participants.get_preference(participant).await {
            Ok(preference) => preference,
            Err(e) => {
                warn!(
                    "Failed to load preference for participant {}, using any: {}",
                    participant, e
                );
                Preference::Any
            }
        };

        let outcome = self.relay.request_match(participant, preference).await?;
        self.announce_outcome(participant, &outcome).await;
        Ok(())
    }

    async fn stop(&self, participant: ParticipantId) -> Result<()> {
        if let Some(partner) = self.relay.end_session(participant).await? {
            self.notify(partner, notices::PARTNER_ENDED).await;
            self.notify(participant, notices::CHAT_ENDED).await;
        } else if self.relay.cancel_search(participant)? {
            self.notify(participant, notices::SEARCH_CANCELLED).await;
        } else {
            self.notify(participant, notices::NOT_IN_CHAT).await;
        }
        Ok(())
    }

    async fn relay_text(&self, participant: ParticipantId, text: &str) -> Result<()> {
        match self.relay.deliver(participant, text).await? {
            RelayOutcome::Delivered { .. } => {
                self.notify(participant, notices::MESSAGE_SENT).await;
            }
            RelayOutcome::NotInSession => {
                self.notify(participant, notices::NOT_IN_CHAT).await;
            }
            RelayOutcome::DeliveryFailed { recipient, rematch } => {
                info!(
                    "Partner {} of participant {} unreachable, searching again",
                    recipient, participant
                );
                self.notify(participant, notices::PARTNER_DISCONNECTED).await;
                if let MatchOutcome::Matched(_) = rematch {
                    self.announce_outcome(participant, &rematch).await;
                }
            }
        }
        Ok(())
    }

    /// Tell the requester (and a new partner) what matching produced
    async fn announce_outcome(&self, participant: ParticipantId, outcome: &MatchOutcome) {
        match outcome {
            MatchOutcome::Matched(session) => {
                let (a, b) = session.participants;
                self.notify(a, notices::CONNECTED).await;
                self.notify(b, notices::CONNECTED).await;
            }
            MatchOutcome::Waiting => {
                self.notify(participant, notices::SEARCHING).await;
            }
            MatchOutcome::AlreadyInSession(_) => {
                self.notify(participant, notices::ALREADY_IN_CHAT).await;
            }
        }
    }

    /// Send the banned notice if needed; store errors let the request through
    async fn reject_banned(&self, participant: ParticipantId) -> bool {
        match self.participants.is_banned(participant).await {
            Ok(true) => {
                debug!("Rejected request from banned participant {}", participant);
                self.notify(participant, notices::BANNED).await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(
                    "Failed to check ban flag for participant {}: {}",
                    participant, e
                );
                false
            }
        }
    }

    /// Best-effort notice; failures are only logged
    async fn notify(&self, participant: ParticipantId, text: &str) {
        if let Err(e) = self.transport.send(participant, text).await {
            warn!(
                "Failed to send notice to participant {} via {}: {}",
                participant,
                self.transport.name(),
                e
            );
        }
    }
}

//! Gateway message definitions and serialization

use crate::error::{ChatError, Result};
use crate::types::{InboundEvent, OutboundMessage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Exchange type used for the outbound exchange
pub const OUTBOUND_EXCHANGE_TYPE: &str = "topic";

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(payload: T, routing_key: impl Into<String>) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key: routing_key.into(),
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            ChatError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            ChatError::InvalidCommand {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Envelope for text going out to the gateway
pub fn outbound_envelope(
    message: OutboundMessage,
    routing_key: &str,
) -> MessageEnvelope<OutboundMessage> {
    MessageEnvelope::new(message, routing_key)
}

/// Decode an inbound gateway message.
///
/// Gateways may send either a bare event or one wrapped in an envelope.
pub fn decode_inbound_event(bytes: &[u8]) -> Result<InboundEvent> {
    let event = match serde_json::from_slice::<InboundEvent>(bytes) {
        Ok(event) => event,
        Err(_) => MessageEnvelope::<InboundEvent>::from_bytes(bytes)?.payload,
    };

    validate_inbound_event(&event)?;
    Ok(event)
}

fn validate_inbound_event(event: &InboundEvent) -> Result<()> {
    if event.participant == 0 {
        return Err(ChatError::InvalidCommand {
            reason: "Participant id cannot be zero".to_string(),
        }
        .into());
    }

    if let Some(profile) = &event.profile {
        if profile.id != event.participant {
            return Err(ChatError::InvalidCommand {
                reason: format!(
                    "Profile id {} does not match participant {}",
                    profile.id, event.participant
                ),
            }
            .into());
        }
    }

    Ok(())
}

//! Transport adapters between participants and the pairing core
//!
//! A transport does two things: deliver outbound text to one participant and
//! feed inbound events into a channel consumed by the chat handler. Two
//! adapters exist, the Telegram Bot API and an AMQP gateway.

pub mod amqp;
pub mod telegram;

pub use amqp::{
    AmqpConfig, AmqpConnection, AmqpGatewayTransport, AmqpInboundSource, GatewayConfig,
};
pub use telegram::{TelegramConfig, TelegramTransport};

use crate::error::Result;
use crate::types::{InboundEvent, ParticipantId};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Why an outbound message could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The participant can no longer be reached (blocked the bot, deleted account)
    #[error("participant {participant} unreachable: {reason}")]
    Unreachable {
        participant: ParticipantId,
        reason: String,
    },

    /// The platform refused this particular message
    #[error("message rejected: {reason}")]
    Rejected { reason: String },

    /// Connection problems, timeouts, rate limits, server errors
    #[error("network error: {message}")]
    Network { message: String },

    /// Unexpected response shape
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Worth retrying inside the adapter before reporting a failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Network { .. })
    }

    /// Stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Unreachable { .. } => "unreachable",
            TransportError::Rejected { .. } => "rejected",
            TransportError::Network { .. } => "network",
            TransportError::Protocol { .. } => "protocol",
        }
    }
}

/// Outbound side of a transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `text` to `participant`.
    ///
    /// Transient failures are retried inside the adapter; an `Err` is final.
    async fn send(
        &self,
        participant: ParticipantId,
        text: &str,
    ) -> std::result::Result<(), TransportError>;

    /// Short adapter name for logs and metrics
    fn name(&self) -> &'static str;
}

/// Inbound side of a transport
#[async_trait]
pub trait InboundSource: Send + Sync {
    /// Push inbound events into `events` until the source stops or the
    /// receiving side is dropped.
    async fn listen(&self, events: mpsc::Sender<InboundEvent>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(TransportError::Network {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!TransportError::Unreachable {
            participant: 1,
            reason: "blocked".to_string()
        }
        .is_retryable());
        assert!(!TransportError::Rejected {
            reason: "too long".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_kinds() {
        let error = TransportError::Protocol {
            message: "missing ok".to_string(),
        };
        assert_eq!(error.kind(), "protocol");
        assert!(error.to_string().contains("missing ok"));
    }
}

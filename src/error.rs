//! Error types for the chat pairing service
//!
//! Core operations return outcome values for expected situations (no
//! candidate, duplicate enqueue); these errors cover the rest.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific pairing and relay scenarios
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Participant {participant} is not in an active session")]
    NotInSession { participant: i64 },

    #[error("Delivery to participant {recipient} failed: {reason}")]
    DeliveryFailed { recipient: i64, reason: String },

    #[error("Persistence write failed: {message}")]
    PersistenceWriteFailure { message: String },

    #[error("Transport failure: {message}")]
    TransportFailed { message: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Participant {participant} is banned")]
    ParticipantBanned { participant: i64 },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

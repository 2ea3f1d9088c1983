//! Persistence interfaces and implementations
//!
//! The core only talks to these traits. Two implementations exist: a SQLite
//! store shared by the bot process and the admin process, and an in-memory
//! store for tests and dry runs.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::types::{
    AdminAction, MessageRecord, ParticipantId, ParticipantProfile, ParticipantRecord, Preference,
    SessionRecord,
};
use async_trait::async_trait;
use serde::Serialize;

/// Storage-layer errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Aggregate counts for admin statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub participants: u64,
    pub banned_participants: u64,
    pub messages: u64,
    pub sessions: u64,
    /// Sessions persisted without an end timestamp
    pub open_sessions: u64,
}

/// Participant profiles, preferences and flags
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// Insert a new participant or refresh the profile fields of an existing one.
    ///
    /// Preference, ban flag, counters and join date of an existing record are kept.
    async fn upsert_participant(&self, profile: &ParticipantProfile)
        -> StoreResult<ParticipantRecord>;

    async fn get_participant(&self, participant: ParticipantId)
        -> StoreResult<Option<ParticipantRecord>>;

    /// All participants ordered by join date
    async fn list_participants(&self) -> StoreResult<Vec<ParticipantRecord>>;

    /// Stored preference; `Any` for unknown participants
    async fn get_preference(&self, participant: ParticipantId) -> StoreResult<Preference>;

    /// Store a preference, creating a bare record if needed
    async fn set_preference(
        &self,
        participant: ParticipantId,
        preference: Preference,
    ) -> StoreResult<()>;

    async fn is_banned(&self, participant: ParticipantId) -> StoreResult<bool>;

    /// Set the ban flag. Returns `false` when the participant is unknown.
    async fn set_banned(&self, participant: ParticipantId, banned: bool) -> StoreResult<bool>;

    /// Bump the message counter and last-active time after a relayed message
    async fn touch_activity(&self, participant: ParticipantId) -> StoreResult<()>;
}

/// Read access to the audit trail
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Every message sent or received by `participant`, oldest first
    async fn message_history(&self, participant: ParticipantId)
        -> StoreResult<Vec<MessageRecord>>;

    /// The last `limit` messages, oldest first
    async fn recent_messages(&self, limit: usize) -> StoreResult<Vec<MessageRecord>>;

    /// Messages whose text contains `keyword`, case-insensitive, oldest first
    async fn search_messages(&self, keyword: &str) -> StoreResult<Vec<MessageRecord>>;

    async fn session(&self, session_id: uuid::Uuid) -> StoreResult<Option<SessionRecord>>;

    /// The last `limit` admin actions, newest first
    async fn recent_admin_actions(&self, limit: usize) -> StoreResult<Vec<AdminAction>>;

    async fn counts(&self) -> StoreResult<StoreCounts>;
}

/// Write side of the audit trail
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_message(&self, message: &MessageRecord) -> StoreResult<()>;

    /// Insert or update a session by id; an update only ever sets the end time
    async fn record_session(&self, session: &SessionRecord) -> StoreResult<()>;

    async fn record_admin_action(&self, action: &AdminAction) -> StoreResult<()>;
}

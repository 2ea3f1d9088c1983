//! Administrative queries over the audit trail
//!
//! Read-mostly views for operators: system counters, per-participant history
//! and analytics, keyword search and the recent message log. Ban changes are
//! the only writes, and every one is recorded as an admin action.

pub mod auth;
pub mod http;

pub use auth::{AdminAuthenticator, AdminIdentity, TokenAuthenticator};
pub use http::{AdminServer, AdminServerConfig};

use crate::config::AdminSettings;
use crate::error::Result;
use crate::pairing::PairingEngine;
use crate::store::{AuditSink, HistoryStore, ParticipantStore};
use crate::types::{AdminAction, MessageRecord, ParticipantId, ParticipantRecord, Preference};
use crate::utils::current_timestamp;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// System-wide counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub user_count: u64,
    pub message_count: u64,
    pub active_session_count: u64,
    pub banned_user_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Activity summary for one participant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAnalytics {
    pub participant: ParticipantId,
    pub username: Option<String>,
    pub preference: Preference,
    pub is_banned: bool,
    /// Messages sent or received
    pub total_messages: usize,
    pub messages_per_hour: f64,
    pub join_date: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Messages per hour since the first message, rounded to two decimals.
///
/// A zero span counts the messages themselves.
pub fn messages_per_hour(total: usize, first_message: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let hours = (now - first_message).num_milliseconds() as f64 / 3_600_000.0;
    let rate = if hours > 0.0 {
        total as f64 / hours
    } else {
        total as f64
    };
    (rate * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct AdminService {
    participants: Arc<dyn ParticipantStore>,
    history: Arc<dyn HistoryStore>,
    audit: Arc<dyn AuditSink>,
    engine: Option<PairingEngine>,
    settings: AdminSettings,
}

impl AdminService {
    pub fn new(
        participants: Arc<dyn ParticipantStore>,
        history: Arc<dyn HistoryStore>,
        audit: Arc<dyn AuditSink>,
        settings: AdminSettings,
    ) -> Self {
        Self {
            participants,
            history,
            audit,
            engine: None,
            settings,
        }
    }

    /// Use the live engine for the active session count
    pub fn with_engine(mut self, engine: PairingEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        let counts = self
            .history
            .counts()
            .await
            .context("Failed to count audit records")?;

        let active_session_count = match &self.engine {
            Some(engine) => engine.stats()?.active_sessions as u64,
            None => counts.open_sessions,
        };

        Ok(SystemStats {
            user_count: counts.participants,
            message_count: counts.messages,
            active_session_count,
            banned_user_count: counts.banned_participants,
            timestamp: current_timestamp(),
        })
    }

    pub async fn list_participants(&self) -> Result<Vec<ParticipantRecord>> {
        Ok(self
            .participants
            .list_participants()
            .await
            .context("Failed to list participants")?)
    }

    pub async fn participant(&self, participant: ParticipantId) -> Result<Option<ParticipantRecord>> {
        Ok(self
            .participants
            .get_participant(participant)
            .await
            .with_context(|| format!("Failed to load participant {}", participant))?)
    }

    /// Every message sent or received by `participant`, oldest first
    pub async fn user_history(&self, participant: ParticipantId) -> Result<Vec<MessageRecord>> {
        Ok(self
            .history
            .message_history(participant)
            .await
            .with_context(|| format!("Failed to load history of participant {}", participant))?)
    }

    /// `None` for unknown participants
    pub async fn user_analytics(&self, participant: ParticipantId) -> Result<Option<UserAnalytics>> {
        let Some(record) = self.participant(participant).await? else {
            return Ok(None);
        };
        let messages = self.user_history(participant).await?;

        let total_messages = messages.len();
        let rate = messages
            .iter()
            .map(|m| m.timestamp)
            .min()
            .map(|first| messages_per_hour(total_messages, first, current_timestamp()))
            .unwrap_or(0.0);

        Ok(Some(UserAnalytics {
            participant,
            username: record.profile.username,
            preference: record.preference,
            is_banned: record.is_banned,
            total_messages,
            messages_per_hour: rate,
            join_date: record.joined_at,
            last_active: record.last_active,
        }))
    }

    /// Messages containing `keyword`, newest first
    pub async fn search_messages(&self, keyword: &str) -> Result<Vec<MessageRecord>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let mut found = self
            .history
            .search_messages(keyword)
            .await
            .context("Failed to search messages")?;
        found.reverse();
        Ok(found)
    }

    /// Effective limit for a requested one
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.settings.default_recent_limit)
            .min(self.settings.max_recent_limit)
    }

    /// The most recent messages, newest first
    pub async fn recent_messages(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>> {
        let limit = self.clamp_limit(limit);
        let mut messages = self
            .history
            .recent_messages(limit)
            .await
            .context("Failed to load recent messages")?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn recent_admin_actions(&self, limit: Option<usize>) -> Result<Vec<AdminAction>> {
        Ok(self
            .history
            .recent_admin_actions(self.clamp_limit(limit))
            .await
            .context("Failed to load admin actions")?)
    }

    /// Set or clear the ban flag. Returns `false` for unknown participants.
    pub async fn set_banned(
        &self,
        admin_id: &str,
        participant: ParticipantId,
        banned: bool,
    ) -> Result<bool> {
        let updated = self
            .participants
            .set_banned(participant, banned)
            .await
            .with_context(|| format!("Failed to update ban flag of {}", participant))?;

        if updated {
            let verb = if banned { "Banned" } else { "Unbanned" };
            info!("Admin {} {} participant {}", admin_id, verb.to_lowercase(), participant);
            self.record_action(admin_id, &format!("{} participant {}", verb, participant))
                .await;
        }

        Ok(updated)
    }

    pub async fn ban(&self, admin_id: &str, participant: ParticipantId) -> Result<bool> {
        self.set_banned(admin_id, participant, true).await
    }

    pub async fn unban(&self, admin_id: &str, participant: ParticipantId) -> Result<bool> {
        self.set_banned(admin_id, participant, false).await
    }

    /// Append to the admin action log; failures are logged only
    pub async fn record_action(&self, admin_id: &str, action: &str) {
        let entry = AdminAction {
            admin_id: admin_id.to_string(),
            action: action.to_string(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.audit.record_admin_action(&entry).await {
            warn!("Failed to record admin action '{}' by {}: {}", action, admin_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{ParticipantProfile, SessionRecord};
    use crate::utils::generate_session_id;
    use chrono::Duration;

    fn service(store: Arc<InMemoryStore>) -> AdminService {
        AdminService::new(
            store.clone(),
            store.clone(),
            store,
            AdminSettings {
                default_recent_limit: 2,
                max_recent_limit: 3,
                ..AdminSettings::default()
            },
        )
    }

    async fn message(store: &InMemoryStore, from: i64, to: i64, text: &str) {
        store
            .record_message(&MessageRecord {
                session_id: generate_session_id(),
                from,
                to,
                text: text.to_string(),
                timestamp: current_timestamp(),
                delivered: true,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_messages_per_hour() {
        let now = current_timestamp();
        assert_eq!(messages_per_hour(0, now, now), 0.0);
        assert_eq!(messages_per_hour(4, now - Duration::hours(2), now), 2.0);
        assert_eq!(messages_per_hour(3, now, now), 3.0);
        assert_eq!(messages_per_hour(1, now - Duration::hours(3), now), 0.33);
    }

    #[tokio::test]
    async fn test_system_stats_from_store() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_participant(&ParticipantProfile::new(1)).await.unwrap();
        store.upsert_participant(&ParticipantProfile::new(2)).await.unwrap();
        store.set_banned(2, true).await.unwrap();
        message(&store, 1, 2, "hello").await;
        store
            .record_session(&SessionRecord {
                session_id: generate_session_id(),
                participant_a: 1,
                participant_b: 2,
                started_at: current_timestamp(),
                ended_at: None,
            })
            .await
            .unwrap();

        let stats = service(store).system_stats().await.unwrap();
        assert_eq!(stats.user_count, 2);
        assert_eq!(stats.banned_user_count, 1);
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.active_session_count, 1);
    }

    #[tokio::test]
    async fn test_live_engine_overrides_session_count() {
        let store = Arc::new(InMemoryStore::new());
        let engine = PairingEngine::new();
        engine.request_match(1, Preference::Any).unwrap();
        engine.request_match(2, Preference::Any).unwrap();
        engine.request_match(3, Preference::Any).unwrap();
        engine.request_match(4, Preference::Any).unwrap();

        let stats = service(store)
            .with_engine(engine)
            .system_stats()
            .await
            .unwrap();
        assert_eq!(stats.active_session_count, 2);
    }

    #[tokio::test]
    async fn test_user_analytics() {
        let store = Arc::new(InMemoryStore::new());
        let admin = service(store.clone());
        assert!(admin.user_analytics(7).await.unwrap().is_none());

        store
            .upsert_participant(&ParticipantProfile {
                id: 7,
                username: Some("seven".to_string()),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();
        message(&store, 7, 8, "hi").await;
        message(&store, 8, 7, "hey").await;
        message(&store, 8, 9, "unrelated").await;

        let analytics = admin.user_analytics(7).await.unwrap().unwrap();
        assert_eq!(analytics.total_messages, 2);
        assert_eq!(analytics.username.as_deref(), Some("seven"));
        assert!(analytics.messages_per_hour > 0.0);
    }

    #[tokio::test]
    async fn test_recent_messages_limits() {
        let store = Arc::new(InMemoryStore::new());
        for text in ["one", "two", "three", "four"] {
            message(&store, 1, 2, text).await;
        }
        let admin = service(store);

        let texts = |messages: Vec<MessageRecord>| -> Vec<String> {
            messages.into_iter().map(|m| m.text).collect()
        };

        assert_eq!(texts(admin.recent_messages(None).await.unwrap()), vec!["four", "three"]);
        assert_eq!(admin.recent_messages(Some(50)).await.unwrap().len(), 3);
        assert!(admin.recent_messages(Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_messages_newest_first() {
        let store = Arc::new(InMemoryStore::new());
        message(&store, 1, 2, "Meet at noon").await;
        message(&store, 2, 1, "nothing here").await;
        message(&store, 1, 2, "see you at NOON then").await;
        let admin = service(store);

        let found = admin.search_messages("noon").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, "see you at NOON then");
        assert!(admin.search_messages("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ban_records_admin_action() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_participant(&ParticipantProfile::new(5)).await.unwrap();
        let admin = service(store.clone());

        assert!(admin.ban("admin1", 5).await.unwrap());
        assert!(store.is_banned(5).await.unwrap());
        assert!(!admin.ban("admin1", 404).await.unwrap());
        assert!(admin.unban("admin2", 5).await.unwrap());
        assert!(!store.is_banned(5).await.unwrap());

        let actions = admin.recent_admin_actions(None).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].admin_id, "admin2");
        assert_eq!(actions[0].action, "Unbanned participant 5");
        assert_eq!(actions[1].action, "Banned participant 5");
    }
}

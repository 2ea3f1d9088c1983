//! In-memory store used by tests and dry runs

use super::{AuditSink, HistoryStore, ParticipantStore, StoreCounts, StoreError, StoreResult};
use crate::types::{
    AdminAction, MessageRecord, ParticipantId, ParticipantProfile, ParticipantRecord, Preference,
    SessionRecord,
};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    participants: HashMap<ParticipantId, ParticipantRecord>,
    messages: Vec<MessageRecord>,
    sessions: HashMap<Uuid, SessionRecord>,
    admin_actions: Vec<AdminAction>,
}

/// Store keeping every table in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("Failed to acquire store read lock".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("Failed to acquire store write lock".to_string()))
    }

    fn bare_record(participant: ParticipantId) -> ParticipantRecord {
        let now = current_timestamp();
        ParticipantRecord {
            profile: ParticipantProfile::new(participant),
            preference: Preference::default(),
            is_banned: false,
            message_count: 0,
            joined_at: now,
            last_active: now,
        }
    }
}

#[async_trait]
impl ParticipantStore for InMemoryStore {
    async fn upsert_participant(
        &self,
        profile: &ParticipantProfile,
    ) -> StoreResult<ParticipantRecord> {
        let mut tables = self.write()?;
        let record = tables
            .participants
            .entry(profile.id)
            .or_insert_with(|| Self::bare_record(profile.id));
        record.profile = profile.clone();
        Ok(record.clone())
    }

    async fn get_participant(
        &self,
        participant: ParticipantId,
    ) -> StoreResult<Option<ParticipantRecord>> {
        Ok(self.read()?.participants.get(&participant).cloned())
    }

    async fn list_participants(&self) -> StoreResult<Vec<ParticipantRecord>> {
        let tables = self.read()?;
        let mut records: Vec<_> = tables.participants.values().cloned().collect();
        records.sort_by_key(|r| (r.joined_at, r.profile.id));
        Ok(records)
    }

    async fn get_preference(&self, participant: ParticipantId) -> StoreResult<Preference> {
        Ok(self
            .read()?
            .participants
            .get(&participant)
            .map(|r| r.preference)
            .unwrap_or_default())
    }

    async fn set_preference(
        &self,
        participant: ParticipantId,
        preference: Preference,
    ) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables
            .participants
            .entry(participant)
            .or_insert_with(|| Self::bare_record(participant))
            .preference = preference;
        Ok(())
    }

    async fn is_banned(&self, participant: ParticipantId) -> StoreResult<bool> {
        Ok(self
            .read()?
            .participants
            .get(&participant)
            .is_some_and(|r| r.is_banned))
    }

    async fn set_banned(&self, participant: ParticipantId, banned: bool) -> StoreResult<bool> {
        let mut tables = self.write()?;
        match tables.participants.get_mut(&participant) {
            Some(record) => {
                record.is_banned = banned;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_activity(&self, participant: ParticipantId) -> StoreResult<()> {
        let mut tables = self.write()?;
        let record = tables
            .participants
            .entry(participant)
            .or_insert_with(|| Self::bare_record(participant));
        record.message_count += 1;
        record.last_active = current_timestamp();
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn message_history(
        &self,
        participant: ParticipantId,
    ) -> StoreResult<Vec<MessageRecord>> {
        let tables = self.read()?;
        let mut messages: Vec<_> = tables
            .messages
            .iter()
            .filter(|m| m.from == participant || m.to == participant)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn recent_messages(&self, limit: usize) -> StoreResult<Vec<MessageRecord>> {
        let tables = self.read()?;
        let mut messages = tables.messages.clone();
        messages.sort_by_key(|m| m.timestamp);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn search_messages(&self, keyword: &str) -> StoreResult<Vec<MessageRecord>> {
        let needle = keyword.to_lowercase();
        let tables = self.read()?;
        let mut messages: Vec<_> = tables
            .messages
            .iter()
            .filter(|m| m.text.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn session(&self, session_id: Uuid) -> StoreResult<Option<SessionRecord>> {
        Ok(self.read()?.sessions.get(&session_id).cloned())
    }

    async fn recent_admin_actions(&self, limit: usize) -> StoreResult<Vec<AdminAction>> {
        let tables = self.read()?;
        Ok(tables
            .admin_actions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        let tables = self.read()?;
        Ok(StoreCounts {
            participants: tables.participants.len() as u64,
            banned_participants: tables.participants.values().filter(|r| r.is_banned).count()
                as u64,
            messages: tables.messages.len() as u64,
            sessions: tables.sessions.len() as u64,
            open_sessions: tables
                .sessions
                .values()
                .filter(|s| s.ended_at.is_none())
                .count() as u64,
        })
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record_message(&self, message: &MessageRecord) -> StoreResult<()> {
        self.write()?.messages.push(message.clone());
        Ok(())
    }

    async fn record_session(&self, session: &SessionRecord) -> StoreResult<()> {
        let mut tables = self.write()?;
        match tables.sessions.get_mut(&session.session_id) {
            Some(existing) => {
                if existing.ended_at.is_none() {
                    existing.ended_at = session.ended_at;
                }
            }
            None => {
                tables.sessions.insert(session.session_id, session.clone());
            }
        }
        Ok(())
    }

    async fn record_admin_action(&self, action: &AdminAction) -> StoreResult<()> {
        self.write()?.admin_actions.push(action.clone());
        Ok(())
    }
}

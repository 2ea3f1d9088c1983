//! Session table: participant identity to active session
//!
//! Both members of an open session map to the same entry. Closing a session
//! removes both mappings in one step, so a half-registered pair never exists.

use crate::types::{ParticipantId, Session, SessionId};
use crate::utils::{current_timestamp, generate_session_id};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, Session>,
    by_participant: HashMap<ParticipantId, SessionId>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session between two distinct, currently unpaired participants.
    ///
    /// Returns `None` when the pair is invalid (same identity or either side
    /// already paired); the table is left unchanged in that case.
    pub fn open(&mut self, a: ParticipantId, b: ParticipantId) -> Option<Session> {
        if a == b || self.contains(a) || self.contains(b) {
            return None;
        }

        let session = Session {
            id: generate_session_id(),
            participants: (a, b),
            started_at: current_timestamp(),
            ended_at: None,
        };

        self.by_participant.insert(a, session.id);
        self.by_participant.insert(b, session.id);
        self.sessions.insert(session.id, session.clone());
        Some(session)
    }

    /// Active session of `participant`
    pub fn get(&self, participant: ParticipantId) -> Option<&Session> {
        self.by_participant
            .get(&participant)
            .and_then(|id| self.sessions.get(id))
    }

    pub fn get_by_id(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn partner_of(&self, participant: ParticipantId) -> Option<ParticipantId> {
        self.get(participant)
            .and_then(|session| session.partner_of(participant))
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.by_participant.contains_key(&participant)
    }

    /// Close the session `participant` belongs to, stamping its end time.
    ///
    /// Returns the closed session; `None` if the participant was not paired.
    pub fn close(&mut self, participant: ParticipantId) -> Option<Session> {
        let session_id = *self.by_participant.get(&participant)?;
        self.close_by_id(session_id)
    }

    /// Close a specific session if it is still active
    pub fn close_by_id(&mut self, session_id: SessionId) -> Option<Session> {
        let mut session = self.sessions.remove(&session_id)?;
        let (a, b) = session.participants;
        self.by_participant.remove(&a);
        self.by_participant.remove(&b);
        session.ended_at = Some(current_timestamp());
        Some(session)
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Every participant currently in a session
    pub fn paired_participants(&self) -> Vec<ParticipantId> {
        self.by_participant.keys().copied().collect()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_maps_both_participants() {
        let mut table = SessionTable::new();
        let session = table.open(1, 2).unwrap();

        assert_eq!(table.get(1), Some(&session));
        assert_eq!(table.get(2), Some(&session));
        assert_eq!(table.partner_of(1), Some(2));
        assert_eq!(table.partner_of(2), Some(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_open_rejects_self_and_paired() {
        let mut table = SessionTable::new();
        assert!(table.open(1, 1).is_none());

        table.open(1, 2).unwrap();
        assert!(table.open(2, 3).is_none());
        assert!(table.open(3, 1).is_none());
        assert_eq!(table.len(), 1);
        assert!(!table.contains(3));
    }

    #[test]
    fn test_close_removes_both_and_stamps_end() {
        let mut table = SessionTable::new();
        let opened = table.open(5, 6).unwrap();

        let closed = table.close(6).unwrap();
        assert_eq!(closed.id, opened.id);
        assert!(closed.ended_at.is_some());
        assert!(!table.contains(5));
        assert!(!table.contains(6));
        assert!(table.is_empty());

        assert!(table.close(5).is_none());
    }

    #[test]
    fn test_close_by_id_ignores_stale_ids() {
        let mut table = SessionTable::new();
        let first = table.open(1, 2).unwrap();
        table.close(1);
        let second = table.open(1, 3).unwrap();

        assert!(table.close_by_id(first.id).is_none());
        assert_eq!(table.get(1).map(|s| s.id), Some(second.id));
    }
}

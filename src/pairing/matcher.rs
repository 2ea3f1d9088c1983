//! Partner search over the waiting queues
//!
//! The matcher only decides who the partner is. Removing both participants
//! from the queues and opening the session is done by the engine inside the
//! same critical section.

use crate::pairing::queue::PreferenceQueueSet;
use crate::pairing::table::SessionTable;
use crate::types::{ParticipantId, Preference};

/// Trait for partner selection strategies
pub trait PartnerMatcher: Send + Sync {
    /// Pick a partner for `participant` searching under `preference`.
    ///
    /// Must not return `participant` itself or anyone already in a session.
    fn find_partner(
        &self,
        participant: ParticipantId,
        preference: Preference,
        queues: &PreferenceQueueSet,
        sessions: &SessionTable,
    ) -> Option<ParticipantId>;

    /// Whether a searcher of `searcher` may be paired with a waiter of `waiter`
    fn is_compatible(&self, searcher: Preference, waiter: Preference) -> bool;
}

/// First-come, first-served matcher over the preference compatibility table
#[derive(Debug, Clone, Default)]
pub struct PreferenceMatcher;

impl PreferenceMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl PartnerMatcher for PreferenceMatcher {
    fn find_partner(
        &self,
        participant: ParticipantId,
        preference: Preference,
        queues: &PreferenceQueueSet,
        sessions: &SessionTable,
    ) -> Option<ParticipantId> {
        queues
            .candidates(preference)
            .find(|candidate| *candidate != participant && !sessions.contains(*candidate))
    }

    fn is_compatible(&self, searcher: Preference, waiter: Preference) -> bool {
        searcher.search_order().contains(&waiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_table() {
        let matcher = PreferenceMatcher::new();

        assert!(matcher.is_compatible(Preference::Male, Preference::Female));
        assert!(matcher.is_compatible(Preference::Male, Preference::Any));
        assert!(!matcher.is_compatible(Preference::Male, Preference::Male));

        assert!(matcher.is_compatible(Preference::Female, Preference::Male));
        assert!(matcher.is_compatible(Preference::Female, Preference::Any));
        assert!(!matcher.is_compatible(Preference::Female, Preference::Female));

        assert!(matcher.is_compatible(Preference::Any, Preference::Any));
        assert!(!matcher.is_compatible(Preference::Any, Preference::Male));
        assert!(!matcher.is_compatible(Preference::Any, Preference::Female));
    }

    #[test]
    fn test_targeted_queue_beats_any_queue() {
        let matcher = PreferenceMatcher::new();
        let mut queues = PreferenceQueueSet::new();
        let sessions = SessionTable::new();

        queues.enqueue(10, Preference::Any);
        queues.enqueue(11, Preference::Female);

        assert_eq!(
            matcher.find_partner(1, Preference::Male, &queues, &sessions),
            Some(11)
        );
    }

    #[test]
    fn test_skips_self_and_paired_candidates() {
        let matcher = PreferenceMatcher::new();
        let mut queues = PreferenceQueueSet::new();
        let mut sessions = SessionTable::new();

        queues.enqueue(1, Preference::Any);
        queues.enqueue(2, Preference::Any);
        queues.enqueue(3, Preference::Any);
        sessions.open(2, 99).unwrap();

        assert_eq!(
            matcher.find_partner(1, Preference::Any, &queues, &sessions),
            Some(3)
        );
    }

    #[test]
    fn test_any_searcher_ignores_targeted_queues() {
        let matcher = PreferenceMatcher::new();
        let mut queues = PreferenceQueueSet::new();
        let sessions = SessionTable::new();

        queues.enqueue(1, Preference::Male);
        queues.enqueue(2, Preference::Female);

        assert_eq!(
            matcher.find_partner(3, Preference::Any, &queues, &sessions),
            None
        );
    }
}

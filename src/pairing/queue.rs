//! Per-preference FIFO waiting lists
//!
//! Pure data structure: no locking and no I/O. The engine owns one instance
//! behind its mutex. A participant occupies at most one queue at a time.

use crate::types::{ParticipantId, Preference};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// A participant waiting under one preference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub participant: ParticipantId,
    pub preference: Preference,
    pub enqueued_at: DateTime<Utc>,
}

/// The three waiting queues
#[derive(Debug, Clone, Default)]
pub struct PreferenceQueueSet {
    male: VecDeque<WaitingEntry>,
    female: VecDeque<WaitingEntry>,
    any: VecDeque<WaitingEntry>,
}

impl PreferenceQueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, preference: Preference) -> &VecDeque<WaitingEntry> {
        match preference {
            Preference::Male => &self.male,
            Preference::Female => &self.female,
            Preference::Any => &self.any,
        }
    }

    fn queue_mut(&mut self, preference: Preference) -> &mut VecDeque<WaitingEntry> {
        match preference {
            Preference::Male => &mut self.male,
            Preference::Female => &mut self.female,
            Preference::Any => &mut self.any,
        }
    }

    /// Append `participant` to the tail of the `preference` queue.
    ///
    /// Returns `false` without touching anything when the participant already
    /// waits in any queue.
    pub fn enqueue(&mut self, participant: ParticipantId, preference: Preference) -> bool {
        if self.contains(participant) {
            return false;
        }

        self.queue_mut(preference).push_back(WaitingEntry {
            participant,
            preference,
            enqueued_at: current_timestamp(),
        });
        true
    }

    /// Candidate ids for a searcher of `preference`, in priority order.
    ///
    /// Queues are visited in [`Preference::search_order`], each one front to
    /// back. Nothing is removed.
    pub fn candidates(&self, preference: Preference) -> impl Iterator<Item = ParticipantId> + '_ {
        preference
            .search_order()
            .iter()
            .flat_map(move |queue| self.queue(*queue).iter().map(|entry| entry.participant))
    }

    /// Remove `participant` from whichever queue holds it
    pub fn remove(&mut self, participant: ParticipantId) -> Option<WaitingEntry> {
        for preference in Preference::ALL {
            let queue = self.queue_mut(preference);
            if let Some(position) = queue.iter().position(|e| e.participant == participant) {
                return queue.remove(position);
            }
        }
        None
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.entry(participant).is_some()
    }

    /// The waiting entry for `participant`, if any
    pub fn entry(&self, participant: ParticipantId) -> Option<&WaitingEntry> {
        Preference::ALL
            .iter()
            .find_map(|p| self.queue(*p).iter().find(|e| e.participant == participant))
    }

    pub fn preference_of(&self, participant: ParticipantId) -> Option<Preference> {
        self.entry(participant).map(|entry| entry.preference)
    }

    /// Number of participants waiting across all queues
    pub fn len(&self) -> usize {
        self.male.len() + self.female.len() + self.any.len()
    }

    pub fn len_of(&self, preference: Preference) -> usize {
        self.queue(preference).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every waiting participant, queue by queue in FIFO order
    pub fn waiting_participants(&self) -> Vec<ParticipantId> {
        Preference::ALL
            .iter()
            .flat_map(|p| self.queue(*p).iter().map(|e| e.participant))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_rejects_duplicates_across_queues() {
        let mut queues = PreferenceQueueSet::new();

        assert!(queues.enqueue(1, Preference::Male));
        assert!(!queues.enqueue(1, Preference::Male));
        assert!(!queues.enqueue(1, Preference::Any));

        assert_eq!(queues.len(), 1);
        assert_eq!(queues.preference_of(1), Some(Preference::Male));
    }

    #[test]
    fn test_candidates_follow_search_order_and_fifo() {
        let mut queues = PreferenceQueueSet::new();
        queues.enqueue(1, Preference::Any);
        queues.enqueue(2, Preference::Female);
        queues.enqueue(3, Preference::Any);
        queues.enqueue(4, Preference::Female);
        queues.enqueue(5, Preference::Male);

        let for_male: Vec<_> = queues.candidates(Preference::Male).collect();
        assert_eq!(for_male, vec![2, 4, 1, 3]);

        let for_female: Vec<_> = queues.candidates(Preference::Female).collect();
        assert_eq!(for_female, vec![5, 1, 3]);

        let for_any: Vec<_> = queues.candidates(Preference::Any).collect();
        assert_eq!(for_any, vec![1, 3]);
    }

    #[test]
    fn test_candidates_do_not_remove() {
        let mut queues = PreferenceQueueSet::new();
        queues.enqueue(1, Preference::Any);

        let _ = queues.candidates(Preference::Any).count();
        assert!(queues.contains(1));
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut queues = PreferenceQueueSet::new();
        queues.enqueue(7, Preference::Female);

        assert!(queues.remove(8).is_none());
        let removed = queues.remove(7).unwrap();
        assert_eq!(removed.preference, Preference::Female);
        assert!(queues.remove(7).is_none());
        assert!(queues.is_empty());
    }

    #[test]
    fn test_len_of_each_queue() {
        let mut queues = PreferenceQueueSet::new();
        queues.enqueue(1, Preference::Male);
        queues.enqueue(2, Preference::Male);
        queues.enqueue(3, Preference::Any);

        assert_eq!(queues.len_of(Preference::Male), 2);
        assert_eq!(queues.len_of(Preference::Female), 0);
        assert_eq!(queues.len_of(Preference::Any), 1);
        assert_eq!(queues.waiting_participants(), vec![1, 2, 3]);
    }
}

//! Pairing engine: the single owner of matching state
//!
//! The preference queues and the session table live together in one
//! [`PairingState`] behind one mutex, so a match (search, dequeue of both
//! sides, session creation) is a single critical section. The engine does no
//! I/O; callers notify participants and write audit records after the lock is
//! released.

use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::pairing::matcher::{PartnerMatcher, PreferenceMatcher};
use crate::pairing::queue::PreferenceQueueSet;
use crate::pairing::table::SessionTable;
use crate::types::{MatchOutcome, ParticipantId, ParticipantState, Preference, Session, SessionId};
use crate::utils::current_timestamp;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Snapshot of the engine's counters and queue sizes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairingStats {
    pub waiting_male: usize,
    pub waiting_female: usize,
    pub waiting_any: usize,
    pub active_sessions: usize,
    /// Total sessions opened since start
    pub matches_made: u64,
    /// Total sessions closed since start
    pub sessions_ended: u64,
    pub searches_cancelled: u64,
}

impl PairingStats {
    pub fn waiting_for(&self, preference: Preference) -> usize {
        match preference {
            Preference::Male => self.waiting_male,
            Preference::Female => self.waiting_female,
            Preference::Any => self.waiting_any,
        }
    }

    pub fn total_waiting(&self) -> usize {
        self.waiting_male + self.waiting_female + self.waiting_any
    }
}

/// Queue set and session table, always mutated together
#[derive(Debug, Default)]
pub struct PairingState {
    queues: PreferenceQueueSet,
    sessions: SessionTable,
    matches_made: u64,
    sessions_ended: u64,
    searches_cancelled: u64,
}

impl PairingState {
    pub fn queues(&self) -> &PreferenceQueueSet {
        &self.queues
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    fn stats(&self) -> PairingStats {
        PairingStats {
            waiting_male: self.queues.len_of(Preference::Male),
            waiting_female: self.queues.len_of(Preference::Female),
            waiting_any: self.queues.len_of(Preference::Any),
            active_sessions: self.sessions.len(),
            matches_made: self.matches_made,
            sessions_ended: self.sessions_ended,
            searches_cancelled: self.searches_cancelled,
        }
    }
}

/// Result of a match attempt computed under the lock, consumed after it
struct MatchDecision {
    outcome: MatchOutcome,
    partner_waited: Option<(Preference, Duration)>,
}

/// Cheaply clonable handle to the shared pairing state
#[derive(Clone)]
pub struct PairingEngine {
    state: Arc<Mutex<PairingState>>,
    matcher: Arc<dyn PartnerMatcher>,
    metrics_collector: Arc<MetricsCollector>,
}

impl PairingEngine {
    /// Create an engine with the default matcher and its own metrics registry
    pub fn new() -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(metrics_collector)
    }

    /// Create an engine reporting into an existing metrics collector
    pub fn with_metrics(metrics_collector: Arc<MetricsCollector>) -> Self {
        Self::with_matcher(Arc::new(PreferenceMatcher::new()), metrics_collector)
    }

    /// Create with a custom partner selection strategy
    pub fn with_matcher(
        matcher: Arc<dyn PartnerMatcher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(PairingState::default())),
            matcher,
            metrics_collector,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PairingState>> {
        self.state.lock().map_err(|_| {
            ChatError::InternalError {
                message: "Failed to acquire pairing state lock".to_string(),
            }
            .into()
        })
    }

    /// Find a partner for `participant` or leave it waiting under `preference`.
    ///
    /// A participant already waiting keeps its queue position when asking
    /// again with the same preference; a different preference moves it to the
    /// tail of the new queue. Either way the search runs again.
    pub fn request_match(
        &self,
        participant: ParticipantId,
        preference: Preference,
    ) -> Result<MatchOutcome> {
        let decision = {
            let mut state = self.lock()?;
            self.decide(&mut state, participant, preference)?
        };

        self.metrics_collector
            .record_match_request(preference, &decision.outcome);
        if let Some((partner_preference, waited)) = decision.partner_waited {
            self.metrics_collector
                .record_wait_time(partner_preference, waited);
        }

        match &decision.outcome {
            MatchOutcome::Matched(session) => info!(
                "Matched participant {} ({}) - session: {}, participants: {:?}",
                participant, preference, session.id, session.participants
            ),
            MatchOutcome::Waiting => debug!(
                "No partner for participant {} ({}), waiting",
                participant, preference
            ),
            MatchOutcome::AlreadyInSession(session) => debug!(
                "Participant {} already in session {}, match request ignored",
                participant, session.id
            ),
        }

        Ok(decision.outcome)
    }

    fn decide(
        &self,
        state: &mut PairingState,
        participant: ParticipantId,
        preference: Preference,
    ) -> Result<MatchDecision> {
        if let Some(session) = state.sessions.get(participant) {
            return Ok(MatchDecision {
                outcome: MatchOutcome::AlreadyInSession(session.clone()),
                partner_waited: None,
            });
        }

        match state.queues.preference_of(participant) {
            Some(current) if current != preference => {
                state.queues.remove(participant);
            }
            _ => {}
        }

        let partner =
            self.matcher
                .find_partner(participant, preference, &state.queues, &state.sessions);

        let Some(partner) = partner else {
            state.queues.enqueue(participant, preference);
            return Ok(MatchDecision {
                outcome: MatchOutcome::Waiting,
                partner_waited: None,
            });
        };

        let partner_entry = state.queues.remove(partner);
        state.queues.remove(participant);

        let session = state.sessions.open(participant, partner).ok_or_else(|| {
            ChatError::InternalError {
                message: format!(
                    "Matcher returned unavailable partner {} for participant {}",
                    partner, participant
                ),
            }
        })?;
        state.matches_made += 1;

        let partner_waited = partner_entry.map(|entry| {
            let waited = (current_timestamp() - entry.enqueued_at)
                .to_std()
                .unwrap_or_default();
            (entry.preference, waited)
        });

        Ok(MatchDecision {
            outcome: MatchOutcome::Matched(session),
            partner_waited,
        })
    }

    /// Close the session `participant` belongs to.
    ///
    /// Returns the closed session, `None` if there was none. Neither member
    /// is put back into a queue.
    pub fn end_session(&self, participant: ParticipantId) -> Result<Option<Session>> {
        let closed = {
            let mut state = self.lock()?;
            let closed = state.sessions.close(participant);
            if closed.is_some() {
                state.sessions_ended += 1;
            }
            closed
        };

        if let Some(session) = &closed {
            self.record_closed(session, "stopped");
            info!(
                "Participant {} ended session {} - participants: {:?}",
                participant, session.id, session.participants
            );
        }

        Ok(closed)
    }

    /// Close `session_id` only if it is still active.
    ///
    /// Used after a failed delivery, when the session may already have been
    /// ended by either member while the lock was released.
    pub fn close_if_current(&self, session_id: SessionId) -> Result<Option<Session>> {
        let closed = {
            let mut state = self.lock()?;
            let closed = state.sessions.close_by_id(session_id);
            if closed.is_some() {
                state.sessions_ended += 1;
            }
            closed
        };

        if let Some(session) = &closed {
            self.record_closed(session, "unreachable");
            info!(
                "Closed session {} after failed delivery - participants: {:?}",
                session.id, session.participants
            );
        }

        Ok(closed)
    }

    fn record_closed(&self, session: &Session, reason: &str) {
        let lifetime = session
            .ended_at
            .map(|ended| (ended - session.started_at).to_std().unwrap_or_default())
            .unwrap_or_default();
        self.metrics_collector.record_session_ended(reason, lifetime);
    }

    /// Withdraw a waiting participant. Returns whether it was waiting.
    pub fn cancel_search(&self, participant: ParticipantId) -> Result<bool> {
        let removed = {
            let mut state = self.lock()?;
            let removed = state.queues.remove(participant);
            if removed.is_some() {
                state.searches_cancelled += 1;
            }
            removed
        };

        if let Some(entry) = &removed {
            self.metrics_collector.record_search_cancelled();
            debug!(
                "Participant {} stopped searching ({})",
                participant, entry.preference
            );
        }

        Ok(removed.is_some())
    }

    pub fn state_of(&self, participant: ParticipantId) -> Result<ParticipantState> {
        let state = self.lock()?;

        if let Some(session) = state.sessions.get(participant) {
            return Ok(ParticipantState::InSession(session.clone()));
        }

        Ok(match state.queues.preference_of(participant) {
            Some(preference) => ParticipantState::Waiting(preference),
            None => ParticipantState::Idle,
        })
    }

    pub fn session_of(&self, participant: ParticipantId) -> Result<Option<Session>> {
        let state = self.lock()?;
        Ok(state.sessions.get(participant).cloned())
    }

    pub fn partner_of(&self, participant: ParticipantId) -> Result<Option<ParticipantId>> {
        let state = self.lock()?;
        Ok(state.sessions.partner_of(participant))
    }

    pub fn stats(&self) -> Result<PairingStats> {
        let state = self.lock()?;
        Ok(state.stats())
    }

    /// Run `f` against the locked state; for invariant checks and reporting
    pub fn inspect<T>(&self, f: impl FnOnce(&PairingState) -> T) -> Result<T> {
        let state = self.lock()?;
        Ok(f(&state))
    }

    /// Push current queue and session gauges into the metrics collector
    pub fn refresh_metrics(&self) -> Result<()> {
        let stats = self.stats()?;
        self.metrics_collector.update_from_pairing_stats(&stats);
        Ok(())
    }
}

impl Default for PairingEngine {
    fn default() -> Self {
        Self::new()
    }
}

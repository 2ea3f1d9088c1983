//! Property tests for the pairing state
//!
//! Random sequences of match requests, cancellations and session ends must
//! never leave a participant both waiting and paired, or waiting twice.

use anon_chat::pairing::PairingEngine;
use anon_chat::types::{ParticipantState, Preference};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Match(i64, Preference),
    End(i64),
    Cancel(i64),
}

fn preference() -> impl Strategy<Value = Preference> {
    prop_oneof![
        Just(Preference::Male),
        Just(Preference::Female),
        Just(Preference::Any),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    let participant = 1i64..12;
    prop_oneof![
        6 => (participant.clone(), preference()).prop_map(|(p, pref)| Op::Match(p, pref)),
        2 => participant.clone().prop_map(Op::End),
        1 => participant.prop_map(Op::Cancel),
    ]
}

fn apply(engine: &PairingEngine, op: &Op) {
    match op {
        Op::Match(participant, preference) => {
            engine.request_match(*participant, *preference).unwrap();
        }
        Op::End(participant) => {
            engine.end_session(*participant).unwrap();
        }
        Op::Cancel(participant) => {
            engine.cancel_search(*participant).unwrap();
        }
    }
}

proptest! {
    #[test]
    fn waiting_and_paired_sets_stay_disjoint(ops in prop::collection::vec(op(), 1..80)) {
        let engine = PairingEngine::new();

        for op in &ops {
            apply(&engine, op);

            let (waiting, paired) = engine
                .inspect(|state| {
                    (
                        state.queues().waiting_participants(),
                        state.sessions().paired_participants(),
                    )
                })
                .unwrap();

            let waiting_set: HashSet<_> = waiting.iter().copied().collect();
            let paired_set: HashSet<_> = paired.iter().copied().collect();

            prop_assert_eq!(waiting_set.len(), waiting.len(), "participant queued twice");
            prop_assert_eq!(paired_set.len(), paired.len(), "participant in two sessions");
            prop_assert!(waiting_set.is_disjoint(&paired_set));
        }
    }

    #[test]
    fn every_session_pairs_two_distinct_participants(ops in prop::collection::vec(op(), 1..80)) {
        let engine = PairingEngine::new();
        for op in &ops {
            apply(&engine, op);
        }

        let sessions = engine
            .inspect(|state| state.sessions().sessions().cloned().collect::<Vec<_>>())
            .unwrap();

        for session in sessions {
            let (a, b) = session.participants;
            prop_assert_ne!(a, b);
            prop_assert!(session.is_open());
            prop_assert_eq!(engine.partner_of(a).unwrap(), Some(b));
            prop_assert_eq!(
                engine.state_of(b).unwrap(),
                ParticipantState::InSession(session.clone())
            );
        }
    }

    #[test]
    fn stats_match_state(ops in prop::collection::vec(op(), 1..60)) {
        let engine = PairingEngine::new();
        for op in &ops {
            apply(&engine, op);
        }

        let stats = engine.stats().unwrap();
        let (waiting, paired) = engine
            .inspect(|state| (state.queues().len(), state.sessions().paired_participants().len()))
            .unwrap();

        prop_assert_eq!(stats.total_waiting(), waiting);
        prop_assert_eq!(stats.active_sessions * 2, paired);
    }
}

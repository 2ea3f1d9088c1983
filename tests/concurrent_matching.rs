//! High concurrency tests for match requests
//!
//! Many participants search at once through the shared relay. Afterwards
//! every participant must be either waiting or in exactly one session.

mod fixtures;

use anon_chat::types::{MatchOutcome, ParticipantId, ParticipantState, Preference};
use futures::future::join_all;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use fixtures::create_test_system;

fn preference_for(participant: ParticipantId) -> Preference {
    match participant % 3 {
        0 => Preference::Male,
        1 => Preference::Female,
        _ => Preference::Any,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_200_concurrent_match_requests() {
    let system = create_test_system();
    let participants: Vec<ParticipantId> = (1..=200).collect();

    let start_time = Instant::now();

    let handles: Vec<_> = participants
        .iter()
        .map(|&participant| {
            let relay = system.relay.clone();
            tokio::spawn(async move {
                relay
                    .request_match(participant, preference_for(participant))
                    .await
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let elapsed = start_time.elapsed();
    println!("200 concurrent match requests took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5));

    let matched = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, MatchOutcome::Matched(_)))
        .count();

    let stats = system.engine.stats().unwrap();
    assert_eq!(stats.active_sessions, matched);
    assert_eq!(stats.active_sessions * 2 + stats.total_waiting(), participants.len());

    let mut seen = HashSet::new();
    for &participant in &participants {
        match system.engine.state_of(participant).unwrap() {
            ParticipantState::Waiting(preference) => {
                assert_eq!(preference, preference_for(participant));
            }
            ParticipantState::InSession(session) => {
                let partner = session.partner_of(participant).unwrap();
                assert_ne!(partner, participant);
                assert_eq!(system.engine.partner_of(partner).unwrap(), Some(participant));
            }
            ParticipantState::Idle => panic!("participant {} lost", participant),
        }
        assert!(seen.insert(participant));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_any_searchers_leave_at_most_one_waiting() {
    let system = create_test_system();

    let requests = (1..=101).map(|participant| {
        let relay = system.relay.clone();
        async move { relay.request_match(participant, Preference::Any).await }
    });

    for outcome in join_all(requests).await {
        outcome.unwrap();
    }

    let stats = system.engine.stats().unwrap();
    assert_eq!(stats.waiting_any, 1);
    assert_eq!(stats.active_sessions, 50);
    assert_eq!(stats.matches_made, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_searches_and_teardowns() {
    let system = create_test_system();

    for participant in 1..=100 {
        system
            .relay
            .request_match(participant, Preference::Any)
            .await
            .unwrap();
    }
    assert_eq!(system.engine.stats().unwrap().active_sessions, 50);

    // Half the participants hang up while newcomers search
    let teardowns = (1..=50).map(|participant| {
        let relay = system.relay.clone();
        tokio::spawn(async move { relay.end_session(participant).await.map(|_| ()) })
    });
    let searches = (101..=150).map(|participant| {
        let relay = system.relay.clone();
        tokio::spawn(async move {
            relay
                .request_match(participant, Preference::Any)
                .await
                .map(|_| ())
        })
    });

    let handles: Vec<_> = teardowns.chain(searches).collect();
    for joined in join_all(handles).await {
        joined.unwrap().unwrap();
    }

    let (waiting, paired) = system
        .engine
        .inspect(|state| {
            (
                state.queues().waiting_participants(),
                state.sessions().paired_participants(),
            )
        })
        .unwrap();

    let waiting: HashSet<_> = waiting.into_iter().collect();
    let paired: HashSet<_> = paired.into_iter().collect();
    assert!(waiting.is_disjoint(&paired));

    // Ended sessions never put their members back into a queue
    for participant in 1..=100 {
        assert!(!waiting.contains(&participant));
    }
    // Newcomers can only find each other
    let stats = system.engine.stats().unwrap();
    assert_eq!(stats.waiting_any, 0);
    assert_eq!(stats.active_sessions, 50);
    assert_eq!(stats.sessions_ended, 25);
}

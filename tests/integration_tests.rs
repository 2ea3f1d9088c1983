//! Integration tests for the anonymous chat service
//!
//! These tests drive the pairing core, the relay and the chat handler
//! together, including:
//! - Matching scenarios across preference queues
//! - Session teardown and its audit trail
//! - Re-matching after a failed delivery
//! - Persistence through the SQLite store

mod fixtures;

use anon_chat::bot::notices;
use anon_chat::pairing::{
    forwarded_text, PartnerMatcher, PreferenceMatcher, PreferenceQueueSet, SessionTable,
};
use anon_chat::store::{HistoryStore, ParticipantStore, SqliteStore};
use anon_chat::types::{MatchOutcome, ParticipantState, Preference, RelayOutcome};
use std::sync::Arc;

use fixtures::{create_test_system, create_test_system_with_audit, event, FailingAuditSink};

fn matched(outcome: MatchOutcome) -> anon_chat::types::Session {
    match outcome {
        MatchOutcome::Matched(session) => session,
        other => panic!("expected a match, got {:?}", other),
    }
}

#[tokio::test]
async fn test_two_any_participants_pair_up() {
    let system = create_test_system();

    let first = system.relay.request_match(1, Preference::Any).await.unwrap();
    assert_eq!(first, MatchOutcome::Waiting);

    let session = matched(system.relay.request_match(2, Preference::Any).await.unwrap());
    assert!(session.includes(1) && session.includes(2));

    let stats = system.engine.stats().unwrap();
    assert_eq!(stats.total_waiting(), 0);
    assert_eq!(stats.active_sessions, 1);

    let stored = system.store.session(session.id).await.unwrap().unwrap();
    assert!(stored.ended_at.is_none());
}

#[tokio::test]
async fn test_targeted_searcher_takes_any_waiter() {
    let system = create_test_system();

    system.relay.request_match(4, Preference::Any).await.unwrap();
    let session = matched(system.relay.request_match(3, Preference::Male).await.unwrap());

    assert_eq!(session.partner_of(3), Some(4));
}

#[tokio::test]
async fn test_opposite_category_before_any_queue() {
    let system = create_test_system();

    system.relay.request_match(10, Preference::Any).await.unwrap();
    system.relay.request_match(11, Preference::Female).await.unwrap();

    let session = matched(system.relay.request_match(12, Preference::Male).await.unwrap());
    assert_eq!(session.partner_of(12), Some(11));
    assert_eq!(
        system.engine.state_of(10).unwrap(),
        ParticipantState::Waiting(Preference::Any)
    );
}

#[test]
fn test_any_queue_is_first_in_first_out() {
    let mut queues = PreferenceQueueSet::new();
    for participant in [100, 200, 300] {
        queues.enqueue(participant, Preference::Any);
    }

    let partner = PreferenceMatcher::new().find_partner(
        400,
        Preference::Any,
        &queues,
        &SessionTable::new(),
    );
    assert_eq!(partner, Some(100));
}

#[tokio::test]
async fn test_end_session_twice_writes_one_end_record() {
    let system = create_test_system();
    system.relay.request_match(1, Preference::Any).await.unwrap();
    let session = matched(system.relay.request_match(2, Preference::Any).await.unwrap());

    assert_eq!(system.relay.end_session(1).await.unwrap(), Some(2));
    let first_end = system
        .store
        .session(session.id)
        .await
        .unwrap()
        .unwrap()
        .ended_at;
    assert!(first_end.is_some());

    assert_eq!(system.relay.end_session(1).await.unwrap(), None);
    assert_eq!(system.relay.end_session(2).await.unwrap(), None);

    let stored = system.store.session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.ended_at, first_end);
    assert_eq!(system.engine.state_of(1).unwrap(), ParticipantState::Idle);
    assert_eq!(system.engine.state_of(2).unwrap(), ParticipantState::Idle);
}

#[tokio::test]
async fn test_failed_delivery_rematches_sender() {
    let system = create_test_system();
    system.store.set_preference(1, Preference::Male).await.unwrap();

    system.relay.request_match(2, Preference::Any).await.unwrap();
    matched(system.relay.request_match(1, Preference::Male).await.unwrap());

    system.transport.mark_unreachable(2);
    let outcome = system.relay.deliver(1, "are you there?").await.unwrap();
    assert_eq!(
        outcome,
        RelayOutcome::DeliveryFailed {
            recipient: 2,
            rematch: MatchOutcome::Waiting
        }
    );

    // The attempt is on record even though it failed
    let history = system.store.message_history(1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].delivered);
    assert_eq!(history[0].text, "are you there?");

    assert_eq!(
        system.engine.state_of(1).unwrap(),
        ParticipantState::Waiting(Preference::Male)
    );
    assert_eq!(system.engine.state_of(2).unwrap(), ParticipantState::Idle);

    let session = matched(system.relay.request_match(3, Preference::Female).await.unwrap());
    assert_eq!(session.partner_of(3), Some(1));
}

#[tokio::test]
async fn test_relay_continues_when_audit_fails() {
    let store = Arc::new(anon_chat::store::InMemoryStore::new());
    let audit = Arc::new(FailingAuditSink::default());
    let system = create_test_system_with_audit(store, audit.clone());

    system.relay.request_match(1, Preference::Any).await.unwrap();
    system.relay.request_match(2, Preference::Any).await.unwrap();

    let outcome = system.relay.deliver(1, "hello").await.unwrap();
    assert_eq!(outcome, RelayOutcome::Delivered { recipient: 2 });
    assert_eq!(system.transport.sent_to(2), vec![forwarded_text("hello")]);

    // One session write and one message write were attempted
    assert_eq!(audit.attempts(), 2);
}

#[tokio::test]
async fn test_chat_flow_through_handler() {
    let system = create_test_system();

    for payload in ["/start", "/gender female"] {
        system.handler.on_event(event(1, payload)).await.unwrap();
    }
    system.handler.on_event(event(1, "/search")).await.unwrap();
    assert_eq!(
        system.transport.sent_to(1).last().map(String::as_str),
        Some(notices::SEARCHING)
    );

    system.handler.on_event(event(2, "/start")).await.unwrap();
    system.handler.on_event(event(2, "/gender male")).await.unwrap();
    system.handler.on_event(event(2, "/search")).await.unwrap();
    assert!(system.transport.sent_to(1).contains(&notices::CONNECTED.to_string()));
    assert!(system.transport.sent_to(2).contains(&notices::CONNECTED.to_string()));

    system.handler.on_event(event(2, "hi!")).await.unwrap();
    assert!(system.transport.sent_to(1).contains(&forwarded_text("hi!")));

    system.handler.on_event(event(1, "/stop")).await.unwrap();
    assert_eq!(
        system.transport.sent_to(2).last().map(String::as_str),
        Some(notices::PARTNER_ENDED)
    );
    assert_eq!(
        system.transport.sent_to(1).last().map(String::as_str),
        Some(notices::CHAT_ENDED)
    );

    let record = system.store.get_participant(2).await.unwrap().unwrap();
    assert_eq!(record.message_count, 1);
    assert_eq!(record.preference, Preference::Male);
}

#[tokio::test]
async fn test_sqlite_store_keeps_audit_trail() {
    let store = Arc::new(SqliteStore::connect(":memory:").await.unwrap());
    let metrics_collector = Arc::new(anon_chat::metrics::MetricsCollector::new().unwrap());
    let engine = anon_chat::PairingEngine::with_metrics(metrics_collector.clone());
    let transport = Arc::new(fixtures::RecordingTransport::new());
    let relay = anon_chat::Relay::new(
        engine,
        transport,
        store.clone(),
        store.clone(),
        metrics_collector,
    );

    relay.request_match(1, Preference::Any).await.unwrap();
    let session = matched(relay.request_match(2, Preference::Any).await.unwrap());
    relay.deliver(1, "first").await.unwrap();
    relay.deliver(2, "second").await.unwrap();
    relay.end_session(2).await.unwrap();

    let history = store.message_history(1).await.unwrap();
    let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);

    let stored = store.session(session.id).await.unwrap().unwrap();
    assert!(stored.ended_at.is_some());

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.messages, 2);
    assert_eq!(counts.sessions, 1);
    assert_eq!(counts.open_sessions, 0);
}

//! Contract Test: Update Cycle
//!
//! This test verifies the poll → compare → update path of one cycle.
//!
//! Constraints verified:
//! - An update is issued iff the current IP differs from the published one
//! - The new baseline is persisted after a successful update
//! - A resolved address of the wrong family is never pushed
//!
//! If this test fails, the engine is pushing the wrong thing (or nothing).

mod common;

use cfddns_core::engine::{EngineEvent, StopReason};
use cfddns_core::traits::StateStore;
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn changed_ip_is_pushed_exactly_once() {
    let account = MockCloudflare::publishing(ip("203.0.113.5"));
    let store = CountingStateStore::new(test_settings("home"));

    let (result, events) = run_once(
        ScriptedIpSource::fixed(ip("203.0.113.7")),
        &account,
        Arc::new(store.clone()),
    )
    .await;

    assert_eq!(result.unwrap(), StopReason::Completed);
    assert_eq!(
        account.updates(),
        vec![("home.example.com".to_string(), ip("203.0.113.7"))]
    );
    assert_eq!(store.last_ip().await.unwrap(), Some(ip("203.0.113.7")));
    assert!(events.contains(&EngineEvent::UpdateSucceeded {
        record_name: "home.example.com".into(),
        new_ip: ip("203.0.113.7"),
        previous_ip: Some(ip("203.0.113.5")),
    }));
}

#[tokio::test]
async fn unchanged_ip_is_not_pushed() {
    let account = MockCloudflare::publishing(ip("203.0.113.7"));
    let store = CountingStateStore::new(test_settings("home"));

    let (result, events) = run_once(
        ScriptedIpSource::fixed(ip("203.0.113.7")),
        &account,
        Arc::new(store.clone()),
    )
    .await;

    assert_eq!(result.unwrap(), StopReason::Completed);
    assert_eq!(account.update_count(), 0);
    assert_eq!(store.persist_count(), 0);
    assert!(events.contains(&EngineEvent::UpdateSkipped {
        record_name: "home.example.com".into(),
        current_ip: ip("203.0.113.7"),
    }));
}

#[tokio::test]
async fn baseline_is_seeded_from_published_record() {
    let account = MockCloudflare::publishing(ip("203.0.113.7"));
    // A stale stored value must not win over what the provider publishes
    let store = CountingStateStore::with_last_ip(test_settings("home"), ip("198.51.100.1"));

    let (_, events) = run_once(
        ScriptedIpSource::fixed(ip("203.0.113.7")),
        &account,
        Arc::new(store),
    )
    .await;

    assert_eq!(account.update_count(), 0);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Resolved { baseline_ip: Some(b), .. } if *b == ip("203.0.113.7")
    )));
}

#[tokio::test]
async fn wrong_address_family_is_skipped() {
    let account = MockCloudflare::publishing(ip("203.0.113.5"));
    let store = CountingStateStore::new(test_settings("home"));

    let (result, events) = run_once(
        ScriptedIpSource::fixed(ip("2001:db8::7")),
        &account,
        Arc::new(store),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(account.update_count(), 0);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::CycleSkipped { .. })));
}

#[tokio::test]
async fn single_run_stops_after_one_cycle() {
    let account = MockCloudflare::publishing(ip("203.0.113.5"));
    let source = ScriptedIpSource::fixed(ip("203.0.113.5"));
    let store = CountingStateStore::new(test_settings("home"));

    let (result, events) = run_once(source.clone(), &account, Arc::new(store.clone())).await;

    assert_eq!(result.unwrap(), StopReason::Completed);
    assert_eq!(source.call_count(), 1);
    assert_eq!(store.flush_count(), 1);
    assert!(matches!(events.last(), Some(EngineEvent::Stopped { .. })));
}

//! Contract Test: Idempotency
//!
//! This test verifies that repeated cycles never repeat an update.
//!
//! Constraints verified:
//! - No second update for the same IP without an intervening difference
//! - Every genuine change is pushed once
//! - A restart with a stored baseline does not re-push
//!
//! If this test fails, the daemon would hammer the provider API.

mod common;

use cfddns_core::engine::RunMode;
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn stable_ip_is_pushed_once_across_cycles() {
    let account = MockCloudflare::publishing(ip("203.0.113.5"));
    let source = ScriptedIpSource::fixed(ip("203.0.113.7"));
    let store = CountingStateStore::new(test_settings("home"));

    let running = spawn_engine(source.clone(), &account, Arc::new(store.clone()), RunMode::Daemon);
    wait_cycles(5).await;
    let (result, _) = running.shutdown().await;

    assert!(result.is_ok());
    assert!(
        source.call_count() >= 3,
        "expected several polls, got {}",
        source.call_count()
    );
    assert_eq!(
        account.update_count(),
        1,
        "Expected 1 update for a stable IP, got {:?}",
        account.updates()
    );
    assert_eq!(store.persist_count(), 1);
}

#[tokio::test]
async fn each_change_is_pushed_once() {
    let account = MockCloudflare::publishing(ip("203.0.113.5"));
    let source = ScriptedIpSource::new(vec![
        Some(ip("203.0.113.7")),
        Some(ip("203.0.113.8")),
        Some(ip("203.0.113.8")),
        Some(ip("203.0.113.7")),
    ]);
    let store = CountingStateStore::new(test_settings("home"));

    let running = spawn_engine(source.clone(), &account, Arc::new(store), RunMode::Daemon);
    wait_cycles(6).await;
    let (result, _) = running.shutdown().await;

    assert!(result.is_ok());
    let pushed: Vec<_> = account.updates().into_iter().map(|(_, ip)| ip).collect();
    assert_eq!(
        pushed,
        vec![ip("203.0.113.7"), ip("203.0.113.8"), ip("203.0.113.7")]
    );
}

#[tokio::test]
async fn restart_with_stored_baseline_does_not_repush() {
    // Published content unreadable: the stored last IP is the baseline
    let account = MockCloudflare::unreadable();
    let store = CountingStateStore::with_last_ip(test_settings("home"), ip("203.0.113.7"));

    let (result, _) = run_once(
        ScriptedIpSource::fixed(ip("203.0.113.7")),
        &account,
        Arc::new(store),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(account.update_count(), 0);
}

#[tokio::test]
async fn zone_and_record_are_resolved_once_per_run() {
    let account = MockCloudflare::publishing(ip("203.0.113.7"));
    let store = CountingStateStore::new(test_settings("home"));

    let running = spawn_engine(
        ScriptedIpSource::fixed(ip("203.0.113.7")),
        &account,
        Arc::new(store),
        RunMode::Daemon,
    );
    wait_cycles(4).await;
    let _ = running.shutdown().await;

    assert_eq!(account.zone_lookups(), 1);
    assert_eq!(account.record_lookups().len(), 1);
}

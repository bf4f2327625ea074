//! Contract Test: Preferences Persistence
//!
//! This test runs the engine against the real preferences store.
//!
//! Constraints verified:
//! - 203.0.113.5 → 203.0.113.7 issues one update and `last-ip` becomes .7 on disk
//! - A reload picks up a record name edited in the file
//! - The API key never appears in plaintext on disk

mod common;

use cfddns_core::config::Overrides;
use cfddns_core::engine::RunMode;
use cfddns_core::state::PreferencesStore;
use cfddns_core::traits::StateStore;
use common::*;
use std::sync::Arc;
use tempfile::tempdir;

fn overrides() -> Overrides {
    Overrides {
        domain: Some("example.com".into()),
        name: Some("home".into()),
        api_key: Some("0123456789abcdef".into()),
        mail: Some("admin@example.com".into()),
        ..Overrides::default()
    }
}

#[tokio::test]
async fn applied_ip_is_written_to_preferences() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cloudflare-ddns.toml");
    let store = Arc::new(PreferencesStore::open(&path, &overrides()).await.unwrap());

    let account = MockCloudflare::publishing(ip("203.0.113.5"));
    let (result, _) = run_once(
        ScriptedIpSource::fixed(ip("203.0.113.7")),
        &account,
        store.clone(),
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(
        account.updates(),
        vec![("home.example.com".to_string(), ip("203.0.113.7"))]
    );

    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert!(on_disk.contains("last-ip = \"203.0.113.7\""), "{}", on_disk);
    assert!(!on_disk.contains("0123456789abcdef"));

    let reopened = PreferencesStore::open(&path, &Overrides::default()).await.unwrap();
    assert_eq!(reopened.last_ip().await.unwrap(), Some(ip("203.0.113.7")));
}

#[tokio::test]
async fn reload_reads_edited_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cloudflare-ddns.toml");
    let store = Arc::new(PreferencesStore::open(&path, &overrides()).await.unwrap());

    let account = MockCloudflare::publishing(ip("203.0.113.5"));
    let running = spawn_engine(
        ScriptedIpSource::fixed(ip("203.0.113.5")),
        &account,
        store,
        RunMode::Daemon,
    );
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // The real file sets a 5 minute interval: only the reload wakes the engine
    let edited = std::fs::read_to_string(&path)
        .unwrap()
        .replace("name = \"home\"", "name = \"vpn\"");
    std::fs::write(&path, edited).unwrap();
    running.handle.reload();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (result, _) = running.shutdown().await;
    assert!(result.is_ok());
    assert_eq!(
        account.record_lookups(),
        vec!["home.example.com".to_string(), "vpn.example.com".to_string()]
    );
}

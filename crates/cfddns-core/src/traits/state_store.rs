// # State Store Trait
//
// Defines the interface for durable daemon state.
//
// ## Purpose
//
// The state store is the single persistence boundary of the daemon. It owns:
// - The parsed settings (record target, credentials, interval, paths)
// - The last applied IP (the baseline for change detection)
//
// The engine never touches the preferences file itself.
//
// ## Implementations
//
// - Preferences file (TOML, encrypted credentials): `PreferencesStore`
// - In-memory (tests, embedding): `MemoryStateStore`

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::Settings;

/// Trait for state store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Cache the parsed settings in memory (rebuilt wholesale on reload)
///
/// ## Forbidden Capabilities
/// - ❌ Implement business logic (owned by the engine)
/// - ❌ Perform DNS updates (owned by `DnsProvider`)
/// - ❌ Decide when to update (owned by the engine)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Snapshot of the current settings
    async fn settings(&self) -> Result<Settings, crate::Error>;

    /// The last IP successfully applied to the record, if any
    async fn last_ip(&self) -> Result<Option<IpAddr>, crate::Error>;

    /// Record a successful update and persist it immediately
    ///
    /// Must only be called after the provider confirmed the update.
    async fn set_last_ip(&self, ip: IpAddr) -> Result<(), crate::Error>;

    /// Re-read the backing document, replacing the settings snapshot
    ///
    /// If the document cannot be parsed the previous snapshot is kept and
    /// the error is returned.
    async fn reload(&self) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

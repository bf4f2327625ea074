// # cfddns-core
//
// Core library for the Cloudflare dynamic DNS daemon.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping one DNS record
// pointed at the host's public IP:
// - **IpSource**: Trait for discovering the current public IP
// - **DnsProvider**: Trait for resolving and updating the record via a provider API
// - **StateStore**: Trait for settings and last-applied IP persistence
// - **DdnsEngine**: The reconciliation loop tying them together
// - **PreferencesStore**: TOML preferences file with encrypted credentials
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from HTTP implementations
// 2. **Explicit Settings**: Settings are a value read from the StateStore, never global
// 3. **Plugin Crates**: Resolver and provider live in their own crates
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: An update is pushed only when the IP differs from the baseline

pub mod config;
pub mod engine;
pub mod error;
pub mod paths;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{Credentials, Overrides, RecordTarget, RecordType, Settings};
pub use engine::{
    DdnsEngine, EngineControl, EngineEvent, EngineHandle, RunMode, StopReason, control_channel,
};
pub use error::{Error, Result};
pub use state::{LoadedPreferences, MemoryStateStore, PreferencesStore};
pub use traits::{DnsProvider, DnsProviderFactory, IpSource, StateStore};

// # State Store Implementations
//
// This module provides implementations of the StateStore trait and the
// credential protection the preferences store relies on.

pub mod crypt;
pub mod memory;
pub mod preferences;
pub mod secret;

pub use crypt::{CredentialCipher, Unsealed};
pub use memory::MemoryStateStore;
pub use preferences::{LoadedPreferences, PreferencesStore};
pub use secret::KeyFile;

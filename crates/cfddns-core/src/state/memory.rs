// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple state store that doesn't persist across restarts.
// Useful for testing and for embedding the engine with settings built in
// code rather than read from a preferences file.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - The engine re-seeds the baseline from the provider on the next start

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::Settings;
use crate::traits::state_store::StateStore;

/// In-memory state store implementation
///
/// `reload()` swaps in settings previously staged with
/// [`MemoryStateStore::stage_reload`], mirroring an operator editing the
/// preferences file.
///
/// # Example
///
/// ```rust,no_run
/// use cfddns_core::config::Settings;
/// use cfddns_core::state::MemoryStateStore;
/// use cfddns_core::traits::StateStore;
///
/// # async fn example(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStateStore::new(settings);
///
/// store.set_last_ip("203.0.113.7".parse()?).await?;
/// assert_eq!(store.last_ip().await?, Some("203.0.113.7".parse()?));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug)]
struct Inner {
    settings: Settings,
    staged: Option<Settings>,
    last_ip: Option<IpAddr>,
}

impl MemoryStateStore {
    /// Create a store holding `settings` and no last IP
    pub fn new(settings: Settings) -> Self {
        Self::from_parts(settings, None)
    }

    /// Create a store that remembers `ip` as the last applied address
    pub fn with_last_ip(settings: Settings, ip: IpAddr) -> Self {
        Self::from_parts(settings, Some(ip))
    }

    fn from_parts(settings: Settings, last_ip: Option<IpAddr>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                settings,
                staged: None,
                last_ip,
            })),
        }
    }

    /// Settings that the next `reload()` will switch to
    pub async fn stage_reload(&self, settings: Settings) {
        self.inner.write().await.staged = Some(settings);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn settings(&self) -> Result<Settings, Error> {
        Ok(self.inner.read().await.settings.clone())
    }

    async fn last_ip(&self) -> Result<Option<IpAddr>, Error> {
        Ok(self.inner.read().await.last_ip)
    }

    async fn set_last_ip(&self, ip: IpAddr) -> Result<(), Error> {
        self.inner.write().await.last_ip = Some(ip);
        Ok(())
    }

    async fn reload(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if let Some(settings) = guard.staged.take() {
            settings.validate()?;
            guard.settings = settings;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}

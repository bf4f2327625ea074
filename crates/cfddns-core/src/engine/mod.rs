//! Core DDNS engine
//!
//! The DdnsEngine is responsible for:
//! - Polling the public IP via IpSource
//! - Comparing it against the baseline published at the provider
//! - Updating the DNS record via DnsProvider when they differ
//! - Persisting the new baseline after successful updates
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐         ┌──────────────┐         ┌──────────────────┐
//! │  IpSource   │──poll──▶│  DdnsEngine  │◀─build──│DnsProviderFactory│
//! └─────────────┘         └──────────────┘         └──────────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//! ┌─────────────┐         ┌──────────────┐         ┌─────────────┐
//! │ StateStore  │         │ DnsProvider  │         │   Events    │
//! │ (settings,  │         │ (resolve,    │         │  (notify)   │
//! │  last IP)   │         │  update)     │         │             │
//! └─────────────┘         └──────────────┘         └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! ```text
//! Starting ──▶ Polling ──▶ Updating ──▶ Sleeping ──▶ Polling ...
//!                 │                        ▲
//!                 └────────────────────────┘
//! ```
//!
//! 1. Make sure zone and record ids are resolved (and the baseline seeded)
//! 2. Ask the IpSource for the current IP
//! 3. If it differs from the baseline, call DnsProvider::update_record()
//! 4. On success, move the baseline and persist it through the StateStore
//! 5. Sleep for the configured interval, or stop in single-run mode
//!
//! Network and provider failures are logged and retried on the next cycle.
//! Anything else stops the engine with an error.

mod control;

pub use control::{EngineControl, EngineHandle, control_channel};

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, IpSource, StateStore};

/// Capacity of the event channel returned by [`DdnsEngine::new`]
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Whether the engine loops or performs a single cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// One reconciliation cycle, then stop
    SingleRun,
    /// Cycle every configured interval until shut down
    #[default]
    Daemon,
}

/// Why the engine stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Single-run mode finished its cycle
    Completed,
    /// Shutdown was requested
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => f.write_str("single run completed"),
            StopReason::Shutdown => f.write_str("shutdown requested"),
        }
    }
}

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started and loaded its settings
    Started {
        record_name: String,
    },

    /// Zone and record ids resolved, baseline seeded
    Resolved {
        record_name: String,
        zone_id: String,
        record_id: String,
        baseline_ip: Option<IpAddr>,
    },

    /// A cycle ended early without attempting an update
    CycleSkipped {
        reason: String,
    },

    /// DNS update skipped (no change needed)
    UpdateSkipped {
        record_name: String,
        current_ip: IpAddr,
    },

    /// DNS update succeeded
    UpdateSucceeded {
        record_name: String,
        new_ip: IpAddr,
        previous_ip: Option<IpAddr>,
    },

    /// DNS update failed, retried next cycle
    UpdateFailed {
        record_name: String,
        new_ip: IpAddr,
        error: String,
    },

    /// Configuration reloaded
    Reloaded {
        record_name: String,
    },

    /// Configuration reload failed, previous settings kept
    ReloadFailed {
        error: String,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Per-run reconciliation state, rebuilt on reload
struct Reconciliation {
    settings: Settings,
    provider: Box<dyn DnsProvider>,
    ids: Option<(String, String)>,
    baseline: Option<IpAddr>,
}

impl Reconciliation {
    fn new(settings: Settings, provider: Box<dyn DnsProvider>) -> Self {
        Self {
            settings,
            provider,
            ids: None,
            baseline: None,
        }
    }

    fn record_name(&self) -> String {
        self.settings.target.fqdn()
    }
}

/// Core DDNS engine
///
/// The engine orchestrates the poll → compare → update flow for one record.
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Create a handle/control pair with [`control_channel()`]
/// 3. Start with [`DdnsEngine::run()`]
/// 4. Engine runs until the handle requests shutdown (or one cycle in
///    [`RunMode::SingleRun`])
///
/// ## Threading
///
/// All work happens on the task that awaits `run()`. Updates are strictly
/// sequential; the only long suspension point is the sleep between cycles.
pub struct DdnsEngine {
    /// IP source for polling
    ip_source: Box<dyn IpSource>,

    /// Builds a provider for the current settings
    factory: Box<dyn DnsProviderFactory>,

    /// Settings and last applied IP
    state_store: Arc<dyn StateStore>,

    mode: RunMode,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `ip_source`: IP source implementation
    /// - `factory`: Provider factory, called at startup and after every reload
    /// - `state_store`: State store implementation
    /// - `mode`: Single cycle or daemon loop
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        ip_source: Box<dyn IpSource>,
        factory: Box<dyn DnsProviderFactory>,
        state_store: Arc<dyn StateStore>,
        mode: RunMode,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            ip_source,
            factory,
            state_store,
            mode,
            event_tx: tx,
        };

        (engine, rx)
    }

    /// Run the engine
    ///
    /// # Returns
    ///
    /// - `Ok(StopReason)`: Clean stop (single run done or shutdown)
    /// - `Err(Error)`: Startup misconfiguration or unexpected failure
    pub async fn run(&self, mut control: EngineControl) -> Result<StopReason> {
        let shutdown = control.shutdown.clone();

        let started = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(self.stop(StopReason::Shutdown).await),
            started = self.start() => started,
        };

        let mut state = match started {
            Ok(state) => state,
            Err(e) => return Err(self.fail(e).await),
        };

        loop {
            if control.is_shutdown() {
                return Ok(self.stop(StopReason::Shutdown).await);
            }

            if control.take_reload() {
                self.reload(&mut state).await;
            }

            let cycle = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(self.stop(StopReason::Shutdown).await),
                cycle = self.cycle(&mut state) => cycle,
            };

            if let Err(e) = cycle {
                return Err(self.fail(e).await);
            }

            if self.mode == RunMode::SingleRun {
                return Ok(self.stop(StopReason::Completed).await);
            }

            let Some(deadline) = Instant::now().checked_add(state.settings.interval) else {
                let err = Error::config(format!(
                    "[Cloudflare] frequency-minutes: interval of {}s is out of range",
                    state.settings.interval.as_secs()
                ));
                return Err(self.fail(err).await);
            };
            debug!("Next check in {:?}", state.settings.interval);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(self.stop(StopReason::Shutdown).await),
                Some(()) = control.reload_rx.recv() => {
                    // Drain duplicates, the next iteration reloads once
                    control.take_reload();
                    self.reload(&mut state).await;
                }
                _ = sleep_until(deadline) => {}
            }
        }
    }

    /// Load settings, build the provider and resolve the record
    ///
    /// Only misconfiguration is fatal here. A transient failure leaves the
    /// ids unresolved and the first cycle tries again.
    async fn start(&self) -> Result<Reconciliation> {
        let settings = self.state_store.settings().await?;
        let provider = self.factory.create(&settings)?;
        let mut state = Reconciliation::new(settings, provider);

        info!(
            "Keeping {} {} in sync via {} (every {:?})",
            state.settings.target.record_type,
            state.record_name(),
            state.provider.provider_name(),
            state.settings.interval
        );
        self.emit_event(EngineEvent::Started {
            record_name: state.record_name(),
        });

        match self.ensure_resolved(&mut state).await {
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                warn!("Could not resolve {} yet, will retry: {}", state.record_name(), e);
                state.baseline = self.state_store.last_ip().await?;
            }
            Err(e) => return Err(e),
        }

        Ok(state)
    }

    /// One reconciliation cycle
    ///
    /// Returns `Err` only for failures the next cycle cannot fix.
    async fn cycle(&self, state: &mut Reconciliation) -> Result<()> {
        let record_name = state.record_name();

        let (zone_id, record_id) = match self.ensure_resolved(state).await {
            Ok(ids) => ids,
            Err(e) if e.is_transient() || e.is_misconfiguration() => {
                error!("Cannot resolve {}: {}", record_name, e);
                self.emit_event(EngineEvent::CycleSkipped {
                    reason: e.to_string(),
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let current_ip = match self.ip_source.current().await {
            Ok(ip) => ip,
            Err(e) if e.is_transient() => {
                warn!(
                    "Could not determine public IP via {}: {}",
                    self.ip_source.source_name(),
                    e
                );
                self.emit_event(EngineEvent::CycleSkipped {
                    reason: e.to_string(),
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let record_type = state.settings.target.record_type;
        if !record_type.accepts(&current_ip) {
            warn!(
                "Public IP {} cannot be stored in a {} record, skipping",
                current_ip, record_type
            );
            self.emit_event(EngineEvent::CycleSkipped {
                reason: format!("{} is not valid for a {} record", current_ip, record_type),
            });
            return Ok(());
        }

        // Idempotency: only push a change
        if state.baseline == Some(current_ip) {
            debug!("Record {} already has IP {}, skipping update", record_name, current_ip);
            self.emit_event(EngineEvent::UpdateSkipped {
                record_name,
                current_ip,
            });
            return Ok(());
        }

        info!(
            "IP change detected for {}: {} -> {}",
            record_name,
            state
                .baseline
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            current_ip
        );

        match state
            .provider
            .update_record(&zone_id, &record_id, current_ip)
            .await
        {
            Ok(()) => {
                let previous_ip = state.baseline.replace(current_ip);
                info!("Updated {} -> {}", record_name, current_ip);
                self.emit_event(EngineEvent::UpdateSucceeded {
                    record_name: record_name.clone(),
                    new_ip: current_ip,
                    previous_ip,
                });

                // The DNS change stands even if it cannot be recorded
                if let Err(e) = self.state_store.set_last_ip(current_ip).await {
                    error!("Failed to persist last IP {} for {}: {}", current_ip, record_name, e);
                }
                Ok(())
            }
            Err(e) if e.is_transient() => {
                error!("Failed to update {} to {}: {}", record_name, current_ip, e);
                self.emit_event(EngineEvent::UpdateFailed {
                    record_name,
                    new_ip: current_ip,
                    error: e.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Return the zone/record ids, resolving and seeding the baseline first
    /// if they are not known yet
    async fn ensure_resolved(&self, state: &mut Reconciliation) -> Result<(String, String)> {
        if let Some(ids) = &state.ids {
            return Ok(ids.clone());
        }

        let zone_id = state.provider.resolve_zone().await?;
        let record_id = state.provider.resolve_record(&zone_id).await?;
        debug!(
            "Resolved {} to zone {} record {}",
            state.record_name(),
            zone_id,
            record_id
        );

        state.baseline = match state.provider.get_record_ip(&zone_id, &record_id).await {
            Ok(ip) => {
                info!("{} currently points to {}", state.record_name(), ip);
                Some(ip)
            }
            Err(e) if e.is_transient() => {
                let stored = self.state_store.last_ip().await?;
                warn!(
                    "Could not read published IP of {} ({}), using last known IP {:?}",
                    state.record_name(),
                    e,
                    stored
                );
                stored
            }
            Err(e) => return Err(e),
        };

        self.emit_event(EngineEvent::Resolved {
            record_name: state.record_name(),
            zone_id: zone_id.clone(),
            record_id: record_id.clone(),
            baseline_ip: state.baseline,
        });

        state.ids = Some((zone_id.clone(), record_id.clone()));
        Ok((zone_id, record_id))
    }

    /// Re-read the settings and rebuild the provider
    ///
    /// On failure the previous settings and provider stay in use.
    async fn reload(&self, state: &mut Reconciliation) {
        info!("Reloading configuration");

        let rebuilt = async {
            self.state_store.reload().await?;
            let settings = self.state_store.settings().await?;
            let provider = self.factory.create(&settings)?;
            Ok::<_, Error>(Reconciliation::new(settings, provider))
        }
        .await;

        match rebuilt {
            Ok(next) => {
                *state = next;
                info!("Configuration reloaded, now tracking {}", state.record_name());
                self.emit_event(EngineEvent::Reloaded {
                    record_name: state.record_name(),
                });
            }
            Err(e) => {
                error!("Reload failed, keeping previous configuration: {}", e);
                self.emit_event(EngineEvent::ReloadFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Flush state and report a clean stop
    async fn stop(&self, reason: StopReason) -> StopReason {
        self.flush_best_effort().await;
        info!("Engine stopped: {}", reason);
        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });
        reason
    }

    /// Flush state and pass the error through
    async fn fail(&self, e: Error) -> Error {
        error!("Engine failed: {}", e);
        self.flush_best_effort().await;
        self.emit_event(EngineEvent::Stopped {
            reason: format!("failed: {}", e),
        });
        e
    }

    async fn flush_best_effort(&self) {
        if let Err(e) = self.state_store.flush().await {
            error!("Failed to flush state: {}", e);
        }
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        // Dropped (with a warning) rather than blocking the cycle
        match self.event_tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event");
            }
        }
    }
}

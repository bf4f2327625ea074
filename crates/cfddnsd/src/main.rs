// # cfddnsd - Cloudflare DDNS Daemon
//
// This is a THIN integration layer. The reconciliation logic lives in
// cfddns-core; this binary only wires the pieces together:
//
// 1. Parse the command line
// 2. Read the preferences file and merge command line overrides in memory
// 3. Take the PID lock, then write the merged preferences back
// 4. Set up console and file logging and drop privileges
// 5. Translate signals into engine control
// 6. Run the engine and map the outcome to an exit code
//
// ## Signals
//
// - `SIGTERM`, `SIGHUP`: graceful shutdown (exit 0)
// - `SIGINT`: graceful shutdown (exit 130)
// - `SIGUSR1`: re-read the preferences file
//
// ## Example
//
// ```bash
// cfddnsd --init-config
// cfddnsd --domain example.com --name home --mail admin@example.com --key <API-KEY>
// ```

mod cli;
mod logging;
mod pid_file;
#[cfg(unix)]
mod privileges;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use cfddns_core::engine::{DdnsEngine, EngineEvent, EngineHandle, RunMode, StopReason};
use cfddns_core::traits::StateStore;
use cfddns_core::{PreferencesStore, Settings, control_channel};
use cfddns_ip_http::HttpIpSource;
use cfddns_provider_cloudflare::CloudflareFactory;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

use crate::cli::Cli;
use crate::pid_file::PidLock;

const PACKAGE: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Exit codes for different termination scenarios
///
/// These codes follow shell conventions:
/// - 0: Clean shutdown or completed single run
/// - 1: Configuration, startup or runtime failure
/// - 130: Interrupted (SIGINT)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Startup or runtime failure
    Failure = 1,
    /// Stopped by SIGINT
    Interrupted = 130,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::Failure.into();
        }
    };

    rt.block_on(run(cli)).into()
}

async fn run(cli: Cli) -> DdnsExitCode {
    if cli.init_config {
        return match PreferencesStore::create_template(&cli.config_file).await {
            Ok(()) => {
                println!("Created configuration file at {}", cli.config_file.display());
                DdnsExitCode::CleanShutdown
            }
            Err(e) => {
                eprintln!("{}. Not doing anything", e);
                DdnsExitCode::Failure
            }
        };
    }

    // Nothing is logged before the sinks exist, so startup errors go to stderr
    let loaded = match PreferencesStore::load(&cli.config_file, &cli.overrides()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::Failure;
        }
    };

    // Only the lock holder writes the preferences file or the key file
    let lock = match loaded
        .pid_file()
        .map_err(anyhow::Error::from)
        .and_then(PidLock::acquire)
    {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("{:#}", e);
            return DdnsExitCode::Failure;
        }
    };

    let store = match loaded.commit().await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::Failure;
        }
    };
    let settings = match store.settings().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::Failure;
        }
    };

    let console_level = cli.log_level.unwrap_or(Level::INFO);
    let _log_guard =
        match logging::init(console_level, &settings.logging.file, settings.logging.level) {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("{:#}", e);
                return DdnsExitCode::Failure;
            }
        };

    match supervise(&cli, store, settings, lock).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            DdnsExitCode::Failure
        }
    }
}

/// Run the engine under the PID lock until it stops
async fn supervise(
    cli: &Cli,
    store: Arc<PreferencesStore>,
    settings: Settings,
    lock: PidLock,
) -> Result<DdnsExitCode> {
    #[cfg(unix)]
    {
        let identity = privileges::Identity::resolve(cli.user.as_deref(), cli.group.as_deref())?;
        privileges::drop_to(
            identity,
            &[
                lock.path(),
                &settings.logging.file,
                store.path(),
                &settings.service.key_file,
            ],
        )?;
    }
    #[cfg(not(unix))]
    if cli.user.is_some() || cli.group.is_some() {
        warn!("--user and --group are only supported on Unix, ignoring them");
    }

    let ip_source = HttpIpSource::new(settings.service.ip_service.clone())
        .context("Failed to set up the public IP resolver")?;
    let mode = if cli.single_run {
        RunMode::SingleRun
    } else {
        RunMode::Daemon
    };

    let (engine, events) = DdnsEngine::new(
        Box::new(ip_source),
        Box::new(CloudflareFactory::new()),
        store.clone() as Arc<dyn StateStore>,
        mode,
    );
    let (handle, control) = control_channel();

    let interrupted = Arc::new(AtomicBool::new(false));
    let signals = SignalForwarder::install()?;
    let signal_task = tokio::spawn(signals.forward(handle.clone(), interrupted.clone()));
    let event_task = tokio::spawn(log_events(events));

    info!(
        "Starting {} for {} (every {} minute(s), {})",
        PACKAGE,
        settings.target.fqdn(),
        settings.interval.as_secs() / 60,
        store.path().display()
    );

    let outcome = tokio::spawn(async move { engine.run(control).await }).await;

    signal_task.abort();
    event_task.abort();
    drop(handle);

    let code = match outcome {
        Ok(Ok(reason)) => {
            info!("Cloudflare DDNS stopped: {}", reason);
            if reason == StopReason::Shutdown && interrupted.load(Ordering::SeqCst) {
                DdnsExitCode::Interrupted
            } else {
                DdnsExitCode::CleanShutdown
            }
        }
        Ok(Err(e)) if e.is_misconfiguration() => {
            error!("Cannot keep {} in sync: {}", settings.target.fqdn(), e);
            DdnsExitCode::Failure
        }
        Ok(Err(e)) => {
            error!(
                "Unexpected error: {}. This is a bug in {}, please report it with the log file",
                e, PACKAGE
            );
            DdnsExitCode::Failure
        }
        Err(join_error) => {
            error!(
                "Engine task {}. This is a bug in {}, please report it with the log file",
                if join_error.is_panic() { "panicked" } else { "was cancelled" },
                PACKAGE
            );
            if let Err(e) = store.flush().await {
                warn!("Failed to save preferences: {}", e);
            }
            DdnsExitCode::Failure
        }
    };

    drop(lock);
    Ok(code)
}

/// Drain engine events so observers never block the engine
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "Engine event");
    }
}

/// Signal streams registered before the engine starts
#[cfg(unix)]
struct SignalForwarder {
    terminate: Signal,
    hangup: Signal,
    interrupt: Signal,
    reload: Signal,
}

#[cfg(unix)]
impl SignalForwarder {
    fn install() -> Result<Self> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).with_context(|| format!("Failed to setup {} handler", name))
        };

        Ok(Self {
            terminate: install(SignalKind::terminate(), "SIGTERM")?,
            hangup: install(SignalKind::hangup(), "SIGHUP")?,
            interrupt: install(SignalKind::interrupt(), "SIGINT")?,
            reload: install(SignalKind::user_defined1(), "SIGUSR1")?,
        })
    }

    /// Translate signals into engine control until the task is aborted
    async fn forward(mut self, handle: EngineHandle, interrupted: Arc<AtomicBool>) {
        loop {
            tokio::select! {
                _ = self.terminate.recv() => {
                    warn!("SIGTERM received, finishing");
                    handle.shutdown();
                }
                _ = self.hangup.recv() => {
                    warn!("SIGHUP received, finishing");
                    handle.shutdown();
                }
                _ = self.interrupt.recv() => {
                    warn!("SIGINT received, finishing");
                    interrupted.store(true, Ordering::SeqCst);
                    handle.shutdown();
                }
                _ = self.reload.recv() => {
                    info!("SIGUSR1 received, reloading preferences");
                    if !handle.reload() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(not(unix))]
struct SignalForwarder;

#[cfg(not(unix))]
impl SignalForwarder {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn forward(self, handle: EngineHandle, interrupted: Arc<AtomicBool>) {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing");
            interrupted.store(true, Ordering::SeqCst);
            handle.shutdown();
        }
    }
}

//! Test doubles and common utilities for engine contract tests
//!
//! This module provides minimal test doubles that verify the
//! reconciliation contract without any network access.

#![allow(dead_code)]

use async_trait::async_trait;
use cfddns_core::config::{
    Credentials, LoggingSettings, RecordTarget, ServiceSettings, Settings,
};
use cfddns_core::engine::{DdnsEngine, EngineEvent, EngineHandle, RunMode, StopReason};
use cfddns_core::error::{Error, Result};
use cfddns_core::state::MemoryStateStore;
use cfddns_core::traits::{DnsProvider, DnsProviderFactory, IpSource, StateStore};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Interval used by daemon-mode tests
pub const TEST_INTERVAL: Duration = Duration::from_millis(40);

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Settings for `<name>.example.com` polled every [`TEST_INTERVAL`]
pub fn test_settings(name: &str) -> Settings {
    Settings {
        target: RecordTarget::new("example.com", name),
        credentials: Credentials::new("admin@example.com", "0123456789abcdef"),
        interval: TEST_INTERVAL,
        logging: LoggingSettings {
            file: PathBuf::from("/tmp/cloudflare-ddns-test.log"),
            level: tracing::Level::WARN,
        },
        service: ServiceSettings {
            pid_file: PathBuf::from("/tmp/cloudflare-ddns-test.pid"),
            key_file: PathBuf::from("/tmp/cloudflare-ddns-test.key"),
            ip_service: "https://v4.ident.me/".into(),
        },
    }
}

/// What a scripted call should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NotFound,
    Ambiguous,
    /// Transport failure or timeout
    Network,
    /// API answered `success=false`
    Rejected,
}

impl Outcome {
    fn into_result(self, what: &str) -> Result<()> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::NotFound => Err(Error::not_found(format!("no match for {}", what))),
            Outcome::Ambiguous => Err(Error::ambiguous(format!("several matches for {}", what))),
            Outcome::Network => Err(Error::network("operation timed out")),
            Outcome::Rejected => Err(Error::provider(
                "mock",
                "(1004) DNS Validation Error\n\t- (9021) Invalid content",
            )),
        }
    }
}

/// An IpSource answering from a script
///
/// Answers are consumed in order; the last one repeats forever.
#[derive(Clone)]
pub struct ScriptedIpSource {
    script: Arc<Mutex<VecDeque<Option<IpAddr>>>>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedIpSource {
    /// `None` entries time out
    pub fn new(script: Vec<Option<IpAddr>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answers `ip`
    pub fn fixed(ip: IpAddr) -> Self {
        Self::new(vec![Some(ip)])
    }

    /// Get the number of times current() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Replace the script
    pub fn answer(&self, script: Vec<Option<IpAddr>>) {
        *self.script.lock().unwrap() = script.into();
    }
}

#[async_trait]
impl IpSource for ScriptedIpSource {
    async fn current(&self) -> Result<IpAddr> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let mut script = self.script.lock().unwrap();
        let answer = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().copied().flatten()
        };

        answer.ok_or_else(|| Error::network("request to ip service timed out"))
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct CloudflareState {
    zone: Option<Outcome>,
    record: Option<Outcome>,
    published_ip: Option<IpAddr>,
    update_script: VecDeque<Outcome>,
    providers_created: usize,
    zone_lookups: usize,
    record_lookups: Vec<String>,
    updates: Vec<(String, IpAddr)>,
}

/// Shared state of a fake Cloudflare account
///
/// Providers built by [`MockCloudflare::factory`] all see the same account,
/// so counters survive a reload.
#[derive(Clone, Default)]
pub struct MockCloudflare {
    state: Arc<Mutex<CloudflareState>>,
}

impl MockCloudflare {
    /// An account whose record currently holds `ip`
    pub fn publishing(ip: IpAddr) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().published_ip = Some(ip);
        mock
    }

    /// An account whose record content cannot be read
    pub fn unreadable() -> Self {
        Self::default()
    }

    pub fn set_zone(&self, outcome: Outcome) {
        self.state.lock().unwrap().zone = Some(outcome);
    }

    pub fn set_record(&self, outcome: Outcome) {
        self.state.lock().unwrap().record = Some(outcome);
    }

    /// Outcomes for the next update calls, in order
    pub fn script_updates(&self, outcomes: &[Outcome]) {
        self.state
            .lock()
            .unwrap()
            .update_script
            .extend(outcomes.iter().copied());
    }

    pub fn published_ip(&self) -> Option<IpAddr> {
        self.state.lock().unwrap().published_ip
    }

    /// Every update attempt: (record name, ip)
    pub fn updates(&self) -> Vec<(String, IpAddr)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates.len()
    }

    pub fn zone_lookups(&self) -> usize {
        self.state.lock().unwrap().zone_lookups
    }

    /// Record names looked up, in order
    pub fn record_lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().record_lookups.clone()
    }

    pub fn providers_created(&self) -> usize {
        self.state.lock().unwrap().providers_created
    }

    pub fn factory(&self) -> Box<dyn DnsProviderFactory> {
        Box::new(MockFactory {
            account: self.clone(),
        })
    }
}

struct MockFactory {
    account: MockCloudflare,
}

impl DnsProviderFactory for MockFactory {
    fn create(&self, settings: &Settings) -> Result<Box<dyn DnsProvider>> {
        self.account.state.lock().unwrap().providers_created += 1;
        Ok(Box::new(MockDnsProvider {
            record_name: settings.target.fqdn(),
            domain: settings.target.domain.clone(),
            account: self.account.clone(),
        }))
    }
}

/// A mock DnsProvider bound to one record name
pub struct MockDnsProvider {
    record_name: String,
    domain: String,
    account: MockCloudflare,
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn resolve_zone(&self) -> Result<String> {
        let mut state = self.account.state.lock().unwrap();
        state.zone_lookups += 1;
        state.zone.unwrap_or(Outcome::Ok).into_result(&self.domain)?;
        Ok("zone-1".to_string())
    }

    async fn resolve_record(&self, zone_id: &str) -> Result<String> {
        let mut state = self.account.state.lock().unwrap();
        state.record_lookups.push(self.record_name.clone());
        state.record.unwrap_or(Outcome::Ok).into_result(&self.record_name)?;
        Ok(format!("{}/{}", zone_id, self.record_name))
    }

    async fn get_record_ip(&self, _zone_id: &str, _record_id: &str) -> Result<IpAddr> {
        self.account
            .state
            .lock()
            .unwrap()
            .published_ip
            .ok_or_else(|| Error::network("record read timed out"))
    }

    async fn update_record(&self, _zone_id: &str, _record_id: &str, new_ip: IpAddr) -> Result<()> {
        let mut state = self.account.state.lock().unwrap();
        state.updates.push((self.record_name.clone(), new_ip));

        let outcome = state.update_script.pop_front().unwrap_or(Outcome::Ok);
        outcome.into_result(&self.record_name)?;
        state.published_ip = Some(new_ip);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A MemoryStateStore that counts flushes and can refuse to persist
#[derive(Clone)]
pub struct CountingStateStore {
    inner: MemoryStateStore,
    flush_count: Arc<AtomicUsize>,
    persist_count: Arc<AtomicUsize>,
    fail_persist: Arc<AtomicBool>,
}

impl CountingStateStore {
    pub fn new(settings: Settings) -> Self {
        Self::wrap(MemoryStateStore::new(settings))
    }

    pub fn with_last_ip(settings: Settings, ip: IpAddr) -> Self {
        Self::wrap(MemoryStateStore::with_last_ip(settings, ip))
    }

    fn wrap(inner: MemoryStateStore) -> Self {
        Self {
            inner,
            flush_count: Arc::new(AtomicUsize::new(0)),
            persist_count: Arc::new(AtomicUsize::new(0)),
            fail_persist: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }

    pub fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::SeqCst)
    }

    pub fn fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub async fn stage_reload(&self, settings: Settings) {
        self.inner.stage_reload(settings).await;
    }
}

#[async_trait]
impl StateStore for CountingStateStore {
    async fn settings(&self) -> Result<Settings> {
        self.inner.settings().await
    }

    async fn last_ip(&self) -> Result<Option<IpAddr>> {
        self.inner.last_ip().await
    }

    async fn set_last_ip(&self, ip: IpAddr) -> Result<()> {
        self.persist_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(Error::state_store("disk full"));
        }
        self.inner.set_last_ip(ip).await
    }

    async fn reload(&self) -> Result<()> {
        self.inner.reload().await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        self.inner.flush().await
    }
}

/// A running engine under test
pub struct RunningEngine {
    pub handle: EngineHandle,
    pub task: JoinHandle<Result<StopReason>>,
    pub events: mpsc::Receiver<EngineEvent>,
}

impl RunningEngine {
    /// Request shutdown and wait for the engine to return
    pub async fn shutdown(self) -> (Result<StopReason>, Vec<EngineEvent>) {
        self.handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("engine stops promptly after shutdown")
            .expect("engine task does not panic");
        (result, drain(self.events))
    }
}

/// Spawn an engine on the current runtime
pub fn spawn_engine(
    ip_source: ScriptedIpSource,
    account: &MockCloudflare,
    store: Arc<dyn StateStore>,
    mode: RunMode,
) -> RunningEngine {
    let (engine, events) = DdnsEngine::new(Box::new(ip_source), account.factory(), store, mode);
    let (handle, control) = cfddns_core::control_channel();
    let task = tokio::spawn(async move { engine.run(control).await });

    RunningEngine {
        handle,
        task,
        events,
    }
}

/// Run a single cycle to completion
pub async fn run_once(
    ip_source: ScriptedIpSource,
    account: &MockCloudflare,
    store: Arc<dyn StateStore>,
) -> (Result<StopReason>, Vec<EngineEvent>) {
    let running = spawn_engine(ip_source, account, store, RunMode::SingleRun);
    let result = tokio::time::timeout(Duration::from_secs(2), running.task)
        .await
        .expect("single run finishes")
        .expect("engine task does not panic");
    (result, drain(running.events))
}

/// Collect every event currently queued
pub fn drain(mut events: mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Let the engine run for `cycles` intervals
pub async fn wait_cycles(cycles: u32) {
    tokio::time::sleep(TEST_INTERVAL * cycles + TEST_INTERVAL / 2).await;
}

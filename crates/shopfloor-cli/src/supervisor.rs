//! Fleet supervisor.
//!
//! Launches one `shopfloor serve` child process per enabled domain, waits
//! for each to report healthy, polls their health, restarts crashed
//! servers while monitoring, and stops them all on request.
//!
//! [`probe_fleet`] and [`stop_remote`] act on a fleet started by another
//! invocation. They find servers through the configured ports and read
//! each server's pid from its health report, so no state file is kept.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use shopfloor_core::{Error, Result, ServerDomain};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ServerSpec, ShopfloorConfig};
use crate::health::HealthProbe;

/// Lines of child stderr kept for startup failure reports.
const STDERR_TAIL_LINES: usize = 20;
/// How long to wait for a dead child's stderr to drain.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
/// Upper bound on the delay between restarts of one server.
const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);
/// Pause between probes while waiting for a remote server to go away.
const REMOTE_STOP_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Errors
// ============================================================================

/// Per-server supervisor failures.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exited during startup ({status}){}", stderr_suffix(.stderr))]
    EarlyExit { status: String, stderr: String },

    #[error("not healthy within {}ms", .0.as_millis())]
    StartupTimeout(Duration),

    #[error("health probe failed: {0}")]
    Probe(String),

    #[error("server on port {port} reports domain {found}, expected {expected}")]
    DomainMismatch {
        port: u16,
        expected: ServerDomain,
        found: ServerDomain,
    },

    #[error("cannot signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("; stderr:\n{stderr}")
    }
}

impl From<SupervisorError> for Error {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::StartupTimeout(after) => Error::timeout("server startup", after),
            other => Error::operation(other.to_string()),
        }
    }
}

// ============================================================================
// Records and reports
// ============================================================================

/// Last known state of a supervised server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Starting,
    Healthy,
    Unreachable,
    Stopped,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unreachable => "unreachable",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// One row of a status report.
#[derive(Clone, Debug, Serialize)]
pub struct StatusRow {
    pub domain: ServerDomain,
    pub port: u16,
    pub state: HealthState,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
    pub detail: Option<String>,
}

impl StatusRow {
    fn new(spec: ServerSpec, state: HealthState) -> Self {
        Self {
            domain: spec.domain,
            port: spec.port,
            state,
            pid: None,
            uptime_seconds: None,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Outcome of [`Supervisor::start_all`].
#[derive(Debug, Default)]
pub struct StartReport {
    /// Servers that reached healthy state.
    pub started: Vec<ServerSpec>,
    /// Servers that did not, with the reason.
    pub failures: Vec<(ServerDomain, SupervisorError)>,
}

impl StartReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Last lines a child wrote to stderr.
#[derive(Clone, Default)]
struct StderrTail(Arc<Mutex<VecDeque<String>>>);

impl StderrTail {
    /// Drain `stderr` in the background, forwarding lines to the log.
    fn capture(stderr: ChildStderr, domain: ServerDomain) -> (Self, JoinHandle<()>) {
        let tail = Self::default();
        let sink = tail.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("[{domain}] {line}");
                sink.push(line);
            }
        });
        (tail, reader)
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.0.lock() {
            if lines.len() == STDERR_TAIL_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    fn text(&self) -> String {
        self.0
            .lock()
            .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

/// A supervised child process.
pub struct ProcessRecord {
    spec: ServerSpec,
    child: Child,
    state: HealthState,
    started_at: DateTime<Utc>,
    restarts: u32,
    stderr: StderrTail,
    stderr_reader: Option<JoinHandle<()>>,
    backoff: ExponentialBackoff,
    /// Whether `backoff` has handed out a delay since it was last reset.
    backoff_used: bool,
    restart_at: Option<Instant>,
}

impl ProcessRecord {
    pub fn domain(&self) -> ServerDomain {
        self.spec.domain
    }

    pub fn port(&self) -> u16 {
        self.spec.port
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn uptime_seconds(&self) -> u64 {
        self.running_for().as_secs()
    }

    fn running_for(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    fn replace_child(&mut self, launched: Launched) {
        self.child = launched.child;
        self.stderr = launched.stderr;
        self.stderr_reader = launched.stderr_reader;
        self.started_at = Utc::now();
        self.state = HealthState::Starting;
    }

    /// Stderr of a child that has exited.
    async fn drained_stderr(&mut self) -> String {
        if let Some(reader) = self.stderr_reader.take() {
            let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, reader).await;
        }
        self.stderr.text()
    }
}

impl fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("domain", &self.spec.domain)
            .field("port", &self.spec.port)
            .field("pid", &self.child.id())
            .field("state", &self.state)
            .field("restarts", &self.restarts)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Everything the supervisor needs to launch and watch servers.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub program: PathBuf,
    pub program_args: Vec<String>,
    pub data_dir: PathBuf,
    pub host: String,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
    pub monitor_interval: Duration,
    pub restart_delay: Duration,
    /// Restarts allowed within one run of crashes.
    pub max_restarts: u32,
    /// A child that stays up this long gets a fresh restart budget.
    pub stable_after: Duration,
}

impl SupervisorSettings {
    /// Settings from a loaded configuration.
    pub fn from_config(config: &ShopfloorConfig) -> Result<Self> {
        let s = &config.supervisor;
        Ok(Self {
            program: config.server_program()?,
            program_args: s.server_args.clone(),
            data_dir: config.resolve_data_dir()?,
            host: config.host.clone(),
            startup_timeout: s.startup_timeout(),
            poll_interval: s.poll_interval(),
            stop_timeout: s.stop_timeout(),
            monitor_interval: s.monitor_interval(),
            restart_delay: s.restart_delay(),
            max_restarts: s.max_restarts,
            stable_after: s.stable_after(),
        })
    }

    fn restart_backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.restart_delay)
            .with_max_delay(MAX_RESTART_DELAY.max(self.restart_delay))
            .with_max_times(self.max_restarts as usize)
            .build()
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Owns the child processes of one fleet.
pub struct Supervisor {
    settings: SupervisorSettings,
    fleet: Vec<ServerSpec>,
    probe: Arc<dyn HealthProbe>,
    records: BTreeMap<ServerDomain, ProcessRecord>,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings, fleet: Vec<ServerSpec>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            settings,
            fleet,
            probe,
            records: BTreeMap::new(),
        }
    }

    /// Live records in fleet order.
    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Launch every server that is not already running and wait until each
    /// is healthy or the startup timeout elapses.
    ///
    /// Failures are reported per domain and not retried. A server that does
    /// not become healthy in time is killed.
    pub async fn start_all(&mut self) -> StartReport {
        let mut report = StartReport::default();

        for spec in self.fleet.clone() {
            if self.records.contains_key(&spec.domain) {
                continue;
            }
            let launched = ensure_port_free(&self.settings.host, spec.port)
                .and_then(|()| launch(&self.settings, spec));
            match launched {
                Ok(launched) => {
                    log::info!(
                        "Launched {} server on port {} (pid {})",
                        spec.domain,
                        spec.port,
                        launched.child.id().unwrap_or_default()
                    );
                    let record = ProcessRecord {
                        spec,
                        child: launched.child,
                        state: HealthState::Starting,
                        started_at: Utc::now(),
                        restarts: 0,
                        stderr: launched.stderr,
                        stderr_reader: launched.stderr_reader,
                        backoff: self.settings.restart_backoff(),
                        backoff_used: false,
                        restart_at: None,
                    };
                    self.records.insert(spec.domain, record);
                }
                Err(e) => {
                    log::error!("Cannot start {} server: {e}", spec.domain);
                    report.failures.push((spec.domain, e));
                }
            }
        }

        self.await_healthy(&mut report).await;
        report.started = self
            .records
            .values()
            .filter(|r| r.state == HealthState::Healthy)
            .map(|r| r.spec)
            .collect();
        report
    }

    async fn await_healthy(&mut self, report: &mut StartReport) {
        let deadline = Instant::now() + self.settings.startup_timeout;

        loop {
            self.reap_early_exits(report).await;

            let pending: Vec<ServerSpec> = self
                .records
                .values()
                .filter(|r| r.state == HealthState::Starting)
                .map(|r| r.spec)
                .collect();
            if pending.is_empty() {
                return;
            }

            let probes = pending
                .iter()
                .map(|spec| self.probe.probe(&self.settings.host, spec.port));
            let results = join_all(probes).await;
            for (spec, result) in pending.iter().zip(results) {
                if let (Ok(health), Some(record)) = (result, self.records.get_mut(&spec.domain)) {
                    if health.is_healthy() && health.domain == spec.domain {
                        log::info!("{} server is healthy", spec.domain);
                        record.state = HealthState::Healthy;
                    }
                }
            }

            if Instant::now() >= deadline {
                self.expire_starting(report).await;
                return;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn reap_early_exits(&mut self, report: &mut StartReport) {
        let mut exited = Vec::new();
        for record in self.records.values_mut() {
            if record.state != HealthState::Starting {
                continue;
            }
            if let Ok(Some(status)) = record.child.try_wait() {
                exited.push((record.spec.domain, status.to_string()));
            }
        }

        for (domain, status) in exited {
            if let Some(mut record) = self.records.remove(&domain) {
                let stderr = record.drained_stderr().await;
                log::error!("{domain} server exited during startup ({status})");
                report
                    .failures
                    .push((domain, SupervisorError::EarlyExit { status, stderr }));
            }
        }
    }

    async fn expire_starting(&mut self, report: &mut StartReport) {
        let expired: Vec<ServerDomain> = self
            .records
            .values()
            .filter(|r| r.state == HealthState::Starting)
            .map(|r| r.spec.domain)
            .collect();

        for domain in expired {
            if let Some(mut record) = self.records.remove(&domain) {
                log::error!("{domain} server did not become healthy in time");
                if let Err(e) = record.child.kill().await {
                    log::warn!("Cannot kill {domain} server: {e}");
                }
                report.failures.push((
                    domain,
                    SupervisorError::StartupTimeout(self.settings.startup_timeout),
                ));
            }
        }
    }

    /// Poll every record's health concurrently and update its state.
    pub async fn status(&mut self) -> Vec<StatusRow> {
        for record in self.records.values_mut() {
            if let Ok(Some(_)) = record.child.try_wait() {
                record.state = HealthState::Stopped;
            }
        }

        let live: Vec<ServerSpec> = self
            .records
            .values()
            .filter(|r| r.state != HealthState::Stopped)
            .map(|r| r.spec)
            .collect();
        let probes = live
            .iter()
            .map(|spec| self.probe.probe(&self.settings.host, spec.port));
        let results = join_all(probes).await;

        let mut details = BTreeMap::new();
        for (spec, result) in live.iter().zip(results) {
            let Some(record) = self.records.get_mut(&spec.domain) else {
                continue;
            };
            match result {
                Ok(health) if health.is_healthy() => record.state = HealthState::Healthy,
                Ok(health) => {
                    record.state = HealthState::Unreachable;
                    details.insert(spec.domain, health.status);
                }
                Err(e) if record.state == HealthState::Starting => {
                    details.insert(spec.domain, e.to_string());
                }
                Err(e) => {
                    record.state = HealthState::Unreachable;
                    details.insert(spec.domain, e.to_string());
                }
            }
        }

        self.records
            .values()
            .map(|record| {
                let mut row = StatusRow::new(record.spec, record.state);
                row.pid = record.pid();
                row.uptime_seconds = Some(record.uptime_seconds());
                row.detail = details.remove(&record.spec.domain);
                row
            })
            .collect()
    }

    /// SIGTERM every child, wait up to the stop timeout, then force kill.
    /// Leaves no records behind.
    pub async fn stop_all(&mut self) -> usize {
        let records = std::mem::take(&mut self.records);
        let count = records.len();
        let timeout = self.settings.stop_timeout;
        join_all(records.into_values().map(|r| stop_child(r, timeout))).await;
        count
    }

    /// Watch children until `shutdown` resolves, restarting crashed servers
    /// with exponential backoff up to the configured restart limit.
    ///
    /// The limit applies to consecutive crashes: a server that stays up for
    /// `stable_after` starts over with a full budget and the initial delay.
    ///
    /// Returns early when every server has been given up on.
    pub async fn monitor<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.settings.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    log::info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => self.check_children(),
            }
            if self.records.is_empty() {
                log::error!("Every server has stopped; nothing left to monitor");
                break;
            }
        }
    }

    fn check_children(&mut self) {
        let now = Instant::now();
        let settings = &self.settings;
        let mut given_up = Vec::new();

        for record in self.records.values_mut() {
            let domain = record.spec.domain;

            if let Some(at) = record.restart_at {
                if now < at {
                    continue;
                }
                record.restart_at = None;
                record.restarts += 1;
                match launch(settings, record.spec) {
                    Ok(launched) => {
                        log::info!("Restarted {domain} server (restart {})", record.restarts);
                        record.replace_child(launched);
                        continue;
                    }
                    Err(e) => log::error!("Cannot restart {domain} server: {e}"),
                }
            } else {
                match record.child.try_wait() {
                    Ok(Some(status)) => {
                        log::warn!("{domain} server exited ({status})");
                        if !record.stderr.text().is_empty() {
                            log::debug!("{domain} stderr:\n{}", record.stderr.text());
                        }
                    }
                    Ok(None) => {
                        if record.backoff_used && record.running_for() >= settings.stable_after {
                            log::info!("{domain} server is stable again; restart budget reset");
                            record.backoff = settings.restart_backoff();
                            record.backoff_used = false;
                        }
                        continue;
                    }
                    Err(e) => {
                        log::warn!("Cannot check {domain} server: {e}");
                        continue;
                    }
                }
            }

            record.state = HealthState::Stopped;
            record.backoff_used = true;
            match record.backoff.next() {
                Some(delay) => {
                    log::info!("Restarting {domain} server in {}ms", delay.as_millis());
                    record.restart_at = Some(now + delay);
                }
                None => {
                    log::error!(
                        "Giving up on {domain} server after {} restarts",
                        record.restarts
                    );
                    given_up.push(domain);
                }
            }
        }

        for domain in given_up {
            self.records.remove(&domain);
        }
    }
}

// ============================================================================
// Process helpers
// ============================================================================

struct Launched {
    child: Child,
    stderr: StderrTail,
    stderr_reader: Option<JoinHandle<()>>,
}

fn ensure_port_free(host: &str, port: u16) -> std::result::Result<(), SupervisorError> {
    TcpListener::bind((host, port))
        .map(drop)
        .map_err(|_| SupervisorError::PortInUse { port })
}

fn launch(settings: &SupervisorSettings, spec: ServerSpec) -> std::result::Result<Launched, SupervisorError> {
    let mut cmd = Command::new(&settings.program);
    cmd.args(&settings.program_args)
        .arg("--data-dir")
        .arg(&settings.data_dir)
        .arg("serve")
        .args(["--domain", spec.domain.as_str()])
        .args(["--port", &spec.port.to_string()])
        .args(["--host", &settings.host])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    // Own process group: a terminal Ctrl-C reaches only the supervisor,
    // which then stops the children in order.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        program: settings.program.display().to_string(),
        source,
    })?;

    let (stderr, stderr_reader) = match child.stderr.take() {
        Some(pipe) => {
            let (tail, reader) = StderrTail::capture(pipe, spec.domain);
            (tail, Some(reader))
        }
        None => (StderrTail::default(), None),
    };

    Ok(Launched {
        child,
        stderr,
        stderr_reader,
    })
}

async fn stop_child(mut record: ProcessRecord, timeout: Duration) {
    let domain = record.spec.domain;
    if let Ok(Some(_)) = record.child.try_wait() {
        return;
    }

    if let Some(pid) = record.child.id() {
        if let Err(e) = signal_pid(pid, false) {
            log::warn!("{domain}: {e}");
        }
    }

    match tokio::time::timeout(timeout, record.child.wait()).await {
        Ok(Ok(status)) => log::info!("Stopped {domain} server ({status})"),
        _ => {
            log::warn!("{domain} server did not stop in time; killing it");
            if let Err(e) = record.child.kill().await {
                log::warn!("Cannot kill {domain} server: {e}");
            }
        }
    }
}

#[cfg(unix)]
fn signal_pid(pid: u32, force: bool) -> std::result::Result<(), SupervisorError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        reason: "pid out of range".to_string(),
    })?;
    let signal = if force {
        Signal::SIGKILL
    } else {
        Signal::SIGTERM
    };
    kill(Pid::from_raw(raw), signal).map_err(|e| SupervisorError::Signal {
        pid,
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
fn signal_pid(pid: u32, _force: bool) -> std::result::Result<(), SupervisorError> {
    Err(SupervisorError::Signal {
        pid,
        reason: "process signals are not supported on this platform".to_string(),
    })
}

// ============================================================================
// Remote operations
// ============================================================================

/// Probe the configured ports of a fleet this process did not start.
pub async fn probe_fleet(probe: &dyn HealthProbe, host: &str, fleet: &[ServerSpec]) -> Vec<StatusRow> {
    let probes = fleet.iter().map(|spec| async move {
        match probe.probe(host, spec.port).await {
            Ok(health) if health.domain != spec.domain => {
                StatusRow::new(*spec, HealthState::Unreachable)
                    .with_detail(format!("port serves {}", health.domain))
            }
            Ok(health) => {
                let state = if health.is_healthy() {
                    HealthState::Healthy
                } else {
                    HealthState::Unreachable
                };
                let mut row = StatusRow::new(*spec, state);
                row.pid = Some(health.pid);
                row.uptime_seconds = Some(health.uptime_seconds);
                if !health.is_healthy() {
                    row.detail = Some(health.status);
                }
                row
            }
            Err(e) => StatusRow::new(*spec, HealthState::Unreachable).with_detail(e.to_string()),
        }
    });
    join_all(probes).await
}

/// Result of stopping one remote server.
#[derive(Debug)]
pub enum RemoteStop {
    /// The server was signalled and went away.
    Stopped { pid: u32 },
    /// Nothing answered on the port.
    NotRunning,
    /// The server could not be stopped.
    Failed(SupervisorError),
}

/// Stop the servers of a fleet started by another invocation.
///
/// Each server's pid comes from its own `/health` report; a port answering
/// for a different domain is left alone.
pub async fn stop_remote(
    probe: &dyn HealthProbe,
    host: &str,
    fleet: &[ServerSpec],
    timeout: Duration,
) -> Vec<(ServerSpec, RemoteStop)> {
    let stops = fleet.iter().map(|spec| async move {
        let outcome = stop_one_remote(probe, host, *spec, timeout).await;
        (*spec, outcome)
    });
    join_all(stops).await
}

async fn stop_one_remote(
    probe: &dyn HealthProbe,
    host: &str,
    spec: ServerSpec,
    timeout: Duration,
) -> RemoteStop {
    let health = match probe.probe(host, spec.port).await {
        Ok(health) => health,
        Err(_) => return RemoteStop::NotRunning,
    };
    if health.domain != spec.domain {
        return RemoteStop::Failed(SupervisorError::DomainMismatch {
            port: spec.port,
            expected: spec.domain,
            found: health.domain,
        });
    }

    let pid = health.pid;
    if let Err(e) = signal_pid(pid, false) {
        return RemoteStop::Failed(e);
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if probe.probe(host, spec.port).await.is_err() {
            return RemoteStop::Stopped { pid };
        }
        tokio::time::sleep(REMOTE_STOP_POLL).await;
    }

    log::warn!("{} server (pid {pid}) ignored SIGTERM; killing it", spec.domain);
    match signal_pid(pid, true) {
        Ok(()) => RemoteStop::Stopped { pid },
        Err(e) => RemoteStop::Failed(e),
    }
}

// ============================================================================
// Tests
// ============================================================================

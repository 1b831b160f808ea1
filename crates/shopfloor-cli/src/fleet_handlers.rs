//! Handler functions for fleet and server commands.
//!
//! These implement `start`, `--status`, `--stop`, `serve` and `check-data`.

use std::fmt::Write as _;
use std::sync::Arc;

use shopfloor_core::{Error, Result, ServerDomain};
use shopfloor_server::{ServerInstance, TransportMode, parse_host};
use shopfloor_store::{DataStore, IntegrityReport, check_references};

use crate::config::ShopfloorConfig;
use crate::health::HttpProbe;
use crate::supervisor::{
    HealthState, RemoteStop, StatusRow, Supervisor, SupervisorSettings, probe_fleet, stop_remote,
};

// ============================================================================
// Option types
// ============================================================================

/// Options for running a single server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub domain: ServerDomain,
    /// Port override; the configured port when unset.
    pub port: Option<u16>,
    /// Host override; the configured host when unset.
    pub host: Option<String>,
    pub stdio: bool,
}

// ============================================================================
// Fleet handlers
// ============================================================================

/// Launch the fleet, print its status and either return (`detach`) or
/// monitor it until Ctrl-C.
pub async fn handle_start(config: &ShopfloorConfig, detach: bool) -> Result<()> {
    config.validate()?;
    let fleet = config.fleet();
    if fleet.is_empty() {
        return Err(Error::config("No servers are enabled"));
    }

    let settings = SupervisorSettings::from_config(config)?;
    if !settings.data_dir.is_dir() {
        log::warn!(
            "Data directory {} does not exist; servers will report degraded",
            settings.data_dir.display()
        );
    }
    let probe = HttpProbe::new(config.supervisor.poll_timeout())?;

    log::info!(
        "Starting {} servers for {} (data: {})",
        fleet.len(),
        config.project_name,
        settings.data_dir.display()
    );
    let mut supervisor = Supervisor::new(settings, fleet, Arc::new(probe));
    let report = supervisor.start_all().await;

    print!("{}", format_status_table(&supervisor.status().await));
    for (domain, err) in &report.failures {
        eprintln!("{domain}: {err}");
    }

    if !report.is_success() {
        let stopped = supervisor.stop_all().await;
        log::info!("Stopped {stopped} servers after failed start");
        return Err(Error::operation(format!(
            "{} of {} servers failed to start",
            report.failures.len(),
            report.failures.len() + report.started.len()
        )));
    }

    if detach {
        println!("Fleet running; use `shopfloor --stop` to stop it.");
        return Ok(());
    }

    println!("Monitoring fleet; press Ctrl-C to stop.");
    supervisor.monitor(shutdown_signal()).await;
    if supervisor.is_empty() {
        return Err(Error::operation("Every server crashed past its restart limit"));
    }
    let stopped = supervisor.stop_all().await;
    println!("Stopped {stopped} servers.");
    Ok(())
}

/// Print the health of every configured server.
///
/// Fails when any server is not healthy.
pub async fn handle_status(config: &ShopfloorConfig) -> Result<()> {
    let probe = HttpProbe::new(config.supervisor.poll_timeout())?;
    let rows = probe_fleet(&probe, &config.host, &config.fleet()).await;
    print!("{}", format_status_table(&rows));

    let unhealthy = rows
        .iter()
        .filter(|r| r.state != HealthState::Healthy)
        .count();
    if unhealthy > 0 {
        return Err(Error::operation(format!(
            "{unhealthy} of {} servers are not healthy",
            rows.len()
        )));
    }
    Ok(())
}

/// Stop a fleet started by another invocation.
pub async fn handle_stop(config: &ShopfloorConfig) -> Result<()> {
    let probe = HttpProbe::new(config.supervisor.poll_timeout())?;
    let outcomes = stop_remote(
        &probe,
        &config.host,
        &config.fleet(),
        config.supervisor.stop_timeout(),
    )
    .await;

    let mut failed = 0;
    for (spec, outcome) in outcomes {
        match outcome {
            RemoteStop::Stopped { pid } => println!("{}: stopped (pid {pid})", spec.domain),
            RemoteStop::NotRunning => println!("{}: not running", spec.domain),
            RemoteStop::Failed(e) => {
                failed += 1;
                eprintln!("{}: {e}", spec.domain);
            }
        }
    }

    if failed > 0 {
        return Err(Error::operation(format!("{failed} servers could not be stopped")));
    }
    Ok(())
}

// ============================================================================
// Single-server handlers
// ============================================================================

/// Run one domain server in the foreground.
pub async fn handle_serve(config: &ShopfloorConfig, options: ServeOptions) -> Result<()> {
    let port = options
        .port
        .unwrap_or_else(|| config.servers.port(options.domain));
    let host = parse_host(options.host.as_deref().unwrap_or(&config.host))?;
    let transport = if options.stdio {
        TransportMode::Stdio
    } else {
        TransportMode::Http
    };

    let data_dir = config.resolve_data_dir()?;
    if !data_dir.is_dir() {
        log::warn!("Data directory {} does not exist", data_dir.display());
    }
    let store = Arc::new(DataStore::new(data_dir));
    let instance = ServerInstance::new(options.domain, store, port, transport)?;
    instance.run(host).await
}

/// Report dangling cross-document references.
///
/// Dangling references are warnings; only documents that cannot be loaded
/// fail the command.
pub async fn handle_check_data(config: &ShopfloorConfig, json: bool) -> Result<()> {
    let store = DataStore::new(config.resolve_data_dir()?);
    let report = check_references(&store).await;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::serialization(e.to_string()))?;
        println!("{out}");
    } else {
        print!("{}", format_integrity_report(&report));
    }

    if !report.errors.is_empty() {
        return Err(Error::operation(format!(
            "{} documents could not be checked",
            report.errors.len()
        )));
    }
    Ok(())
}

// ============================================================================
// Output formatting
// ============================================================================

fn format_status_table(rows: &[StatusRow]) -> String {
    let mut out = format!(
        "{:<12} {:>5}  {:<11} {:>7} {:>8}  {}\n",
        "DOMAIN", "PORT", "STATE", "PID", "UPTIME", "DETAIL"
    );
    for row in rows {
        let pid = row.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let uptime = row
            .uptime_seconds
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{:<12} {:>5}  {:<11} {:>7} {:>8}  {}",
            row.domain.as_str(),
            row.port,
            row.state.to_string(),
            pid,
            uptime,
            row.detail.as_deref().unwrap_or("")
        );
    }
    out
}

fn format_integrity_report(report: &IntegrityReport) -> String {
    let mut out = String::new();
    if report.is_consistent() {
        let _ = writeln!(out, "All {} references resolve.", report.checked);
        return out;
    }

    for issue in &report.errors {
        let _ = writeln!(out, "  ERROR [{}] {}: {}", issue.code, issue.location, issue.message);
    }
    for issue in &report.warnings {
        let _ = writeln!(out, "  WARN  [{}] {}: {}", issue.code, issue.location, issue.message);
    }
    let _ = writeln!(
        out,
        "Checked {} references: {} errors, {} warnings.",
        report.checked,
        report.errors.len(),
        report.warnings.len()
    );
    out
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("Cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

// ============================================================================
// Tests
// ============================================================================

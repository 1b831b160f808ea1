//! Configuration for the `shopfloor` CLI and fleet supervisor.
//!
//! Provides the [`ShopfloorConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `SHOPFLOOR_CONFIG` environment variable
//! 3. XDG default: `~/.config/shopfloor/config.toml`
//! 4. Built-in defaults
//!
//! `SHOPFLOOR_*` environment variables overlay top-level keys and the
//! `supervisor` section (e.g. `SHOPFLOOR_SUPERVISOR_MAX_RESTARTS=5`).

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use shopfloor_core::traits::DataSource;
use shopfloor_core::util::paths::{binary_path, find_dir_with_marker};
use shopfloor_core::{Error, Result, ServerDomain};
use std::path::PathBuf;
use std::time::Duration;

/// Marker used to find the sample data directory when none is configured.
const DATA_MARKER: &str = "data/factory";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopfloorConfig {
    /// Project name, reported in logs.
    pub project_name: String,

    /// Directory holding the domain documents.
    pub data_dir: Option<String>,

    /// Host address servers bind to and the supervisor probes.
    pub host: String,

    /// Supervisor timings and restart policy.
    pub supervisor: SupervisorConfig,

    /// Per-domain server settings.
    pub servers: ServersConfig,
}

/// Supervisor configuration. Durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long `start` waits for every server to report healthy.
    #[serde(deserialize_with = "lenient::number")]
    pub startup_timeout_ms: u64,

    /// Timeout of one health poll.
    #[serde(deserialize_with = "lenient::number")]
    pub poll_timeout_ms: u64,

    /// Pause between health polls while waiting for startup.
    #[serde(deserialize_with = "lenient::number")]
    pub poll_interval_ms: u64,

    /// Grace period between SIGTERM and a forced kill.
    #[serde(deserialize_with = "lenient::number")]
    pub stop_timeout_ms: u64,

    /// Pause between liveness checks while monitoring.
    #[serde(deserialize_with = "lenient::number")]
    pub monitor_interval_ms: u64,

    /// Initial restart delay; doubles with each restart of the same server.
    #[serde(deserialize_with = "lenient::number")]
    pub restart_delay_ms: u64,

    /// Restarts allowed per server before it is given up on.
    #[serde(deserialize_with = "lenient::number")]
    pub max_restarts: u32,

    /// Uptime after which a restarted server gets its restart budget back.
    #[serde(deserialize_with = "lenient::number")]
    pub stable_after_ms: u64,

    /// Program launched for each server (defaults to the running binary).
    pub server_program: Option<String>,

    /// Arguments placed before the `serve` command, e.g. for a wrapper.
    pub server_args: Vec<String>,
}

/// Settings for one domain server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEntry {
    /// Port; the domain's default port when unset.
    pub port: Option<u16>,

    /// Whether `start` launches this server.
    pub enabled: bool,
}

/// Settings for every domain server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServersConfig {
    pub maintenance: ServerEntry,
    pub business: ServerEntry,
    pub production: ServerEntry,
    pub workforce: ServerEntry,
    pub procedures: ServerEntry,
}

/// One server the supervisor manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSpec {
    pub domain: ServerDomain,
    pub port: u16,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for ShopfloorConfig {
    fn default() -> Self {
        Self {
            project_name: "shopfloor".to_string(),
            data_dir: None,
            host: "127.0.0.1".to_string(),
            supervisor: SupervisorConfig::default(),
            servers: ServersConfig::default(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 15_000,
            poll_timeout_ms: 2_000,
            poll_interval_ms: 250,
            stop_timeout_ms: 5_000,
            monitor_interval_ms: 2_000,
            restart_delay_ms: 1_000,
            max_restarts: 3,
            stable_after_ms: 300_000,
            server_program: None,
            server_args: Vec::new(),
        }
    }
}

impl Default for ServerEntry {
    fn default() -> Self {
        Self {
            port: None,
            enabled: true,
        }
    }
}

impl ServerEntry {
    fn with_port(port: u16) -> Self {
        Self {
            port: Some(port),
            enabled: true,
        }
    }
}

impl Default for ServersConfig {
    fn default() -> Self {
        let entry = |d: ServerDomain| ServerEntry::with_port(d.default_port());
        Self {
            maintenance: entry(ServerDomain::Maintenance),
            business: entry(ServerDomain::Business),
            production: entry(ServerDomain::Production),
            workforce: entry(ServerDomain::Workforce),
            procedures: entry(ServerDomain::Procedures),
        }
    }
}

impl ServersConfig {
    /// Settings for one domain.
    pub fn entry(&self, domain: ServerDomain) -> &ServerEntry {
        match domain {
            ServerDomain::Maintenance => &self.maintenance,
            ServerDomain::Business => &self.business,
            ServerDomain::Production => &self.production,
            ServerDomain::Workforce => &self.workforce,
            ServerDomain::Procedures => &self.procedures,
        }
    }

    /// Configured port of a domain.
    pub fn port(&self, domain: ServerDomain) -> u16 {
        self.entry(domain).port.unwrap_or_else(|| domain.default_port())
    }
}

impl SupervisorConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_millis(self.stable_after_ms)
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl ShopfloorConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("SHOPFLOOR");
        env_opts.add_section("supervisor");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("SHOPFLOOR_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("shopfloor").join("config.toml"))
    }

    /// Apply a `--data-dir` flag.
    pub fn with_data_dir(mut self, data_dir: Option<&str>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = Some(dir.to_string());
        }
        self
    }

    /// Absolute data directory.
    ///
    /// An unset `data_dir` resolves to the nearest `data/` directory that
    /// contains the factory model, walking up from the working directory,
    /// and finally to `./data`.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::config(format!("cannot determine working directory: {e}")))?;
        let dir = match &self.data_dir {
            Some(raw) => expand_path(raw)?,
            None => find_dir_with_marker(&cwd, DATA_MARKER)
                .unwrap_or_else(|| cwd.clone())
                .join("data"),
        };
        Ok(if dir.is_absolute() { dir } else { cwd.join(dir) })
    }

    /// Program the supervisor launches for each server.
    pub fn server_program(&self) -> Result<PathBuf> {
        match &self.supervisor.server_program {
            Some(raw) => expand_path(raw),
            None => binary_path()
                .ok_or_else(|| Error::config("cannot determine the running executable")),
        }
    }

    /// Enabled servers in fleet order.
    pub fn fleet(&self) -> Vec<ServerSpec> {
        ServerDomain::ALL
            .into_iter()
            .filter(|d| self.servers.entry(*d).enabled)
            .map(|domain| ServerSpec {
                domain,
                port: self.servers.port(domain),
            })
            .collect()
    }

    /// Check that enabled servers do not share a port.
    pub fn validate(&self) -> Result<()> {
        let fleet = self.fleet();
        for (i, a) in fleet.iter().enumerate() {
            if let Some(b) = fleet[i + 1..].iter().find(|b| b.port == a.port) {
                return Err(Error::config(format!(
                    "{} and {} are both configured for port {}",
                    a.domain, b.domain, a.port
                )));
            }
        }
        Ok(())
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Flatten this config into environment variable pairs with `SHOPFLOOR_` prefix.
    pub fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let value: toml::Value =
            toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut vars = Vec::new();
        flatten_toml_value(&value, "SHOPFLOOR", &mut vars);
        Ok(vars)
    }
}

// ============================================================================
// DataSource implementation
// ============================================================================

impl DataSource for ShopfloorConfig {
    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn data_dir(&self) -> Result<PathBuf> {
        self.resolve_data_dir()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand `~` and `$VARS` in a configured path.
fn expand_path(raw: &str) -> Result<PathBuf> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(|e| Error::config(format!("cannot expand path '{raw}': {e}")))
}

/// Recursively flatten a TOML value into `KEY=value` pairs.
fn flatten_toml_value(value: &toml::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let env_key = format!("{}_{}", prefix, key.to_uppercase());
                flatten_toml_value(val, &env_key, out);
            }
        }
        toml::Value::Array(arr) => {
            if let Ok(json) = serde_json::to_string(arr) {
                out.push((prefix.to_string(), json));
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        toml::Value::Integer(i) => out.push((prefix.to_string(), i.to_string())),
        toml::Value::Float(f) => out.push((prefix.to_string(), f.to_string())),
        toml::Value::Boolean(b) => out.push((prefix.to_string(), b.to_string())),
        toml::Value::Datetime(dt) => out.push((prefix.to_string(), dt.to_string())),
    }
}

/// Environment overlays arrive as strings; accept those for numeric fields.
mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Deserialize<'de>,
        T::Err: Display,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Value(T),
            Text(String),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Value(v) => Ok(v),
            Raw::Text(s) => s.trim().parse().map_err(D::Error::custom),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

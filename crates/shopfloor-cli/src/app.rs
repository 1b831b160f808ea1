//! Shopfloor CLI application.
//!
//! Loads configuration, initialises logging and dispatches parsed
//! arguments to the command handlers.

use crate::cli::{CliArgs, Command};
use crate::config::ShopfloorConfig;
use crate::config_handlers;
use crate::fleet_handlers::{self, ServeOptions};
use shopfloor_core::Result;
use tracing_subscriber::EnvFilter;

/// Initialise tracing-based logging on stderr.
///
/// Uses `RUST_LOG` if set, otherwise defaults based on verbosity flags.
/// `log` records from the library crates are forwarded to the subscriber.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Ignore error if a subscriber is already set (e.g. in tests).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the CLI with the given arguments.
pub async fn run(args: CliArgs) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    // Config commands take the raw path: `init` must work without a file.
    let command = match args.command {
        Some(Command::Config(config_cmd)) => {
            return config_handlers::handle_config_command(
                args.config.as_deref(),
                config_cmd.command,
            );
        }
        Some(Command::Version) => {
            println!("shopfloor {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        other => other,
    };

    let config =
        ShopfloorConfig::load(args.config.as_deref())?.with_data_dir(args.data_dir.as_deref());

    if args.status {
        return fleet_handlers::handle_status(&config).await;
    }
    if args.stop {
        return fleet_handlers::handle_stop(&config).await;
    }

    match command {
        None => fleet_handlers::handle_start(&config, false).await,
        Some(Command::Start { detach }) => fleet_handlers::handle_start(&config, detach).await,
        Some(Command::Serve {
            domain,
            port,
            host,
            stdio,
        }) => {
            let options = ServeOptions {
                domain,
                port,
                host,
                stdio,
            };
            fleet_handlers::handle_serve(&config, options).await
        }
        Some(Command::CheckData { json }) => {
            fleet_handlers::handle_check_data(&config, json).await
        }
        Some(Command::Config(_)) | Some(Command::Version) => Ok(()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn test_run_version_command() {
        let args = CliArgs::parse_from(["shopfloor", "version"]);
        assert!(run(args).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_config_init() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let args = CliArgs::parse_from([
            "shopfloor",
            "config",
            "init",
            "--file",
            path.to_str().unwrap(),
        ]);
        assert!(run(args).await.is_ok());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_run_check_data() {
        let dir = shopfloor_store::fixtures::fixture_dir().unwrap();
        let args = CliArgs::parse_from([
            "shopfloor",
            "--config",
            "/nonexistent/shopfloor.toml",
            "--data-dir",
            dir.path().to_str().unwrap(),
            "check-data",
        ]);
        assert!(run(args).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_bad_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[supervisor]\nmax_restarts = \"many\"\n").unwrap();
        let args = CliArgs::parse_from(["shopfloor", "--config", path.to_str().unwrap(), "check-data"]);
        assert!(run(args).await.is_err());
    }
}

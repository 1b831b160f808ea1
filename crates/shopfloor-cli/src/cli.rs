//! CLI argument parsing and command definitions.
//!
//! With no subcommand, `shopfloor` starts the configured fleet in the
//! foreground. `--status` and `--stop` act on a fleet started by another
//! invocation.

use clap::{Parser, Subcommand};
use shopfloor_core::ServerDomain;

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "shopfloor", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "SHOPFLOOR_CONFIG")]
    pub config: Option<String>,

    /// Directory holding the domain documents.
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Show the health of every configured server and exit.
    #[arg(long, conflicts_with = "stop")]
    pub status: bool,

    /// Stop every running server of the configured fleet and exit.
    #[arg(long)]
    pub stop: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch every enabled server and monitor them until Ctrl-C.
    Start {
        /// Exit once the fleet is healthy, leaving the servers running.
        #[arg(long)]
        detach: bool,
    },

    /// Run a single domain server.
    Serve {
        /// Domain to serve.
        #[arg(short, long)]
        domain: ServerDomain,

        /// Port to listen on (defaults to the configured port).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host address to bind to (defaults to the configured host).
        #[arg(long)]
        host: Option<String>,

        /// Serve newline-delimited requests on stdin/stdout instead of HTTP.
        #[arg(long)]
        stdio: bool,
    },

    /// Report dangling cross-document references in the data directory.
    CheckData {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration operations.
    Config(ConfigCommand),

    /// Print version information.
    Version,
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "servers.maintenance.port").
        key: String,
    },

    /// Set a configuration value by dotted key.
    Set {
        /// Dotted key (e.g., "supervisor.max_restarts").
        key: String,

        /// Value to set.
        value: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },

    /// Export configuration as environment variables.
    Export {
        /// Format as Docker --env flags.
        #[arg(long)]
        docker_env: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::try_parse_from(["shopfloor"]).unwrap();
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(!args.status);
        assert!(!args.stop);
        assert!(args.data_dir.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_status_and_stop_conflict() {
        assert!(CliArgs::try_parse_from(["shopfloor", "--status", "--stop"]).is_err());
        let args = CliArgs::try_parse_from(["shopfloor", "--stop"]).unwrap();
        assert!(args.stop);
    }

    #[test]
    fn test_start_command() {
        let args = CliArgs::try_parse_from(["shopfloor", "start", "--detach"]).unwrap();
        assert!(matches!(args.command, Some(Command::Start { detach: true })));
    }

    #[test]
    fn test_serve_command() {
        let args = CliArgs::try_parse_from([
            "shopfloor",
            "--data-dir",
            "/srv/plant",
            "serve",
            "--domain",
            "workforce",
            "--port",
            "9104",
        ])
        .unwrap();
        assert_eq!(args.data_dir.as_deref(), Some("/srv/plant"));
        match args.command {
            Some(Command::Serve {
                domain,
                port,
                host,
                stdio,
            }) => {
                assert_eq!(domain, ServerDomain::Workforce);
                assert_eq!(port, Some(9104));
                assert!(host.is_none());
                assert!(!stdio);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_stdio() {
        let args =
            CliArgs::try_parse_from(["shopfloor", "serve", "-d", "procedures", "--stdio"]).unwrap();
        match args.command {
            Some(Command::Serve { domain, stdio, .. }) => {
                assert_eq!(domain, ServerDomain::Procedures);
                assert!(stdio);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_rejects_unknown_domain() {
        assert!(CliArgs::try_parse_from(["shopfloor", "serve", "--domain", "payroll"]).is_err());
    }

    #[test]
    fn test_check_data_command() {
        let args = CliArgs::try_parse_from(["shopfloor", "check-data", "--json"]).unwrap();
        assert!(matches!(args.command, Some(Command::CheckData { json: true })));
    }

    #[test]
    fn test_config_set_command() {
        let args = CliArgs::try_parse_from([
            "shopfloor",
            "config",
            "set",
            "supervisor.max_restarts",
            "5",
        ])
        .unwrap();
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Set { key, value },
            })) => {
                assert_eq!(key, "supervisor.max_restarts");
                assert_eq!(value, "5");
            }
            _ => panic!("Expected Config Set command"),
        }
    }

    #[test]
    fn test_config_init_command() {
        let args = CliArgs::try_parse_from(["shopfloor", "config", "init", "--force"]).unwrap();
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Init { file, force },
            })) => {
                assert!(file.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_version_command() {
        let args = CliArgs::try_parse_from(["shopfloor", "version"]).unwrap();
        assert!(matches!(args.command, Some(Command::Version)));
    }
}

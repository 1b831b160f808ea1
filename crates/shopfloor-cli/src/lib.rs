//! Command-line interface and fleet supervisor for Shopfloor.
//!
//! The `shopfloor` binary runs single domain servers (`serve`) and
//! supervises the whole fleet (`start`, `--status`, `--stop`).
//!
//! # Modules
//!
//! - [`cli`]: clap argument types
//! - [`config`]: layered [`ShopfloorConfig`](config::ShopfloorConfig)
//! - [`supervisor`]: child process lifecycle and restart policy
//! - [`health`]: `/health` probing

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod fleet_handlers;
pub mod health;
pub mod supervisor;

pub use app::run;
pub use cli::CliArgs;
pub use config::ShopfloorConfig;
pub use supervisor::{HealthState, Supervisor, SupervisorError, SupervisorSettings};

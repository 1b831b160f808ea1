//! Utility modules.
//!
//! # Modules
//!
//! - [`paths`]: Path resolution helpers (binary location, tilde expansion, marker search)

pub mod paths;

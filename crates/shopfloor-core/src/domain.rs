//! The fixed set of server domains.
//!
//! Each domain is served by one process with its own tool catalog and
//! default port. The set is closed: adding a domain means adding a variant
//! here and a catalog in `shopfloor-tools`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A manufacturing subsystem area served by one tool server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerDomain {
    /// Computerized maintenance management (work orders, history, spares).
    Maintenance,
    /// Enterprise resource planning (customers, sales orders, products).
    Business,
    /// Manufacturing execution (machines, production orders, quality).
    Production,
    /// Workforce planning (employees, skills, shifts, assignments).
    Workforce,
    /// Standard operating procedures.
    Procedures,
}

impl ServerDomain {
    /// All domains in fleet order.
    pub const ALL: [ServerDomain; 5] = [
        Self::Maintenance,
        Self::Business,
        Self::Production,
        Self::Workforce,
        Self::Procedures,
    ];

    /// Machine name used on the CLI, in config keys and in `/info`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Business => "business",
            Self::Production => "production",
            Self::Workforce => "workforce",
            Self::Procedures => "procedures",
        }
    }

    /// Human-readable server name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Maintenance => "CMMS Server",
            Self::Business => "ERP Server",
            Self::Production => "MES Server",
            Self::Workforce => "WPMS Server",
            Self::Procedures => "SOP Server",
        }
    }

    /// One-line description reported by `/info`.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Maintenance => "Computerized Maintenance Management System",
            Self::Business => "Enterprise Resource Planning",
            Self::Production => "Manufacturing Execution System",
            Self::Workforce => "Workforce Planning and Management System",
            Self::Procedures => "Standard Operating Procedures",
        }
    }

    /// Port the domain listens on unless configured otherwise.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Maintenance => 8001,
            Self::Business => 8002,
            Self::Production => 8003,
            Self::Workforce => 8004,
            Self::Procedures => 8005,
        }
    }

    /// Tool catalog version reported by `/info`.
    pub fn catalog_version(&self) -> &'static str {
        "2.0.0"
    }
}

impl fmt::Display for ServerDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerDomain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maintenance" | "cmms" => Ok(Self::Maintenance),
            "business" | "erp" => Ok(Self::Business),
            "production" | "mes" => Ok(Self::Production),
            "workforce" | "wpms" => Ok(Self::Workforce),
            "procedures" | "sop" => Ok(Self::Procedures),
            other => Err(Error::validation(format!(
                "unknown domain '{other}' (expected one of: maintenance, business, production, workforce, procedures)"
            ))),
        }
    }
}

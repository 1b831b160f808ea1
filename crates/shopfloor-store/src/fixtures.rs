//! Sample plant documents for tests.
//!
//! Enabled by the `test-utils` feature. The documents are the same ones
//! shipped under the workspace `data/` directory, so tests and local runs
//! see identical data (machine `GB001` has maintenance history, `ZZ999`
//! exists nowhere).

use std::path::Path;

use shopfloor_core::{Error, Result};
use tempfile::TempDir;

use crate::document::DocumentKind;

/// Shared factory model.
pub const FACTORY: &str = include_str!("../../../data/factory/factory_model.json");
/// Maintenance document.
pub const MAINTENANCE: &str = include_str!("../../../data/cmms/maintenance_data.json");
/// Business document.
pub const BUSINESS: &str = include_str!("../../../data/erp/business_data.json");
/// Production document.
pub const PRODUCTION: &str = include_str!("../../../data/mes/production_data.json");
/// Workforce document.
pub const WORKFORCE: &str = include_str!("../../../data/wpms/workforce_data.json");
/// Procedures document.
pub const PROCEDURES: &str = include_str!("../../../data/sop/procedures.json");

/// Fixture text for a document kind.
pub fn fixture(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Factory => FACTORY,
        DocumentKind::Maintenance => MAINTENANCE,
        DocumentKind::Business => BUSINESS,
        DocumentKind::Production => PRODUCTION,
        DocumentKind::Workforce => WORKFORCE,
        DocumentKind::Procedures => PROCEDURES,
    }
}

/// Write every fixture document under `dir`.
pub fn write_fixture_documents(dir: &Path) -> Result<()> {
    for kind in DocumentKind::ALL {
        write_document(dir, kind, fixture(kind))?;
    }
    Ok(())
}

/// Write (or overwrite) one document under `dir`.
pub fn write_document(dir: &Path, kind: DocumentKind, content: &str) -> Result<()> {
    let path = dir.join(kind.relative_path());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }
    std::fs::write(&path, content).map_err(|e| Error::io_with_path(e, &path))
}

/// A temporary data directory populated with every fixture document.
pub fn fixture_dir() -> Result<TempDir> {
    let dir = TempDir::new()?;
    write_fixture_documents(dir.path())?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MACHINES;
    use crate::integrity::check_references;
    use crate::store::DataStore;

    #[test]
    fn test_fixtures_parse() {
        for kind in DocumentKind::ALL {
            let parsed: serde_json::Value = serde_json::from_str(fixture(kind)).unwrap();
            assert!(parsed.get("data").is_some(), "{kind} fixture lacks data");
        }
    }

    #[tokio::test]
    async fn test_fixture_dir_is_loadable() {
        let dir = fixture_dir().unwrap();
        let store = DataStore::new(dir.path().to_path_buf());
        assert!(store.exists(&MACHINES, "GB001").await.unwrap());
        assert!(!store.exists(&MACHINES, "ZZ999").await.unwrap());
    }

    #[tokio::test]
    async fn test_fixtures_are_consistent() {
        let dir = fixture_dir().unwrap();
        let store = DataStore::new(dir.path().to_path_buf());
        let report = check_references(&store).await;
        assert!(report.is_consistent(), "{:?}", report.warnings);
        assert!(report.checked > 20);
    }
}

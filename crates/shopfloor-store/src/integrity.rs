//! Cross-document reference checking.
//!
//! Documents are loaded independently and a dangling identifier never stops
//! a server from starting. This module reports such identifiers so data
//! authors can fix them; it is surfaced by `shopfloor check-data`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{
    CUSTOMERS, Collection, EMPLOYEE_SKILLS, EMPLOYEES, MACHINE_ASSIGNMENTS, MACHINE_CRITICALITY,
    MACHINES, MAINTENANCE_HISTORY, MAINTENANCE_SCHEDULES, MAINTENANCE_WORK_ORDERS, PRODUCTS,
    PRODUCTION_MACHINES, PRODUCTION_WORK_ORDERS, QUALITY_METRICS, SALES_ORDERS, SHIFT_SCHEDULES,
    SPARE_PARTS_USAGE, TRAINING_RECORDS,
};
use crate::store::DataStore;

// ============================================================================
// Types
// ============================================================================

/// A foreign-key style relation between two collections.
#[derive(Clone, Copy, Debug)]
pub struct ReferenceRule {
    /// Collection holding the reference.
    pub source: Collection,
    /// Field carrying the referenced id.
    pub field: &'static str,
    /// Collection the id must exist in.
    pub target: Collection,
}

const fn rule(source: Collection, field: &'static str, target: Collection) -> ReferenceRule {
    ReferenceRule {
        source,
        field,
        target,
    }
}

/// Every cross-document relation the domain documents are expected to honour.
pub const REFERENCE_RULES: &[ReferenceRule] = &[
    rule(MAINTENANCE_WORK_ORDERS, "machine_id", MACHINES),
    rule(MAINTENANCE_HISTORY, "machine_id", MACHINES),
    rule(MAINTENANCE_SCHEDULES, "machine_id", MACHINES),
    rule(SPARE_PARTS_USAGE, "machine_id", MACHINES),
    rule(SALES_ORDERS, "customer_id", CUSTOMERS),
    rule(SALES_ORDERS, "product_id", PRODUCTS),
    rule(PRODUCTION_MACHINES, "machine_id", MACHINES),
    rule(MACHINE_CRITICALITY, "machine_id", MACHINES),
    rule(PRODUCTION_WORK_ORDERS, "machine_id", MACHINES),
    rule(PRODUCTION_WORK_ORDERS, "product_id", PRODUCTS),
    rule(QUALITY_METRICS, "machine_id", MACHINES),
    rule(EMPLOYEE_SKILLS, "employee_id", EMPLOYEES),
    rule(EMPLOYEE_SKILLS, "machine_id", MACHINES),
    rule(MACHINE_ASSIGNMENTS, "employee_id", EMPLOYEES),
    rule(MACHINE_ASSIGNMENTS, "machine_id", MACHINES),
    rule(SHIFT_SCHEDULES, "employee_id", EMPLOYEES),
    rule(TRAINING_RECORDS, "employee_id", EMPLOYEES),
];

/// Outcome of a reference check.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Number of references examined.
    pub checked: usize,
    /// Documents that could not be loaded.
    pub errors: Vec<IntegrityIssue>,
    /// Dangling references.
    pub warnings: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// Whether every document loaded and every reference resolved.
    pub fn is_consistent(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Total issue count.
    pub fn total_issues(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }
}

/// One finding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    /// Issue code (`dangling_reference`, `document_unavailable`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Where the issue was found (`maintenance.work_orders[3].machine_id`).
    pub location: String,
}

impl IntegrityIssue {
    fn new(code: &str, message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            location: location.into(),
        }
    }
}

// ============================================================================
// Checking
// ============================================================================

/// Check every rule in [`REFERENCE_RULES`] against the store.
///
/// Missing or null reference fields are not reported. A document that fails
/// to load is reported once and the rules touching it are skipped.
pub async fn check_references(store: &DataStore) -> IntegrityReport {
    check_rules(store, REFERENCE_RULES).await
}

/// Check an explicit rule set.
pub async fn check_rules(store: &DataStore, rules: &[ReferenceRule]) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    let mut ids: HashMap<Collection, Option<HashSet<String>>> = HashMap::new();
    let mut reported = HashSet::new();

    for rule in rules {
        for collection in [rule.target, rule.source] {
            if ids.contains_key(&collection) {
                continue;
            }
            let loaded = match store.all(&collection).await {
                Ok(entities) => Some(
                    entities
                        .iter()
                        .filter_map(|e| collection.id_of(e).map(str::to_string))
                        .collect(),
                ),
                Err(err) => {
                    if reported.insert(collection.document) {
                        report.errors.push(IntegrityIssue::new(
                            "document_unavailable",
                            err.to_string(),
                            collection.document.as_str(),
                        ));
                    }
                    None
                }
            };
            ids.insert(collection, loaded);
        }

        let Some(Some(targets)) = ids.get(&rule.target) else {
            continue;
        };
        let Ok(sources) = store.all(&rule.source).await else {
            continue;
        };

        for (index, entity) in sources.iter().enumerate() {
            let Some(value) = entity.get(rule.field).and_then(Value::as_str) else {
                continue;
            };
            report.checked += 1;
            if !targets.contains(value) {
                report.warnings.push(IntegrityIssue::new(
                    "dangling_reference",
                    format!("{} '{value}' is not in {}", rule.target.entity, rule.target),
                    format!("{}[{index}].{}", rule.source, rule.field),
                ));
            }
        }
    }

    log::debug!(
        "Reference check: {} checked, {} warnings, {} errors",
        report.checked,
        report.warnings.len(),
        report.errors.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentKind;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, kind: DocumentKind, content: &str) {
        let path = dir.join(kind.relative_path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_dangling_reference_reported() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            DocumentKind::Factory,
            r#"{"data": {"machines": [{"machine_id": "GB001"}]}}"#,
        );
        write(
            dir.path(),
            DocumentKind::Maintenance,
            r#"{"data": {"work_orders": [
                {"workorder_id": "WO-1", "machine_id": "GB001"},
                {"workorder_id": "WO-2", "machine_id": "XX404"},
                {"workorder_id": "WO-3", "machine_id": null}
            ]}}"#,
        );
        let store = DataStore::new(dir.path().to_path_buf());
        let report = check_rules(&store, &[rule(MAINTENANCE_WORK_ORDERS, "machine_id", MACHINES)]).await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, "dangling_reference");
        assert_eq!(report.warnings[0].location, "maintenance.work_orders[1].machine_id");
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_document_reported_once() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            DocumentKind::Factory,
            r#"{"data": {"machines": []}}"#,
        );
        let store = DataStore::new(dir.path().to_path_buf());
        let report = check_rules(
            &store,
            &[
                rule(MAINTENANCE_WORK_ORDERS, "machine_id", MACHINES),
                rule(MAINTENANCE_HISTORY, "machine_id", MACHINES),
            ],
        )
        .await;

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].location, "maintenance");
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn test_consistent_documents() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            DocumentKind::Workforce,
            r#"{"data": {
                "employees": [{"employee_id": "E001"}],
                "training_records": [{"record_id": "T1", "employee_id": "E001"}]
            }}"#,
        );
        let store = DataStore::new(dir.path().to_path_buf());
        let report = check_rules(&store, &[rule(TRAINING_RECORDS, "employee_id", EMPLOYEES)]).await;
        assert!(report.is_consistent());
        assert_eq!(report.checked, 1);
        assert_eq!(report.total_issues(), 0);
    }
}

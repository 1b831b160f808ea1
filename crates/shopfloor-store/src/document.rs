//! Document kinds and collection descriptors.
//!
//! Every domain document is a JSON file whose collections live under a
//! top-level `"data"` object. A [`Collection`] names one of those arrays
//! together with the document it lives in and the field that identifies
//! its entities.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shopfloor_core::{Error, Result};
use std::fmt;

/// One JSON document on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Maintenance work orders, history, schedules, spare parts.
    Maintenance,
    /// Customers and sales orders.
    Business,
    /// Production machines, orders, quality and criticality.
    Production,
    /// Employees, skills, shifts, assignments, training.
    Workforce,
    /// Shared factory model: machines, work centers, products, management.
    Factory,
    /// Standard operating procedures.
    Procedures,
}

impl DocumentKind {
    /// All document kinds.
    pub const ALL: [DocumentKind; 6] = [
        Self::Maintenance,
        Self::Business,
        Self::Production,
        Self::Workforce,
        Self::Factory,
        Self::Procedures,
    ];

    /// Path of the document relative to the data directory.
    pub fn relative_path(&self) -> &'static str {
        match self {
            Self::Maintenance => "cmms/maintenance_data.json",
            Self::Business => "erp/business_data.json",
            Self::Production => "mes/production_data.json",
            Self::Workforce => "wpms/workforce_data.json",
            Self::Factory => "factory/factory_model.json",
            Self::Procedures => "sop/procedures.json",
        }
    }

    /// Short name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Business => "business",
            Self::Production => "production",
            Self::Workforce => "workforce",
            Self::Factory => "factory",
            Self::Procedures => "procedures",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named array inside a document, with its identifier field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Collection {
    /// Document holding the collection.
    pub document: DocumentKind,
    /// Key under `data`.
    pub name: &'static str,
    /// Field that identifies an entity.
    pub id_field: &'static str,
    /// Singular entity label for messages ("machine", "employee").
    pub entity: &'static str,
}

impl Collection {
    const fn new(
        document: DocumentKind,
        name: &'static str,
        id_field: &'static str,
        entity: &'static str,
    ) -> Self {
        Self {
            document,
            name,
            id_field,
            entity,
        }
    }

    /// Identifier of an entity in this collection, if it carries one.
    pub fn id_of<'a>(&self, entity: &'a Value) -> Option<&'a str> {
        entity.get(self.id_field).and_then(Value::as_str)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.document, self.name)
    }
}

// -- Factory model ----------------------------------------------------------

/// Machines in the shared factory model.
pub const MACHINES: Collection = Collection::new(DocumentKind::Factory, "machines", "machine_id", "machine");
/// Work centers in the shared factory model.
pub const WORK_CENTERS: Collection =
    Collection::new(DocumentKind::Factory, "work_centers", "work_center_id", "work center");
/// Products in the shared factory model.
pub const PRODUCTS: Collection = Collection::new(DocumentKind::Factory, "products", "id", "product");

// -- Maintenance ------------------------------------------------------------

/// Maintenance work orders.
pub const MAINTENANCE_WORK_ORDERS: Collection =
    Collection::new(DocumentKind::Maintenance, "work_orders", "workorder_id", "work order");
/// Completed maintenance events.
pub const MAINTENANCE_HISTORY: Collection =
    Collection::new(DocumentKind::Maintenance, "maintenance_history", "event_id", "maintenance event");
/// Planned maintenance schedules.
pub const MAINTENANCE_SCHEDULES: Collection =
    Collection::new(DocumentKind::Maintenance, "maintenance_schedules", "schedule_id", "schedule");
/// Spare parts consumption records.
pub const SPARE_PARTS_USAGE: Collection =
    Collection::new(DocumentKind::Maintenance, "spare_parts_usage", "usage_id", "spare part usage");

// -- Business ---------------------------------------------------------------

/// Customers.
pub const CUSTOMERS: Collection = Collection::new(DocumentKind::Business, "customers", "customer_id", "customer");
/// Sales orders.
pub const SALES_ORDERS: Collection = Collection::new(DocumentKind::Business, "sales_orders", "order_id", "sales order");

// -- Production -------------------------------------------------------------

/// Machine runtime records kept by the execution system.
pub const PRODUCTION_MACHINES: Collection =
    Collection::new(DocumentKind::Production, "machines", "machine_id", "machine");
/// Work centers as seen by the execution system.
pub const PRODUCTION_WORK_CENTERS: Collection =
    Collection::new(DocumentKind::Production, "work_centers", "work_center_id", "work center");
/// Machine criticality ratings.
pub const MACHINE_CRITICALITY: Collection =
    Collection::new(DocumentKind::Production, "machine_criticality", "machine_id", "criticality rating");
/// Production work orders.
pub const PRODUCTION_WORK_ORDERS: Collection =
    Collection::new(DocumentKind::Production, "work_orders", "order_id", "production order");
/// Per-machine quality metrics.
pub const QUALITY_METRICS: Collection =
    Collection::new(DocumentKind::Production, "quality_metrics", "metric_id", "quality metric");

// -- Workforce --------------------------------------------------------------

/// Employees.
pub const EMPLOYEES: Collection = Collection::new(DocumentKind::Workforce, "employees", "employee_id", "employee");
/// Employee skill ratings per machine.
pub const EMPLOYEE_SKILLS: Collection =
    Collection::new(DocumentKind::Workforce, "employee_skills", "skill_id", "skill");
/// Machine assignments.
pub const MACHINE_ASSIGNMENTS: Collection =
    Collection::new(DocumentKind::Workforce, "machine_assignments", "assignment_id", "assignment");
/// Shift schedules.
pub const SHIFT_SCHEDULES: Collection =
    Collection::new(DocumentKind::Workforce, "shift_schedules", "schedule_id", "shift schedule");
/// Training records.
pub const TRAINING_RECORDS: Collection =
    Collection::new(DocumentKind::Workforce, "training_records", "record_id", "training record");

// -- Procedures -------------------------------------------------------------

/// Standard operating procedures.
pub const SOPS: Collection = Collection::new(DocumentKind::Procedures, "sops", "document_id", "SOP");

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

/// The object holding a document's collections.
///
/// Documents wrap their content in `{"data": {...}}`; a document without a
/// `data` object is its own data root.
pub fn data_root(document: &Value) -> &Value {
    match document.get("data") {
        Some(data @ Value::Object(_)) => data,
        _ => document,
    }
}

/// Entities of a collection, empty when the key is absent or not an array.
pub fn entities<'a>(document: &'a Value, name: &str) -> &'a [Value] {
    data_root(document)
        .get(name)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// A keyed section (metrics objects and the like), `{}` when absent.
///
/// Looks under `data` first, then at the document root.
pub fn section(document: &Value, key: &str) -> Value {
    data_root(document)
        .get(key)
        .or_else(|| document.get(key))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// Mutable access to a collection array, creating `data` and the array if needed.
pub fn entities_mut<'a>(document: &'a mut Value, name: &str) -> Result<&'a mut Vec<Value>> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| Error::operation("document root is not a JSON object"))?;
    let data = root
        .entry("data")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| Error::operation("document 'data' is not a JSON object"))?;
    data.entry(name)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| Error::operation(format!("collection '{name}' is not a JSON array")))
}

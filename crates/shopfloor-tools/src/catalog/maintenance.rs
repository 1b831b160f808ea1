//! Maintenance (CMMS) tools: work orders, history, schedules, spare parts.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use shopfloor_core::Result;
use shopfloor_store::document::{
    MACHINES, MAINTENANCE_HISTORY, MAINTENANCE_SCHEDULES, MAINTENANCE_WORK_ORDERS,
    SPARE_PARTS_USAGE,
};
use shopfloor_store::{DataStore, DocumentKind, Lookup};

use super::{generated_id, matches, now};
use crate::registry::ToolDescriptor;
use crate::schema::ParamSpec;

/// Maintenance tool table.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "get_work_orders",
            "Get maintenance work orders, optionally filtered by machine and status \
             (OPEN, IN_PROGRESS, SCHEDULED, CLOSED)",
            vec![
                ParamSpec::string("machine_id", "Machine ID to filter by"),
                ParamSpec::string("status", "Status to filter by"),
            ],
            get_work_orders,
        ),
        ToolDescriptor::new(
            "create_work_order",
            "Create a corrective maintenance work order for a machine",
            vec![
                ParamSpec::string("machine_id", "Machine needing maintenance")
                    .required()
                    .references(MACHINES),
                ParamSpec::string("description", "Description of the issue").required(),
                ParamSpec::string("priority", "LOW, MEDIUM, HIGH or URGENT")
                    .default_value(json!("MEDIUM")),
            ],
            create_work_order,
        ),
        ToolDescriptor::new(
            "get_maintenance_history",
            "Get machine details, maintenance history and work orders for one machine",
            vec![ParamSpec::string("machine_id", "Machine ID").required()],
            get_maintenance_history,
        ),
        ToolDescriptor::new(
            "get_maintenance_schedules",
            "Get planned maintenance schedules, optionally for one machine",
            vec![ParamSpec::string("machine_id", "Machine ID to filter by")],
            get_maintenance_schedules,
        ),
        ToolDescriptor::new(
            "get_spare_parts_usage",
            "Get spare parts consumption, optionally for one machine",
            vec![ParamSpec::string("machine_id", "Machine ID to filter by")],
            get_spare_parts_usage,
        ),
        ToolDescriptor::new(
            "get_maintenance_metrics",
            "Get overall maintenance KPIs",
            vec![],
            get_maintenance_metrics,
        ),
        ToolDescriptor::new(
            "get_machines",
            "Get every machine in the factory model",
            vec![],
            get_machines,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Argument types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WorkOrderFilter {
    machine_id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateWorkOrderArgs {
    machine_id: String,
    description: String,
    priority: String,
}

#[derive(Debug, Deserialize)]
struct MachineArgs {
    machine_id: String,
}

#[derive(Debug, Deserialize)]
struct MachineFilter {
    machine_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_work_orders(store: Arc<DataStore>, args: WorkOrderFilter) -> Result<Value> {
    let status = args.status.map(|s| s.to_uppercase());
    let orders = store
        .query(&MAINTENANCE_WORK_ORDERS, |wo| {
            matches(wo, "machine_id", args.machine_id.as_deref())
                && matches(wo, "status", status.as_deref())
        })
        .await?;
    Ok(json!({
        "total_work_orders": orders.len(),
        "work_orders": orders,
    }))
}

async fn create_work_order(store: Arc<DataStore>, args: CreateWorkOrderArgs) -> Result<Value> {
    let machine_name = store
        .get_by_id(&MACHINES, &args.machine_id)
        .await?
        .found()
        .and_then(|m| m.get("name").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "Unknown".to_string());

    let work_order = json!({
        "workorder_id": null,
        "machine_id": args.machine_id,
        "machine_name": machine_name,
        "description": args.description,
        "date": now(),
        "status": "OPEN",
        "priority": args.priority.to_uppercase(),
        "resolution_comments": null,
        "completion_date": null,
        "assigned_to": null,
        "spare_parts_required": [],
        "estimated_duration_hours": null,
        "work_type": "corrective",
    });

    let work_order = store
        .append(&MAINTENANCE_WORK_ORDERS, work_order, || generated_id("WO", 6, false))
        .await?;
    let workorder_id = work_order["workorder_id"].as_str().unwrap_or_default().to_string();
    log::info!("Created maintenance work order {workorder_id} for {}", args.machine_id);

    Ok(json!({
        "work_order": work_order,
        "message": format!("Work order {workorder_id} created successfully"),
    }))
}

async fn get_maintenance_history(store: Arc<DataStore>, args: MachineArgs) -> Result<Value> {
    let machine = match store.get_by_id(&MACHINES, &args.machine_id).await? {
        Lookup::Found(machine) => machine,
        Lookup::NotFound(nf) => return Ok(nf.to_value()),
    };

    let id = Some(args.machine_id.as_str());
    let history = store
        .query(&MAINTENANCE_HISTORY, |h| matches(h, "machine_id", id))
        .await?;
    let work_orders = store
        .query(&MAINTENANCE_WORK_ORDERS, |wo| matches(wo, "machine_id", id))
        .await?;

    Ok(json!({
        "found": true,
        "machine_details": machine,
        "total_maintenance_events": history.len(),
        "total_work_orders": work_orders.len(),
        "maintenance_history": history,
        "work_orders": work_orders,
    }))
}

async fn get_maintenance_schedules(store: Arc<DataStore>, args: MachineFilter) -> Result<Value> {
    let schedules = store
        .query(&MAINTENANCE_SCHEDULES, |s| {
            matches(s, "machine_id", args.machine_id.as_deref())
        })
        .await?;
    let mut out = json!({
        "total_schedules": schedules.len(),
        "maintenance_schedules": schedules,
    });
    if let Some(machine_id) = args.machine_id {
        out["machine_id"] = json!(machine_id);
    }
    Ok(out)
}

async fn get_spare_parts_usage(store: Arc<DataStore>, args: MachineFilter) -> Result<Value> {
    let usage = store
        .query(&SPARE_PARTS_USAGE, |u| {
            matches(u, "machine_id", args.machine_id.as_deref())
        })
        .await?;
    let mut out = json!({
        "total_usage_events": usage.len(),
        "spare_parts_usage": usage,
    });
    if let Some(machine_id) = args.machine_id {
        out["machine_id"] = json!(machine_id);
    }
    Ok(out)
}

async fn get_maintenance_metrics(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let metrics = store
        .section(DocumentKind::Maintenance, "maintenance_metrics")
        .await?;
    Ok(json!({
        "maintenance_metrics": metrics,
        "timestamp": now(),
    }))
}

async fn get_machines(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let machines = store.all(&MACHINES).await?;
    Ok(json!({
        "total_machines": machines.len(),
        "machines": machines,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::registry;
    use shopfloor_core::{ErrorKind, ServerDomain};
    use shopfloor_store::fixtures::fixture_dir;
    use tempfile::TempDir;

    fn setup() -> (TempDir, crate::registry::ToolRegistry) {
        let dir = fixture_dir().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        let reg = registry(ServerDomain::Maintenance, store).unwrap();
        (dir, reg)
    }

    #[tokio::test]
    async fn test_history_for_known_machine() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke("get_maintenance_history", json!({"machine_id": "GB001"}))
            .await;
        let data = env.data().unwrap();
        assert_eq!(data["found"], json!(true));
        assert_eq!(data["machine_details"]["machine_id"], json!("GB001"));
        assert_eq!(data["total_maintenance_events"], json!(2));
        assert_eq!(data["total_work_orders"], json!(1));
    }

    #[tokio::test]
    async fn test_history_for_unknown_machine_is_not_found_data() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke("get_maintenance_history", json!({"machine_id": "ZZ999"}))
            .await;
        assert!(env.is_success());
        let data = env.data().unwrap();
        assert_eq!(data["found"], json!(false));
        assert_eq!(data["entity"], json!("machine"));
        assert_eq!(data["id"], json!("ZZ999"));
    }

    #[tokio::test]
    async fn test_work_orders_status_is_case_insensitive() {
        let (_dir, reg) = setup();
        let env = reg.invoke("get_work_orders", json!({"status": "open"})).await;
        let data = env.data().unwrap();
        assert_eq!(data["total_work_orders"], json!(1));
        assert_eq!(data["work_orders"][0]["machine_id"], json!("GB001"));
    }

    #[tokio::test]
    async fn test_create_work_order_persists() {
        let (dir, reg) = setup();
        let env = reg
            .invoke(
                "create_work_order",
                json!({"machine_id": "GB002", "description": "Bearing noise", "priority": "high"}),
            )
            .await;
        let wo = &env.data().unwrap()["work_order"];
        assert_eq!(wo["priority"], json!("HIGH"));
        assert_eq!(wo["status"], json!("OPEN"));
        assert_eq!(wo["machine_name"], json!("Gearbox Test Bench"));
        assert!(wo["workorder_id"].as_str().unwrap().starts_with("WO-"));

        let fresh = DataStore::new(dir.path().to_path_buf());
        let persisted = fresh
            .query(&MAINTENANCE_WORK_ORDERS, |w| w["machine_id"] == "GB002")
            .await
            .unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn test_create_work_order_unknown_machine() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke(
                "create_work_order",
                json!({"machine_id": "ZZ999", "description": "x"}),
            )
            .await;
        assert_eq!(env.error().unwrap().kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_concurrent_create_work_order_both_persist() {
        let (dir, reg) = setup();
        let args = json!({"machine_id": "BL001", "description": "Spindle vibration"});
        let (a, b) = tokio::join!(
            reg.invoke("create_work_order", args.clone()),
            reg.invoke("create_work_order", args.clone()),
        );
        assert!(a.is_success() && b.is_success());

        let fresh = DataStore::new(dir.path().to_path_buf());
        let orders = fresh
            .query(&MAINTENANCE_WORK_ORDERS, |w| w["machine_id"] == "BL001")
            .await
            .unwrap();
        // One from the fixture, two created.
        assert_eq!(orders.len(), 3);
    }

    #[tokio::test]
    async fn test_filters_and_metrics() {
        let (_dir, reg) = setup();
        let schedules = reg
            .invoke("get_maintenance_schedules", json!({"machine_id": "NC001"}))
            .await;
        assert_eq!(schedules.data().unwrap()["total_schedules"], json!(1));
        assert_eq!(schedules.data().unwrap()["machine_id"], json!("NC001"));

        let usage = reg.invoke("get_spare_parts_usage", json!({})).await;
        assert_eq!(usage.data().unwrap()["total_usage_events"], json!(2));

        let metrics = reg.invoke("get_maintenance_metrics", Value::Null).await;
        assert_eq!(metrics.data().unwrap()["maintenance_metrics"]["mttr_hours"], json!(8.8));

        let machines = reg.invoke("get_machines", Value::Null).await;
        assert_eq!(machines.data().unwrap()["total_machines"], json!(4));
    }
}

//! Production (MES) tools: work centers, machine state, orders, quality.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use shopfloor_core::Result;
use shopfloor_store::document::{
    MACHINE_CRITICALITY, MACHINES, PRODUCTION_MACHINES, PRODUCTION_WORK_CENTERS,
    PRODUCTION_WORK_ORDERS, PRODUCTS, QUALITY_METRICS,
};
use shopfloor_store::{DataStore, DocumentKind, Lookup};

use super::{generated_id, matches, now};
use crate::registry::ToolDescriptor;
use crate::schema::ParamSpec;

/// Work center used when a machine has no execution-system record.
const FALLBACK_WORK_CENTER: &str = "WC001";

/// Planned duration of a new production order.
const PLANNED_HOURS: i64 = 8;

/// Production tool table.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "get_factories",
            "Get every work center in the production system",
            vec![],
            get_factories,
        ),
        ToolDescriptor::new(
            "get_machines",
            "Get machine runtime records, optionally filtered by work center and status \
             (running, idle, breakdown, maintenance)",
            vec![
                ParamSpec::string("work_center_id", "Work center ID to filter by"),
                ParamSpec::string("status", "Status to filter by"),
            ],
            get_machines,
        ),
        ToolDescriptor::new(
            "get_machine_criticality",
            "Get machine criticality ratings, optionally for one machine",
            vec![ParamSpec::string("machine_id", "Machine ID")],
            get_machine_criticality,
        ),
        ToolDescriptor::new(
            "get_work_orders",
            "Get production orders, optionally filtered by status \
             (scheduled, in_progress, completed, on_hold) and priority",
            vec![
                ParamSpec::string("status", "Status to filter by"),
                ParamSpec::string("priority", "Priority to filter by"),
            ],
            get_work_orders,
        ),
        ToolDescriptor::new(
            "get_production_metrics",
            "Get production KPIs",
            vec![],
            get_production_metrics,
        ),
        ToolDescriptor::new(
            "get_quality_metrics",
            "Get quality metrics, optionally for one machine",
            vec![ParamSpec::string("machine_id", "Machine ID to filter by")],
            get_quality_metrics,
        ),
        ToolDescriptor::new(
            "create_work_order",
            "Schedule a production order for a product on a machine",
            vec![
                ParamSpec::string("product_id", "Product to manufacture")
                    .required()
                    .references(PRODUCTS),
                ParamSpec::string("machine_id", "Machine to produce on")
                    .required()
                    .references(MACHINES),
                ParamSpec::integer("quantity", "Units to produce")
                    .required()
                    .at_least(1),
                ParamSpec::string("priority", "low, medium, high or urgent")
                    .default_value(json!("medium")),
            ],
            create_work_order,
        ),
        ToolDescriptor::new(
            "get_bottleneck_analysis",
            "Get bottleneck analysis and the machines flagged as bottlenecks",
            vec![],
            get_bottleneck_analysis,
        ),
        ToolDescriptor::new(
            "get_machine_status",
            "Get runtime status, quality metrics and criticality for one machine",
            vec![ParamSpec::string("machine_id", "Machine ID").required()],
            get_machine_status,
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
struct MachineFilter {
    work_center_id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OptionalMachine {
    machine_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderFilter {
    status: Option<String>,
    priority: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateOrderArgs {
    product_id: String,
    machine_id: String,
    quantity: i64,
    priority: String,
}

#[derive(Debug, Deserialize)]
struct MachineArgs {
    machine_id: String,
}

async fn get_factories(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let work_centers = store.all(&PRODUCTION_WORK_CENTERS).await?;
    Ok(json!({
        "total_work_centers": work_centers.len(),
        "work_centers": work_centers,
    }))
}

async fn get_machines(store: Arc<DataStore>, args: MachineFilter) -> Result<Value> {
    let status = args.status.map(|s| s.to_lowercase());
    let machines = store
        .query(&PRODUCTION_MACHINES, |m| {
            matches(m, "work_center_id", args.work_center_id.as_deref())
                && matches(m, "status", status.as_deref())
        })
        .await?;
    Ok(json!({
        "total_machines": machines.len(),
        "machines": machines,
    }))
}

async fn get_machine_criticality(store: Arc<DataStore>, args: OptionalMachine) -> Result<Value> {
    match args.machine_id {
        Some(id) => Ok(match store.get_by_id(&MACHINE_CRITICALITY, &id).await? {
            Lookup::Found(rating) => json!({"found": true, "machine_criticality": rating}),
            Lookup::NotFound(nf) => nf.to_value(),
        }),
        None => {
            let ratings = store.all(&MACHINE_CRITICALITY).await?;
            Ok(json!({
                "total_machines": ratings.len(),
                "machine_criticality": ratings,
            }))
        }
    }
}

async fn get_work_orders(store: Arc<DataStore>, args: OrderFilter) -> Result<Value> {
    let status = args.status.map(|s| s.to_lowercase());
    let priority = args.priority.map(|p| p.to_lowercase());
    let orders = store
        .query(&PRODUCTION_WORK_ORDERS, |wo| {
            matches(wo, "status", status.as_deref()) && matches(wo, "priority", priority.as_deref())
        })
        .await?;
    Ok(json!({
        "total_orders": orders.len(),
        "work_orders": orders,
    }))
}

async fn get_production_metrics(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let metrics = store
        .section(DocumentKind::Production, "production_metrics")
        .await?;
    Ok(json!({
        "production_metrics": metrics,
        "timestamp": now(),
    }))
}

async fn get_quality_metrics(store: Arc<DataStore>, args: OptionalMachine) -> Result<Value> {
    let metrics = store
        .query(&QUALITY_METRICS, |q| {
            matches(q, "machine_id", args.machine_id.as_deref())
        })
        .await?;
    let mut out = json!({
        "total_metrics": metrics.len(),
        "quality_metrics": metrics,
    });
    if let Some(machine_id) = args.machine_id {
        out["machine_id"] = json!(machine_id);
    }
    Ok(out)
}

async fn create_work_order(store: Arc<DataStore>, args: CreateOrderArgs) -> Result<Value> {
    let work_center_id = store
        .get_by_id(&PRODUCTION_MACHINES, &args.machine_id)
        .await?
        .found()
        .and_then(|m| {
            m.get("work_center_id")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_WORK_CENTER.to_string());

    let start = Utc::now();
    let end = start + Duration::hours(PLANNED_HOURS);
    let order = json!({
        "order_id": null,
        "product_id": args.product_id,
        "machine_id": args.machine_id,
        "work_center_id": work_center_id,
        "employee_id": null,
        "quantity": args.quantity,
        "status": "scheduled",
        "priority": args.priority.to_lowercase(),
        "planned_start_time": start.to_rfc3339(),
        "planned_end_time": end.to_rfc3339(),
        "actual_start_time": null,
        "actual_end_time": null,
        "lot_number": generated_id("LOT", 3, false),
    });

    let order = store
        .append(&PRODUCTION_WORK_ORDERS, order, || generated_id("MES-WO", 3, false))
        .await?;
    let order_id = order["order_id"].as_str().unwrap_or_default().to_string();
    log::info!("Scheduled production order {order_id} on {}", args.machine_id);

    Ok(json!({
        "work_order": order,
        "message": format!("Work order {order_id} created successfully"),
    }))
}

async fn get_bottleneck_analysis(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let metrics = store
        .section(DocumentKind::Production, "production_metrics")
        .await?;
    let bottlenecks = store
        .query(&MACHINE_CRITICALITY, |mc| {
            mc.get("is_bottleneck").and_then(Value::as_bool).unwrap_or(false)
        })
        .await?;
    Ok(json!({
        "bottleneck_analysis": metrics.get("bottleneck_analysis").cloned().unwrap_or_else(|| json!({})),
        "total_bottlenecks": bottlenecks.len(),
        "bottleneck_machines": bottlenecks,
        "timestamp": now(),
    }))
}

async fn get_machine_status(store: Arc<DataStore>, args: MachineArgs) -> Result<Value> {
    let machine = match store.get_by_id(&PRODUCTION_MACHINES, &args.machine_id).await? {
        Lookup::Found(machine) => machine,
        Lookup::NotFound(nf) => return Ok(nf.to_value()),
    };
    let id = Some(args.machine_id.as_str());
    let quality = store
        .query(&QUALITY_METRICS, |q| matches(q, "machine_id", id))
        .await?;
    let criticality = store
        .get_by_id(&MACHINE_CRITICALITY, &args.machine_id)
        .await?
        .found();

    Ok(json!({
        "found": true,
        "machine_status": machine,
        "quality_metrics": quality,
        "criticality": criticality,
        "timestamp": now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::registry;
    use crate::registry::ToolRegistry;
    use shopfloor_core::{ErrorKind, ServerDomain};
    use shopfloor_store::fixtures::fixture_dir;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ToolRegistry) {
        let dir = fixture_dir().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        (dir, registry(ServerDomain::Production, store).unwrap())
    }

    #[tokio::test]
    async fn test_factories_and_machine_filters() {
        let (_dir, reg) = setup();
        let factories = reg.invoke("get_factories", Value::Null).await;
        assert_eq!(factories.data().unwrap()["total_work_centers"], json!(3));

        let running = reg
            .invoke("get_machines", json!({"work_center_id": "WC001", "status": "RUNNING"}))
            .await;
        let data = running.data().unwrap();
        assert_eq!(data["total_machines"], json!(1));
        assert_eq!(data["machines"][0]["machine_id"], json!("GB001"));
    }

    #[tokio::test]
    async fn test_criticality_single_and_missing() {
        let (_dir, reg) = setup();
        let one = reg
            .invoke("get_machine_criticality", json!({"machine_id": "BL001"}))
            .await;
        assert_eq!(one.data().unwrap()["machine_criticality"]["is_bottleneck"], json!(true));

        let missing = reg
            .invoke("get_machine_criticality", json!({"machine_id": "GB002"}))
            .await;
        assert!(missing.is_success());
        assert_eq!(missing.data().unwrap()["found"], json!(false));

        let all = reg.invoke("get_machine_criticality", json!({})).await;
        assert_eq!(all.data().unwrap()["total_machines"], json!(3));
    }

    #[tokio::test]
    async fn test_bottleneck_analysis() {
        let (_dir, reg) = setup();
        let env = reg.invoke("get_bottleneck_analysis", Value::Null).await;
        let data = env.data().unwrap();
        assert_eq!(data["total_bottlenecks"], json!(1));
        assert_eq!(data["bottleneck_analysis"]["primary_bottleneck"], json!("BL001"));
    }

    #[tokio::test]
    async fn test_create_work_order_uses_machine_work_center() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke(
                "create_work_order",
                json!({"product_id": "P002", "machine_id": "BL001", "quantity": 3, "priority": "HIGH"}),
            )
            .await;
        let order = &env.data().unwrap()["work_order"];
        assert_eq!(order["work_center_id"], json!("WC002"));
        assert_eq!(order["priority"], json!("high"));
        assert_eq!(order["status"], json!("scheduled"));
        assert!(order["order_id"].as_str().unwrap().starts_with("MES-WO-"));
        assert!(order["lot_number"].as_str().unwrap().starts_with("LOT-"));

        let scheduled = reg.invoke("get_work_orders", json!({"status": "scheduled"})).await;
        assert_eq!(scheduled.data().unwrap()["total_orders"], json!(2));
    }

    #[tokio::test]
    async fn test_create_work_order_validation() {
        let (_dir, reg) = setup();
        let env = reg
            .invoke(
                "create_work_order",
                json!({"product_id": "P001", "machine_id": "GB001", "quantity": -5}),
            )
            .await;
        assert_eq!(env.error().unwrap().kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_machine_status() {
        let (_dir, reg) = setup();
        let env = reg.invoke("get_machine_status", json!({"machine_id": "GB001"})).await;
        let data = env.data().unwrap();
        assert_eq!(data["machine_status"]["status"], json!("running"));
        assert_eq!(data["quality_metrics"].as_array().unwrap().len(), 1);
        assert_eq!(data["criticality"]["criticality"], json!("high"));

        let missing = reg.invoke("get_machine_status", json!({"machine_id": "ZZ999"})).await;
        assert_eq!(missing.data().unwrap()["found"], json!(false));
    }

    #[tokio::test]
    async fn test_metrics() {
        let (_dir, reg) = setup();
        let prod = reg.invoke("get_production_metrics", Value::Null).await;
        assert_eq!(prod.data().unwrap()["production_metrics"]["daily_output"], json!(7));
        let quality = reg.invoke("get_quality_metrics", json!({"machine_id": "BL001"})).await;
        assert_eq!(quality.data().unwrap()["total_metrics"], json!(1));
    }
}

//! Business (ERP) tools: customers, sales orders, products.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use shopfloor_core::Result;
use shopfloor_store::DataStore;
use shopfloor_store::document::{CUSTOMERS, PRODUCTS, SALES_ORDERS};

use super::{generated_id, matches, now};
use crate::registry::ToolDescriptor;
use crate::schema::ParamSpec;

/// Business tool table.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "get_customers",
            "Get customers, optionally filtered by type (standard, premium, strategic)",
            vec![ParamSpec::string("customer_type", "Customer type to filter by")],
            get_customers,
        ),
        ToolDescriptor::new(
            "get_sales_orders",
            "Get sales orders, optionally filtered by customer and status \
             (pending, confirmed, in_production, shipped, delivered)",
            vec![
                ParamSpec::string("customer_id", "Customer ID to filter by"),
                ParamSpec::string("status", "Status to filter by"),
            ],
            get_sales_orders,
        ),
        ToolDescriptor::new(
            "create_sales_order",
            "Create a pending sales order",
            vec![
                ParamSpec::string("customer_id", "Ordering customer")
                    .required()
                    .references(CUSTOMERS),
                ParamSpec::string("product_id", "Ordered product")
                    .required()
                    .references(PRODUCTS),
                ParamSpec::integer("quantity", "Units ordered")
                    .required()
                    .at_least(1),
            ],
            create_sales_order,
        ),
        ToolDescriptor::new("get_products", "Get every product", vec![], get_products),
    ]
}

#[derive(Debug, Deserialize)]
struct CustomerFilter {
    customer_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SalesOrderFilter {
    customer_id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSalesOrderArgs {
    customer_id: String,
    product_id: String,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

async fn get_customers(store: Arc<DataStore>, args: CustomerFilter) -> Result<Value> {
    let customer_type = args.customer_type.map(|t| t.to_lowercase());
    let customers = store
        .query(&CUSTOMERS, |c| {
            matches(c, "customer_type", customer_type.as_deref())
        })
        .await?;
    Ok(json!({
        "total_customers": customers.len(),
        "customers": customers,
    }))
}

async fn get_sales_orders(store: Arc<DataStore>, args: SalesOrderFilter) -> Result<Value> {
    let status = args.status.map(|s| s.to_lowercase());
    let orders = store
        .query(&SALES_ORDERS, |so| {
            matches(so, "customer_id", args.customer_id.as_deref())
                && matches(so, "status", status.as_deref())
        })
        .await?;
    Ok(json!({
        "total_orders": orders.len(),
        "sales_orders": orders,
    }))
}

async fn create_sales_order(store: Arc<DataStore>, args: CreateSalesOrderArgs) -> Result<Value> {
    let order = json!({
        "order_id": null,
        "customer_id": args.customer_id,
        "product_id": args.product_id,
        "quantity": args.quantity,
        "status": "pending",
        "order_date": now(),
    });

    let order = store
        .append(&SALES_ORDERS, order, || generated_id("SO", 3, true))
        .await?;
    let order_id = order["order_id"].as_str().unwrap_or_default().to_string();
    log::info!("Created sales order {order_id} for {}", args.customer_id);

    Ok(json!({
        "sales_order": order,
        "message": format!("Sales order {order_id} created successfully"),
    }))
}

async fn get_products(store: Arc<DataStore>, _args: NoArgs) -> Result<Value> {
    let products = store.all(&PRODUCTS).await?;
    Ok(json!({
        "total_products": products.len(),
        "products": products,
    }))
}

//! HTTP and stdio answer the same call with the same bytes.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::Request;
use shopfloor_core::ServerDomain;
use shopfloor_server::http::router;
use shopfloor_server::stdio::serve_lines;
use shopfloor_server::{ServerInstance, TransportMode};
use shopfloor_store::DataStore;
use shopfloor_store::fixtures::fixture_dir;
use tower::ServiceExt;

async fn over_http(instance: Arc<ServerInstance>, frame: &str) -> Vec<u8> {
    let request = Request::builder()
        .method("POST")
        .uri("/tools/call")
        .body(Body::from(frame.to_string()))
        .unwrap();
    let response = router(instance).oneshot(request).await.unwrap();
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn over_stdio(instance: &ServerInstance, frame: &str) -> Vec<u8> {
    let input = format!("{frame}\n");
    let mut out = Vec::new();
    serve_lines(instance, input.as_bytes(), &mut out).await.unwrap();
    assert_eq!(out.pop(), Some(b'\n'));
    out
}

fn instance(domain: ServerDomain, dir: &std::path::Path) -> Arc<ServerInstance> {
    let store = Arc::new(DataStore::new(dir.to_path_buf()));
    Arc::new(ServerInstance::new(domain, store, domain.default_port(), TransportMode::Http).unwrap())
}

#[tokio::test]
async fn test_success_envelopes_identical() {
    let dir = fixture_dir().unwrap();
    let cases = [
        (
            ServerDomain::Maintenance,
            r#"{"tool": "get_maintenance_history", "params": {"machine_id": "GB001"}}"#,
        ),
        (
            ServerDomain::Maintenance,
            r#"{"tool": "get_maintenance_history", "params": {"machine_id": "ZZ999"}}"#,
        ),
        (ServerDomain::Production, r#"{"tool": "get_bottleneck_analysis"}"#),
        (
            ServerDomain::Workforce,
            r#"{"tool": "find_qualified_employees", "params": {"machine_id": "GB001"}}"#,
        ),
        (
            ServerDomain::Procedures,
            r#"{"tool": "search_sops", "params": {"keyword": "press"}}"#,
        ),
    ];

    for (domain, frame) in cases {
        let instance = instance(domain, dir.path());
        let http = over_http(Arc::clone(&instance), frame).await;
        let stdio = over_stdio(&instance, frame).await;
        assert_eq!(
            String::from_utf8(http).unwrap(),
            String::from_utf8(stdio).unwrap(),
            "{domain}: {frame}"
        );
    }
}

#[tokio::test]
async fn test_failure_envelopes_match_apart_from_timestamp() {
    let dir = fixture_dir().unwrap();
    let instance = instance(ServerDomain::Business, dir.path());

    for frame in [
        r#"{"tool": "no_such_tool"}"#,
        r#"{"tool": "create_sales_order", "params": {"customer_id": "C404"}}"#,
        "][",
    ] {
        let mut http: serde_json::Value =
            serde_json::from_slice(&over_http(Arc::clone(&instance), frame).await).unwrap();
        let mut stdio: serde_json::Value =
            serde_json::from_slice(&over_stdio(&instance, frame).await).unwrap();
        http["error"]["timestamp"].take();
        stdio["error"]["timestamp"].take();
        assert_eq!(http, stdio, "{frame}");
        assert_eq!(http["success"], serde_json::json!(false));
    }
}

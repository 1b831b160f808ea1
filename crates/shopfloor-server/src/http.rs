//! HTTP transport.
//!
//! Routes:
//!
//! - `GET /health`: `{status, uptime_seconds, domain, pid}`, 503 when degraded
//! - `GET /info`: domain metadata and tool names
//! - `GET /tools`: full tool descriptors
//! - `POST /tools/call`: `{tool, params}` in, envelope out
//!
//! A tool call always answers 200 with an envelope, whatever the logical
//! outcome. Only an undecodable body (400) or an envelope that cannot be
//! encoded (500) changes the status code.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use shopfloor_core::{Error, Result};
use shopfloor_tools::{Envelope, ToolDescriptor};
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::instance::{ServerInfo, ServerInstance};
use crate::request::parse_request;

type Shared = Arc<ServerInstance>;

/// Build the router for one instance.
pub fn router(instance: Shared) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .with_state(instance)
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(instance: Shared, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::operation(format!("cannot bind {addr}: {e}")))?;
    tracing::info!(
        domain = %instance.domain(),
        tools = instance.registry().tool_count(),
        "listening on http://{addr}"
    );

    axum::serve(listener, router(instance))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(instance): State<Shared>) -> Response {
    let health = instance.health().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

async fn info(State(instance): State<Shared>) -> Json<ServerInfo> {
    Json(instance.info())
}

async fn list_tools(State(instance): State<Shared>) -> Json<Vec<Value>> {
    Json(
        instance
            .registry()
            .list_tools()
            .iter()
            .map(ToolDescriptor::to_json)
            .collect(),
    )
}

async fn call_tool(State(instance): State<Shared>, body: Bytes) -> Response {
    let call = match parse_request(&body) {
        Ok(call) => call,
        Err(envelope) => {
            tracing::debug!("rejected malformed request");
            return envelope_response(StatusCode::BAD_REQUEST, &envelope);
        }
    };

    let span = tracing::info_span!("tool_call", tool = %call.tool);
    let envelope = instance.dispatch(call).instrument(span).await;
    envelope_response(StatusCode::OK, &envelope)
}

fn envelope_response(status: StatusCode, envelope: &Envelope) -> Response {
    match envelope.encode() {
        Ok(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!("failed to encode envelope: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::TransportMode;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use shopfloor_core::{ErrorKind, ServerDomain};
    use shopfloor_store::DataStore;
    use shopfloor_store::fixtures::fixture_dir;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(domain: ServerDomain) -> (TempDir, Router) {
        let dir = fixture_dir().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        let instance =
            ServerInstance::new(domain, store, domain.default_port(), TransportMode::Http).unwrap();
        (dir, router(Arc::new(instance)))
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_call(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/tools/call")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, router) = app(ServerDomain::Production);
        let (status, body) = send(router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["domain"], json!("production"));
        assert_eq!(body["pid"], json!(std::process::id()));
    }

    #[tokio::test]
    async fn test_health_degraded_when_document_missing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DataStore::new(dir.path().to_path_buf()));
        let instance =
            ServerInstance::new(ServerDomain::Workforce, store, 8004, TransportMode::Http).unwrap();
        let (status, body) = send(router(Arc::new(instance)), get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], json!("degraded"));
    }

    #[tokio::test]
    async fn test_info_and_tools() {
        let (_dir, router) = app(ServerDomain::Business);
        let (_, info) = send(router.clone(), get("/info")).await;
        assert_eq!(info["domain"], json!("business"));
        assert_eq!(info["port"], json!(8002));
        assert_eq!(info["tools"].as_array().unwrap().len(), 4);

        let (status, tools) = send(router, get("/tools")).await;
        assert_eq!(status, StatusCode::OK);
        let create = tools
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["name"] == json!("create_sales_order"))
            .unwrap();
        assert_eq!(
            create["parameters"]["required"],
            json!(["customer_id", "product_id", "quantity"])
        );
    }

    #[tokio::test]
    async fn test_call_success() {
        let (_dir, router) = app(ServerDomain::Maintenance);
        let (status, body) = send(
            router,
            post_call(r#"{"tool": "get_maintenance_history", "params": {"machine_id": "GB001"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["found"], json!(true));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_call_not_found_is_data() {
        let (_dir, router) = app(ServerDomain::Maintenance);
        let (status, body) = send(
            router,
            post_call(r#"{"tool": "get_maintenance_history", "params": {"machine_id": "ZZ999"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["found"], json!(false));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_200_failure() {
        let (_dir, router) = app(ServerDomain::Maintenance);
        let (status, body) = send(router, post_call(r#"{"tool": "launch_rocket"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["kind"], json!(ErrorKind::UnknownTool.as_str()));
        assert_eq!(body["error"]["tool"], json!("launch_rocket"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (_dir, router) = app(ServerDomain::Maintenance);
        let (status, body) = send(router, post_call("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], json!(ErrorKind::MalformedRequest.as_str()));
    }
}

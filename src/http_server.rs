//! HTTP control API.
//!
//! | Method       | Path        | Body                    |
//! |--------------|-------------|-------------------------|
//! | `POST`/`PUT` | `/addrule`  | [`BindRequest`]         |
//! | `POST`/`PUT` | `/register` | [`GatewayRegistration`] |
//! | `GET`        | `/health`   | none                    |
//!
//! Successful mutations answer `201 Created`. Malformed bodies and failed
//! validation answer `400`, failed host networking operations `500`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, trace};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::net::TcpListener;

use crate::engine::ReconciliationEngine;
use crate::error::InvalidRequest;
use crate::gateways::GatewayService;
use crate::types::{BindRequest, GatewayRegistration};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub gateways: Arc<GatewayService>,
}

enum ApiError {
    BadRequest(String),
    /// Host networking failed for at least one endpoint.
    Internal(Vec<(String, String)>),
}

impl From<InvalidRequest> for ApiError {
    fn from(e: InvalidRequest) -> Self {
        ApiError::BadRequest(e.0)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Bad request", "reason": reason })),
            )
                .into_response(),
            ApiError::Internal(errors) => {
                let errors: Vec<_> = errors
                    .into_iter()
                    .map(|(endpoint_ip, error)| json!({ "endpoint_ip": endpoint_ip, "error": error }))
                    .collect();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "Failed to apply rules", "errors": errors })),
                )
                    .into_response()
            }
        }
    }
}

fn created() -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Status Created" })),
    )
        .into_response()
}

fn parse<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    trace!("request body: {}", String::from_utf8_lossy(body));
    serde_json::from_slice(body).map_err(|e| {
        error!("failed to decode request body: {}", e);
        ApiError::BadRequest(e.to_string())
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/addrule", post(add_rule).put(add_rule))
        .route("/register", post(register).put(register))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves the control API until the listener fails.
pub async fn run_http_server(bind_addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("HTTP control API listening on {}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn add_rule(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: BindRequest = parse(&body)?;
    let report = state
        .engine
        .reconcile(&req.gateway_ip, &req.endpoint_ips)
        .await?;

    if report.is_success() {
        Ok(created())
    } else {
        error!(
            "rules for gateway {} not fully applied",
            report.gateway_ip
        );
        Err(ApiError::Internal(report.errors()))
    }
}

async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: GatewayRegistration = parse(&body)?;
    state.gateways.register(&req).await?;
    Ok(created())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "exitlb" }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::error::AnnounceError;
    use crate::handshake::{Announcer, Handshake, HandshakeTracker};
    use crate::net::{NetworkStateApplier, RuleOp};
    use crate::state::{BindingTable, GatewayRegistry};
    use crate::testing::{Call, FakeNetwork};
    use crate::types::Announcement;

    struct Accepting;

    #[async_trait]
    impl Announcer for Accepting {
        async fn announce(&self, _: &str, _: &Announcement) -> Result<(), AnnounceError> {
            Ok(())
        }
    }

    struct App {
        router: Router,
        port: Arc<FakeNetwork>,
        bindings: Arc<BindingTable>,
        tracker: Arc<HandshakeTracker>,
    }

    fn app() -> App {
        let port = Arc::new(FakeNetwork::new());
        let bindings = Arc::new(BindingTable::new());
        let registry = Arc::new(GatewayRegistry::new());
        let tracker = Arc::new(HandshakeTracker::new(Handshake::new(
            port.clone(),
            Arc::new(Accepting),
            Duration::from_secs(1),
        )));
        let applier = NetworkStateApplier::new(port.clone(), registry.clone(), "upf");
        let state = AppState {
            engine: Arc::new(ReconciliationEngine::new(bindings.clone(), applier)),
            gateways: Arc::new(GatewayService::new(registry, tracker.clone())),
        };
        App {
            router: router(state),
            port,
            bindings,
            tracker,
        }
    }

    async fn send(app: &App, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn bind_fails_until_gateway_registers() {
        let app = app();
        let bind = r#"{"gateway_ip":"10.0.0.7","endpoint_ips":["192.168.1.5"]}"#;

        let (status, body) = send(&app, Method::POST, "/addrule", bind).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["errors"][0]["endpoint_ip"], "192.168.1.5");
        assert!(body["errors"][0]["error"]
            .as_str()
            .unwrap()
            .contains("not registered"));
        assert_eq!(app.bindings.lookup("192.168.1.5").await, None);

        let (status, _) = send(
            &app,
            Method::POST,
            "/register",
            r#"{"gateway_ip":"10.0.0.7","core_identity":"AA:BB:CC:DD:EE:FF","target_host":"upf-1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::PUT, "/addrule", bind).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Status Created");
        assert_eq!(
            app.bindings.lookup("192.168.1.5").await.as_deref(),
            Some("10.0.0.7")
        );
        assert!(app
            .port
            .calls()
            .ends_with(&[Call::resolution_add("192.168.1.5", "AA:BB:CC:DD:EE:FF", "upf7")]));
    }

    #[tokio::test]
    async fn legacy_field_names_are_accepted() {
        let app = app();
        let (status, _) = send(
            &app,
            Method::POST,
            "/register",
            r#"{"gwip":"10.0.0.7","coremac":"AA:BB:CC:DD:EE:FF","accessmac":"","hostname":"upf-1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/addrule",
            r#"{"gwip":"10.0.0.7","ip":["192.168.1.5"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            app.port.calls()[0],
            Call::mark(RuleOp::Add, "192.168.1.5", 7)
        );
    }

    #[tokio::test]
    async fn malformed_or_incomplete_bodies_are_bad_requests() {
        let app = app();
        for (uri, body) in [
            ("/addrule", "not json"),
            ("/addrule", r#"{"gateway_ip":"10.0.0.7"}"#),
            ("/addrule", r#"{"endpoint_ips":["192.168.1.5"]}"#),
            ("/register", r#"{"gateway_ip":"10.0.0.7"}"#),
            ("/register", r#"{"core_identity":"AA:BB:CC:DD:EE:FF"}"#),
        ] {
            let (status, body) = send(&app, Method::POST, uri, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
        }
        assert!(app.port.calls().is_empty());
        assert_eq!(app.tracker.spawned(), 0);
    }

    #[tokio::test]
    async fn repeated_registration_is_created_but_starts_one_handshake() {
        let app = app();
        let reg = r#"{"gateway_ip":"10.0.0.7","core_identity":"AA:BB:CC:DD:EE:FF","target_host":"upf-1"}"#;
        for _ in 0..2 {
            let (status, _) = send(&app, Method::POST, "/register", reg).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        assert_eq!(app.tracker.spawned(), 1);
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/addrule", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, body) = send(&app, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}

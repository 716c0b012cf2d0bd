//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use report_edge::config::{CorsConfig, RateLimitConfig};
use report_edge::http::{AdmissionPipeline, ParamRule, Readiness};
use report_edge::security::cors::CorsPolicy;
use report_edge::security::rate_limit::RateLimiter;
use report_edge::store::{CounterStore, KvClient, StoreError};

pub const ORIGIN: &str = "https://app.example.com";

/// Remote store that fails every call.
#[derive(Default)]
pub struct FailingKv {
    pub calls: AtomicUsize,
}

#[async_trait]
impl KvClient for FailingKv {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn incr_with_expiry(&self, _key: &str, _window: Duration) -> Result<u64, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".into()))
    }
}

/// Stub business surface plus a flag recording whether the template
/// handler ran.
pub struct TestApp {
    pub router: axum::Router,
    pub template_handler_called: Arc<AtomicBool>,
}

async fn explode_on_boom(request: Request, next: Next) -> Response {
    if request.uri().path().ends_with("/boom") {
        panic!("middleware exploded");
    }
    next.run(request).await
}

async fn panicking_handler() -> &'static str {
    panic!("handler exploded")
}

pub fn build_app(rate_limit: RateLimitConfig, store: Arc<dyn CounterStore>) -> TestApp {
    let limiter = Arc::new(RateLimiter::new(&rate_limit, store));
    let cors = Arc::new(CorsPolicy::new(&CorsConfig {
        allowed_origins: ORIGIN.into(),
        ..CorsConfig::default()
    }));
    let readiness = Readiness::new();
    readiness.mark_ready();

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();

    let router = AdmissionPipeline::new(limiter, cors)
        .api_route("/v1/templates", get(|| async { "templates" }), vec![])
        .api_route(
            "/v1/templates/{id}",
            get(move || {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    "template"
                }
            }),
            vec![ParamRule::uuid_path("id")],
        )
        .api_route("/v1/reports", post(|| async { StatusCode::CREATED }), vec![ParamRule::org_header()])
        .api_route("/v1/reports/{id}/download", get(|| async { "pdf" }).post(|| async { "pdf" }), vec![])
        .api_route("/v1/panic", get(panicking_handler), vec![])
        .api_route(
            "/v1/middleware/boom",
            get(|| async { "unreachable" }).layer(middleware::from_fn(explode_on_boom)),
            vec![],
        )
        .infra_routes(readiness)
        .build();

    TestApp {
        router,
        template_handler_called: called,
    }
}

pub fn limits(global_max: u64, export_max: u64, dispatch_max: u64) -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        global_max,
        export_max,
        dispatch_max,
        window_secs: 60,
        client_ip_header: None,
    }
}

pub fn request(method: Method, uri: &str) -> axum::http::Request<Body> {
    let mut request = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(header::ORIGIN, ORIGIN)
        .body(Body::empty())
        .unwrap();
    let peer: SocketAddr = "203.0.113.7:51000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

pub async fn send(app: &axum::Router, request: axum::http::Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a mock upstream on an ephemeral port that answers every request
/// with `200` and `body`. Returns its address.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

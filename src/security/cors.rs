//! CORS enforcement with sanitized operator configuration.
//!
//! # Responsibilities
//! - Sanitize origin/method/header lists before they reach `tower-http`
//! - Skip infrastructure and Swagger paths entirely (no CORS headers)
//! - Answer preflight requests with `204 No Content`
//!
//! # Design Decisions
//! - Malformed origins are dropped with a startup warning, never fatal
//! - `*` anywhere in a list selects the wildcard policy for that list
//! - An empty method list falls back to the common verbs; an empty header
//!   list mirrors the preflight's `Access-Control-Request-Headers`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tower::{Layer, ServiceExt};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;
use crate::security::bypasses_cors;
use crate::security::sanitize::{partition_origins, sanitize_comma_separated};

const FALLBACK_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::HEAD,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Normalized CORS policy, built once at startup.
#[derive(Clone)]
pub struct CorsPolicy {
    layer: CorsLayer,
    origins: String,
    methods: String,
    headers: String,
}

impl CorsPolicy {
    /// Build a policy from raw operator configuration. Never panics.
    pub fn new(config: &CorsConfig) -> Self {
        let (origins, dropped) = partition_origins(&config.allowed_origins);
        if !dropped.is_empty() {
            tracing::warn!(dropped = ?dropped, "Dropped malformed CORS origins");
        }
        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, cross-origin requests will be refused");
        }

        let methods = sanitize_comma_separated(&config.allowed_methods);
        let headers = sanitize_comma_separated(&config.allowed_headers);

        let layer = CorsLayer::new()
            .allow_origin(allow_origin(&origins))
            .allow_methods(allow_methods(&methods))
            .allow_headers(allow_headers(&headers))
            .max_age(Duration::from_secs(config.max_age_secs));

        let origins = origins.join(",");
        tracing::info!(origins = %origins, methods = %methods, headers = %headers, "CORS policy configured");

        Self {
            layer,
            origins,
            methods,
            headers,
        }
    }

    /// Sanitized origin list as applied.
    pub fn origins(&self) -> &str {
        &self.origins
    }

    pub fn methods(&self) -> &str {
        &self.methods
    }

    pub fn headers(&self) -> &str {
        &self.headers
    }
}

fn allow_origin(origins: &[&str]) -> AllowOrigin {
    if origins.contains(&"*") {
        return AllowOrigin::any();
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim_end_matches('/')).ok())
        .collect();
    AllowOrigin::list(values)
}

fn allow_methods(methods: &str) -> AllowMethods {
    let listed: Vec<&str> = methods.split(',').filter(|m| !m.is_empty()).collect();
    if listed.contains(&"*") {
        return AllowMethods::any();
    }
    let parsed: Vec<Method> = listed
        .iter()
        .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .collect();
    if parsed.is_empty() {
        AllowMethods::list(FALLBACK_METHODS)
    } else {
        AllowMethods::list(parsed)
    }
}

fn allow_headers(headers: &str) -> AllowHeaders {
    let listed: Vec<&str> = headers.split(',').filter(|h| !h.is_empty()).collect();
    if listed.contains(&"*") {
        return AllowHeaders::any();
    }
    let parsed: Vec<HeaderName> = listed
        .iter()
        .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
        .collect();
    if parsed.is_empty() {
        AllowHeaders::mirror_request()
    } else {
        AllowHeaders::list(parsed)
    }
}

fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Middleware applying the policy to every non-infrastructure path.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    if bypasses_cors(request.uri().path()) {
        return next.run(request).await;
    }

    let preflight = is_preflight(&request);
    let mut response = match policy.layer.clone().layer(next).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn config(origins: &str) -> CorsConfig {
        CorsConfig {
            allowed_origins: origins.to_string(),
            ..CorsConfig::default()
        }
    }

    fn app(config: &CorsConfig) -> Router {
        let policy = Arc::new(CorsPolicy::new(config));
        Router::new()
            .route("/api", get(|| async { "api" }))
            .route("/health", get(|| async { "ok" }))
            .route("/swagger/doc.json", get(|| async { "{}" }))
            .layer(middleware::from_fn_with_state(policy, cors_middleware))
    }

    fn preflight(uri: &str, origin: &str) -> Request {
        axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri(uri)
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap()
    }

    fn simple(uri: &str, origin: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_preflight_returns_no_content() {
        let app = app(&config("https://app.example.com"));
        let response = app
            .oneshot(preflight("/api", "https://app.example.com"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let h = response.headers();
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example.com");
        assert!(!h[header::ACCESS_CONTROL_ALLOW_METHODS].is_empty());
        assert!(!h[header::ACCESS_CONTROL_ALLOW_HEADERS].is_empty());
    }

    #[tokio::test]
    async fn test_simple_request_echoes_allowed_origin_only() {
        let app = app(&config("https://app.example.com"));

        let allowed = app
            .clone()
            .oneshot(simple("/api", "https://app.example.com"))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );

        let denied = app.oneshot(simple("/api", "https://evil.example")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::OK);
        assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_wildcard_origin() {
        let app = app(&config(" * "));
        let response = app.oneshot(simple("/api", "https://anyone.example")).await.unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_infrastructure_and_swagger_paths_skip_cors() {
        let app = app(&config("*"));
        for uri in ["/health", "/swagger/doc.json"] {
            let response = app.clone().oneshot(simple(uri, "https://a.example")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
            assert!(response.headers().get(header::VARY).is_none());
        }
    }

    #[test]
    fn test_malformed_configuration_never_panics() {
        let nasty = [
            "",
            ",,,",
            "*,*,https://a.com",
            "https://a.com/path,https://b.com?q,javascript:alert(1)",
            "https://a.com\u{0}, http://[::1]:8080",
            "\u{7f}\u{1b}[31m, https://δ.example",
        ];
        for origins in nasty {
            for list in nasty {
                let policy = CorsPolicy::new(&CorsConfig {
                    allowed_origins: origins.to_string(),
                    allowed_methods: list.to_string(),
                    allowed_headers: list.to_string(),
                    max_age_secs: 0,
                });
                assert!(!policy.origins().contains(",,"));
            }
        }
    }

    #[test]
    fn test_sanitized_lists_exposed() {
        let policy = CorsPolicy::new(&CorsConfig {
            allowed_origins: " https://a.com ,, bad ".into(),
            allowed_methods: " GET, ,POST ".into(),
            allowed_headers: "Content-Type,,".into(),
            max_age_secs: 600,
        });
        assert_eq!(policy.origins(), "https://a.com");
        assert_eq!(policy.methods(), "GET,POST");
        assert_eq!(policy.headers(), "Content-Type");
    }
}

//! Per-route parameter validation.
//!
//! Routes declare an explicit list of [`ParamRule`]s. The middleware applies
//! them in order; the first failure short-circuits with a 400 envelope and
//! nothing further down the chain runs. Parsed values land in request
//! extensions: [`ValidatedParams`] for path segments and [`OrganizationId`]
//! for the organization header.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State},
    http::{request::Parts, HeaderName},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::config::{ParamConfig, ParamKind};
use crate::error::ApiError;
use crate::observability::metrics;

pub const ORGANIZATION_HEADER: HeaderName = HeaderName::from_static("x-organization-id");
const ORGANIZATION_HEADER_DISPLAY: &str = "X-Organization-Id";

const MAX_IDENTIFIER_LEN: usize = 128;

/// A single validation step attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRule {
    /// Path segment must be a UUID.
    UuidPath(String),
    /// Path segment must match `^[A-Za-z][A-Za-z0-9_-]{0,127}$`.
    StringPath(String),
    /// `X-Organization-Id` must be present and a UUID.
    OrgHeader,
}

impl ParamRule {
    pub fn uuid_path(name: impl Into<String>) -> Self {
        ParamRule::UuidPath(name.into())
    }

    pub fn string_path(name: impl Into<String>) -> Self {
        ParamRule::StringPath(name.into())
    }

    pub fn org_header() -> Self {
        ParamRule::OrgHeader
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamRule::UuidPath(_) => "uuid_path",
            ParamRule::StringPath(_) => "string_path",
            ParamRule::OrgHeader => "org_header",
        }
    }
}

impl From<&ParamConfig> for ParamRule {
    fn from(config: &ParamConfig) -> Self {
        match config.kind {
            ParamKind::Uuid => ParamRule::uuid_path(config.name.clone()),
            ParamKind::String => ParamRule::string_path(config.name.clone()),
            ParamKind::OrgHeader => ParamRule::org_header(),
        }
    }
}

/// Path values that passed validation, keyed by segment name.
#[derive(Debug, Clone, Default)]
pub struct ValidatedParams {
    uuids: HashMap<String, Uuid>,
    strings: HashMap<String, String>,
}

impl ValidatedParams {
    pub fn uuid(&self, name: &str) -> Option<Uuid> {
        self.uuids.get(name).copied()
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }
}

/// Organization the request is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizationId(pub Uuid);

/// Returns true for strings matching `^[A-Za-z][A-Za-z0-9_-]{0,127}$`.
pub fn is_allowed_identifier(value: &str) -> bool {
    let bytes = value.as_bytes();
    match bytes.split_first() {
        Some((first, rest)) => {
            bytes.len() <= MAX_IDENTIFIER_LEN
                && first.is_ascii_alphabetic()
                && rest
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        }
        None => false,
    }
}

fn parse_uuid(value: &str) -> Option<Uuid> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Uuid::parse_str(value).ok()
}

fn path_value<'a>(params: Option<&'a RawPathParams>, name: &str) -> Option<&'a str> {
    params?
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn apply_rule(
    rule: &ParamRule,
    params: Option<&RawPathParams>,
    parts: &mut Parts,
    validated: &mut ValidatedParams,
) -> Result<(), ApiError> {
    match rule {
        ParamRule::UuidPath(name) => {
            let id = path_value(params, name)
                .and_then(parse_uuid)
                .ok_or_else(|| ApiError::InvalidPathParameter { name: name.clone() })?;
            validated.uuids.insert(name.clone(), id);
        }
        ParamRule::StringPath(name) => {
            let value = path_value(params, name)
                .filter(|v| is_allowed_identifier(v))
                .ok_or_else(|| ApiError::InvalidPathParameter { name: name.clone() })?;
            validated.strings.insert(name.clone(), value.to_string());
        }
        ParamRule::OrgHeader => {
            let org = parts
                .headers
                .get(ORGANIZATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_uuid)
                .ok_or(ApiError::InvalidHeaderParameter {
                    name: ORGANIZATION_HEADER_DISPLAY,
                })?;
            parts.extensions.insert(OrganizationId(org));
        }
    }
    Ok(())
}

/// Middleware applying `rules` in order.
///
/// Attach with `route_layer` so the matched route's path captures are
/// available.
pub async fn validate_params(
    State(rules): State<Arc<[ParamRule]>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let params = RawPathParams::from_request_parts(&mut parts, &()).await.ok();
    let mut validated = parts
        .extensions
        .remove::<ValidatedParams>()
        .unwrap_or_default();

    for rule in rules.iter() {
        if let Err(e) = apply_rule(rule, params.as_ref(), &mut parts, &mut validated) {
            tracing::debug!(rule = ?rule, path = %parts.uri.path(), "Rejected request parameters");
            metrics::record_validation_failure(rule.kind());
            return e.into_response();
        }
    }

    parts.extensions.insert(validated);
    next.run(Request::from_parts(parts, body)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorEnvelope;
    use axum::{
        body::Body,
        http::StatusCode,
        middleware,
        routing::get,
        Extension, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn app(path: &str, rules: Vec<ParamRule>, hits: Arc<AtomicUsize>) -> Router {
        let rules: Arc<[ParamRule]> = rules.into();
        Router::new()
            .route(
                path,
                get(move |Extension(params): Extension<ValidatedParams>| {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        params
                            .uuid("id")
                            .map(|u| u.to_string())
                            .or_else(|| params.string("name").map(str::to_string))
                            .unwrap_or_default()
                    }
                }),
            )
            .route_layer(middleware::from_fn_with_state(rules, validate_params))
    }

    async fn get_uri(app: Router, uri: &str, org: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(org) = org {
            builder = builder.header("X-Organization-Id", org);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[test]
    fn test_identifier_grammar() {
        for ok in ["a", "Report", "monthly_report-2", &format!("a{}", "b".repeat(127))] {
            assert!(is_allowed_identifier(ok), "{ok}");
        }
        for bad in [
            "",
            "1abc",
            "_abc",
            "..",
            "a.b",
            "a;b",
            "a/b",
            "a%2e",
            "ünïcode",
            "a b",
            &format!("a{}", "b".repeat(128)),
        ] {
            assert!(!is_allowed_identifier(bad), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_valid_uuid_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();
        let app = app("/v1/templates/{id}", vec![ParamRule::uuid_path("id")], hits.clone());

        let (status, body) = get_uri(app, &format!("/v1/templates/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, id.to_string().into_bytes());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_uuid_short_circuits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app("/v1/templates/{id}", vec![ParamRule::uuid_path("id")], hits.clone());

        for uri in ["/v1/templates/not-a-uuid", "/v1/templates/%20", "/v1/templates/123"] {
            let (status, body) = get_uri(app.clone(), uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            let envelope: ErrorEnvelope = serde_json::from_slice(&body).unwrap();
            assert_eq!(envelope.code, "TPL-0400");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_string_path_rejects_traversal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app("/v1/sources/{name}", vec![ParamRule::string_path("name")], hits.clone());

        let (status, body) = get_uri(app.clone(), "/v1/sources/postgres_main", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"postgres_main");

        for uri in [
            "/v1/sources/%2e%2e",
            "/v1/sources/..%2fetc",
            "/v1/sources/a;drop",
            "/v1/sources/caf%C3%A9",
            "/v1/sources/a.b",
        ] {
            let (status, _) = get_uri(app.clone(), uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_org_header_required() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app("/v1/reports", vec![ParamRule::org_header()], hits.clone());

        let (status, body) = get_uri(app.clone(), "/v1/reports", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let envelope: ErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.code, "TPL-0402");

        let (status, _) = get_uri(app.clone(), "/v1/reports", Some("nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let org = Uuid::new_v4().to_string();
        let (status, _) = get_uri(app, "/v1/reports", Some(&org)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rules_apply_in_order() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(
            "/v1/templates/{id}",
            vec![ParamRule::uuid_path("id"), ParamRule::org_header()],
            hits.clone(),
        );

        // Path failure is reported even though the header is also missing.
        let (_, body) = get_uri(app, "/v1/templates/nope", None).await;
        let envelope: ErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.code, "TPL-0400");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rule_from_config() {
        let rule = ParamRule::from(&ParamConfig {
            kind: ParamKind::String,
            name: "name".into(),
        });
        assert_eq!(rule, ParamRule::string_path("name"));
    }
}

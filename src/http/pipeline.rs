//! Admission pipeline assembly.
//!
//! # Layer order (outer → inner)
//! ```text
//! Recover → Security Headers → Telemetry → CORS → RateLimit → Validators → Handler
//! ```
//!
//! Infrastructure routes get only Recover, Security Headers and Telemetry.
//! Swagger routes additionally get the configurator but never CORS or rate
//! limiting. Both are merged after the admission layers are applied to the
//! API routes, so those layers never wrap them. The CORS and rate-limit
//! middlewares still skip infrastructure paths themselves in case an API
//! route is registered on one.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, MethodRouter},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::infra::{self, Readiness};
use crate::http::swagger::{self, SwaggerInfo};
use crate::http::validators::{validate_params, ParamRule};
use crate::security::cors::{cors_middleware, CorsPolicy};
use crate::security::headers::security_headers;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::security::recover::recover;

/// Builder composing the admission layers around registered routes.
pub struct AdmissionPipeline {
    api: Router,
    infra: Option<Router>,
    swagger: Option<Router>,
    limiter: Arc<RateLimiter>,
    cors: Arc<CorsPolicy>,
    request_timeout: Option<Duration>,
}

impl AdmissionPipeline {
    pub fn new(limiter: Arc<RateLimiter>, cors: Arc<CorsPolicy>) -> Self {
        Self {
            api: Router::new(),
            infra: None,
            swagger: None,
            limiter,
            cors,
            request_timeout: None,
        }
    }

    /// Deadline for API handlers. Infrastructure routes are not affected.
    /// A zero duration disables the deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Register an API route. `rules` run in order before `method_router`.
    pub fn api_route(mut self, path: &str, method_router: MethodRouter, rules: Vec<ParamRule>) -> Self {
        let mut route = Router::new().route(path, method_router);
        if !rules.is_empty() {
            let rules: Arc<[ParamRule]> = rules.into();
            route = route.route_layer(middleware::from_fn_with_state(rules, validate_params));
        }
        self.api = self.api.merge(route);
        self
    }

    /// Route everything not otherwise matched to `method_router`, with no
    /// parameter rules.
    pub fn api_fallback(mut self, method_router: MethodRouter) -> Self {
        self.api = self.api.fallback_service(method_router);
        self
    }

    pub fn infra_routes(mut self, readiness: Readiness) -> Self {
        self.infra = Some(infra::routes(readiness));
        self
    }

    pub fn swagger(mut self, info: SwaggerInfo) -> Self {
        let info = Arc::new(info);
        self.swagger = Some(
            Router::new()
                .route(swagger::DOC_PATH, get(swagger::doc_handler))
                .layer(middleware::from_fn_with_state(info, swagger::swagger_configurator)),
        );
        self
    }

    #[allow(deprecated)]
    pub fn build(self) -> Router {
        let mut app = self.api;

        if let Some(timeout) = self.request_timeout {
            app = app.layer(TimeoutLayer::new(timeout));
        }
        if self.limiter.is_enabled() {
            app = app.layer(middleware::from_fn_with_state(self.limiter, rate_limit_middleware));
        }
        app = app.layer(middleware::from_fn_with_state(self.cors, cors_middleware));

        if let Some(infra) = self.infra {
            app = app.merge(infra);
        }
        if let Some(swagger) = self.swagger {
            app = app.merge(swagger);
        }

        app.layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(security_headers())
            .layer(recover())
    }
}

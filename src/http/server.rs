//! HTTP server setup and upstream forwarding.
//!
//! # Responsibilities
//! - Build the admission pipeline from configuration
//! - Register the configured routes with their parameter rules
//! - Forward admitted requests to the upstream business service
//! - Bind with peer address info and shut down gracefully

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Method, Request, Uri,
    },
    response::{IntoResponse, Response},
    routing::{any, on, MethodFilter, MethodRouter},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::validation::{validate_routes, ValidationError};
use crate::config::{EdgeConfig, RouteConfig};
use crate::error::ApiError;
use crate::http::infra::Readiness;
use crate::http::pipeline::AdmissionPipeline;
use crate::http::swagger::SwaggerInfo;
use crate::http::validators::ParamRule;
use crate::observability::metrics;
use crate::security::cors::CorsPolicy;
use crate::security::rate_limit::RateLimiter;
use crate::store::CounterStore;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid upstream URL {0:?}: expected scheme://host[:port]")]
    InvalidUpstream(String),

    #[error("invalid routes: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    InvalidRoutes(Vec<ValidationError>),
}

/// Where admitted requests go.
#[derive(Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    client: Client<HttpConnector, Body>,
}

impl Upstream {
    pub fn new(base_url: &str) -> Result<Self, ServerError> {
        let invalid = || ServerError::InvalidUpstream(base_url.to_string());
        let uri = Uri::from_str(base_url).map_err(|_| invalid())?;
        let (Some(scheme), Some(authority)) = (uri.scheme().cloned(), uri.authority().cloned())
        else {
            return Err(invalid());
        };

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self {
            scheme,
            authority,
            client,
        })
    }

    fn rewrite(&self, uri: &Uri) -> Result<Uri, ApiError> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).map_err(|_| ApiError::BadGateway)
    }
}

/// Forward the request unchanged apart from the target URI.
async fn proxy_handler(State(upstream): State<Upstream>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let (mut parts, body) = request.into_parts();

    parts.uri = match upstream.rewrite(&parts.uri) {
        Ok(uri) => uri,
        Err(e) => return e.into_response(),
    };
    let path = parts.uri.path().to_string();

    tracing::debug!(method = %method, path = %path, "Forwarding request");

    match upstream.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(method = %method, path = %path, error = %e, "Upstream error");
            metrics::record_request(method.as_str(), 502);
            ApiError::BadGateway.into_response()
        }
    }
}

fn method_router(route: &RouteConfig, upstream: &Upstream) -> MethodRouter {
    let filter = route
        .methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .filter_map(|m| MethodFilter::try_from(m).ok())
        .reduce(|a, b| a.or(b));

    match filter {
        Some(filter) => on(filter, proxy_handler).with_state(upstream.clone()),
        None => any(proxy_handler).with_state(upstream.clone()),
    }
}

/// HTTP server for the admission edge.
pub struct HttpServer {
    router: Router,
    readiness: Readiness,
}

impl HttpServer {
    /// Build the server from configuration.
    ///
    /// Routes are re-checked here because the router refuses, by panicking,
    /// templates and overlaps it cannot register.
    pub fn new(config: &EdgeConfig, store: Arc<dyn CounterStore>) -> Result<Self, ServerError> {
        validate_routes(&config.routes).map_err(ServerError::InvalidRoutes)?;
        let upstream = Upstream::new(&config.upstream.base_url)?;
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, store));
        let cors = Arc::new(CorsPolicy::new(&config.cors));
        let readiness = Readiness::new();

        let mut pipeline = AdmissionPipeline::new(limiter, cors)
            .request_timeout(Duration::from_secs(config.listener.request_timeout_secs))
            .infra_routes(readiness.clone())
            .swagger(SwaggerInfo::from_env());

        for route in &config.routes {
            let rules = route.params.iter().map(ParamRule::from).collect();
            pipeline = pipeline.api_route(&route.path, method_router(route, &upstream), rules);
            tracing::info!(path = %route.path, methods = ?route.methods, "Registered route");
        }

        let router = pipeline
            .api_fallback(any(proxy_handler).with_state(upstream))
            .build();

        Ok(Self { router, readiness })
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        self.readiness.mark_ready();
        let readiness = self.readiness.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                readiness.mark_not_ready();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

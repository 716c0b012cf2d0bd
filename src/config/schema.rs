//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the admission edge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Business service admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Three-tier rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Cross-origin policy, exactly as supplied by the operator.
    pub cors: CorsConfig,

    /// Shared counter store.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Proxied API routes and their parameter rules.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whole-request timeout in seconds. Zero disables it.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Upstream business service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. "http://127.0.0.1:3000".
    pub base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Master switch. When false the limiter is a pass-through.
    pub enabled: bool,

    /// Requests per window for reads and everything not otherwise classified.
    pub global_max: u64,

    /// Requests per window for paths ending in `/download`.
    pub export_max: u64,

    /// Requests per window for POST/PUT/PATCH/DELETE.
    pub dispatch_max: u64,

    /// Window length in seconds, shared by all tiers.
    pub window_secs: u64,

    /// Trusted proxy header carrying the client address (e.g. "X-Forwarded-For").
    /// Unset means the peer address is used.
    pub client_ip_header: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_max: 100,
            export_max: 10,
            dispatch_max: 30,
            window_secs: 60,
            client_ip_header: None,
        }
    }
}

/// CORS configuration. Lists are comma-separated and sanitized at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: String,
    pub allowed_methods: String,
    pub allowed_headers: String,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: String::new(),
            allowed_methods: "GET,POST,PUT,PATCH,DELETE,OPTIONS".to_string(),
            allowed_headers: "Origin,Content-Type,Accept,Authorization,X-Organization-Id"
                .to_string(),
            max_age_secs: 600,
        }
    }
}

/// Counter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Remote store URL. Unset selects the in-process store.
    pub redis_url: Option<String>,

    /// Per-call deadline in milliseconds (capped at 2000).
    pub op_timeout_ms: u64,

    /// How often the in-process store evicts expired counters.
    pub sweep_interval_secs: u64,

    /// Delay between reconnect attempts when the remote store was
    /// unreachable at startup.
    pub reconnect_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            op_timeout_ms: 2000,
            sweep_interval_secs: 60,
            reconnect_interval_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "json" for production, "pretty" for development.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// A proxied API route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path template in router syntax, e.g. "/v1/templates/{id}".
    pub path: String,

    /// Allowed methods. Empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Parameter rules applied before the request is forwarded.
    #[serde(default)]
    pub params: Vec<ParamConfig>,
}

/// One parameter rule on a route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParamConfig {
    pub kind: ParamKind,

    /// Path segment name. Ignored for `org_header`.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Uuid,
    String,
    OrgHeader,
}

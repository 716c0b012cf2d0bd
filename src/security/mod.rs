//! Security subsystem: the admission side of the edge.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → recover.rs    (outermost, panics → 500)
//!     → headers.rs    (hardening headers on every response)
//!     → cors.rs       (skipped for infrastructure and Swagger paths)
//!     → rate_limit.rs (skipped for infrastructure paths)
//!     → Pass to route validators and handlers
//! ```
//!
//! # Design Decisions
//! - Sanitize configuration instead of failing startup on it
//! - Fail open on counter store outages, fail closed on bad input
//! - No trust in client input

pub mod cors;
pub mod headers;
pub mod rate_limit;
pub mod recover;
pub mod sanitize;

/// Orchestration endpoints. Matched by exact equality.
pub const INFRASTRUCTURE_PATHS: [&str; 3] = ["/health", "/ready", "/version"];

/// Every path under this prefix is API documentation.
pub const SWAGGER_PREFIX: &str = "/swagger";

pub fn is_infrastructure_path(path: &str) -> bool {
    INFRASTRUCTURE_PATHS.contains(&path)
}

/// CORS is not applied to infrastructure or documentation paths.
pub fn bypasses_cors(path: &str) -> bool {
    is_infrastructure_path(path) || path.starts_with(SWAGGER_PREFIX)
}

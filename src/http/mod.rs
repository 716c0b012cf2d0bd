//! HTTP admission subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, peer address, graceful shutdown)
//!     → pipeline.rs (recover, security headers, telemetry, CORS, rate limit)
//!     → validators.rs (per-route path/header rules)
//!     → upstream business service (server.rs proxy handler)
//! ```
//!
//! `infra.rs` and `swagger.rs` serve the endpoints that sit outside CORS and
//! rate limiting.

pub mod infra;
pub mod pipeline;
pub mod server;
pub mod swagger;
pub mod validators;

pub use infra::Readiness;
pub use pipeline::AdmissionPipeline;
pub use server::{HttpServer, ServerError};
pub use validators::{OrganizationId, ParamRule, ValidatedParams};

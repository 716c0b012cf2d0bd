//! HTTP admission edge for the multi-tenant reporting service.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::EdgeConfig;
pub use error::ApiError;
pub use http::{AdmissionPipeline, HttpServer};
pub use lifecycle::Shutdown;

//! Fixed hardening headers set on every response.
//!
//! Applied once at the application root, outside telemetry and CORS, so that
//! error responses produced by inner middlewares carry them too.

use axum::http::{header, HeaderName, HeaderValue};
use tower::ServiceBuilder;
use tower::layer::util::{Identity, Stack};
use tower_http::set_header::SetResponseHeaderLayer;

pub const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "0"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
];

type Overriding = SetResponseHeaderLayer<HeaderValue>;

/// The four security headers as a single layer stack.
pub type SecurityHeadersLayer =
    Stack<Overriding, Stack<Overriding, Stack<Overriding, Stack<Overriding, Identity>>>>;

/// Build the layer. Values override anything set by inner handlers.
pub fn security_headers() -> SecurityHeadersLayer {
    let [a, b, c, d] = SECURITY_HEADERS.map(|(name, value)| {
        SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
    });

    ServiceBuilder::new()
        .layer(a)
        .layer(b)
        .layer(c)
        .layer(d)
        .into_inner()
}

//! Panic recovery.
//!
//! Must wrap every other layer so that a panic anywhere below (handlers or
//! middlewares) becomes a 500 envelope instead of tearing down the connection
//! task.

use std::any::Any;

use axum::{body::Body, http::Response, response::IntoResponse};
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::ApiError;
use crate::observability::metrics;

type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response<Body>;

pub type RecoverLayer = CatchPanicLayer<PanicHandler>;

pub fn recover() -> RecoverLayer {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };

    tracing::error!(panic = %detail, "Recovered from panic in request handling");
    metrics::record_panic_recovered();

    ApiError::RecoveredPanic.into_response()
}

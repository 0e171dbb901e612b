//! Request identification.
//!
//! # Responsibilities
//! - Name the request ID header shared by middleware and `Context`
//! - Open one tracing span per request carrying method, URI and request ID
//!
//! # Design Decisions
//! - Request ID added as early as possible (outermost layer) for tracing
//! - A client-supplied `x-request-id` is kept and echoed back

use axum::http::Request;
use tower_http::trace::MakeSpan;
use tracing::Span;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Span factory for `TraceLayer` that records the request ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

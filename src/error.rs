//! Per-request error type returned by route handlers.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised while a handler builds its response.
///
/// Every variant is recovered into an HTTP response by the dispatcher; none
/// of them can take the server down.
#[derive(Debug, Error)]
pub enum GasError {
    /// A template is missing or its syntax is invalid.
    #[error("template error: {0}")]
    Template(#[source] minijinja::Error),

    /// A template compiled but evaluating it failed (e.g. undefined variable).
    #[error("render error: {0}")]
    Render(#[source] minijinja::Error),

    /// A JSON response body could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A body-writing operation ran after the response was already written.
    #[error("response already written with status {0}")]
    AlreadyWritten(StatusCode),

    /// The request body could not be read.
    #[error("request body error: {0}")]
    Body(String),

    /// Abort the request with an explicit status and message.
    #[error("{1}")]
    Http(StatusCode, String),
}

impl GasError {
    /// Status code used when this error reaches the dispatcher before any
    /// body was written.
    pub fn status(&self) -> StatusCode {
        match self {
            GasError::Http(status, _) => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body sent to the client for this error. Internal details stay in the
    /// logs.
    pub fn public_message(&self) -> String {
        match self {
            GasError::Http(_, message) => message.clone(),
            other => other
                .status()
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
        }
    }
}

/// Result alias for handler code.
pub type GasResult<T = ()> = Result<T, GasError>;

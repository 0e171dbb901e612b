//! Response assembly.
//!
//! # Responsibilities
//! - Content-Type values written by the body helpers
//! - Canonical JSON encoding (compact, object keys sorted)
//! - Turn a handler's written state, or its error, into an axum `Response`
//!
//! # Design Decisions
//! - Bodies are buffered; the handler never touches the socket
//! - Staged headers survive on error responses
//! - Error bodies carry the reason phrase, never internal details

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::GasError;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML_UTF8: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";

/// Status and body recorded by the first body-writing call.
#[derive(Debug, Clone)]
pub(crate) struct Written {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Encode `value` as compact JSON with object keys sorted at every level.
///
/// Encoding the same value twice yields identical bytes regardless of the
/// iteration order of the source map.
pub fn canonical_json<T>(value: &T) -> Result<Vec<u8>, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let value = canonicalize(serde_json::to_value(value)?);
    serde_json::to_vec(&value)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Build the response for a handler outcome.
pub(crate) fn finish(
    headers: HeaderMap,
    written: Option<Written>,
    outcome: Result<(), GasError>,
) -> Response {
    match (written, outcome) {
        (Some(written), Ok(())) => build(written.status, headers, written.body),
        (None, Ok(())) => build(StatusCode::OK, headers, Bytes::new()),
        (Some(written), Err(err)) => {
            tracing::warn!(
                error = %err,
                status = %written.status,
                "Handler failed after writing a response; keeping the written response"
            );
            build(written.status, headers, written.body)
        }
        (None, Err(err)) => error_response(headers, &err),
    }
}

fn error_response(mut headers: HeaderMap, err: &GasError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(error = %err, status = %status, "Handler failed");
    } else {
        tracing::debug!(error = %err, status = %status, "Handler aborted");
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF8));
    build(status, headers, Bytes::from(err.public_message()))
}

fn build(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    (status, headers, Body::from(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_canonical_json_sorts_keys() {
        let mut map = HashMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);

        let encoded = canonical_json(&map).unwrap();
        assert_eq!(encoded, br#"{"alpha":2,"mid":3,"zeta":1}"#);
        assert_eq!(encoded, canonical_json(&map).unwrap());
    }

    #[test]
    fn test_canonical_json_nested() {
        let value = serde_json::json!({"b": [{"y": 1, "x": 2}], "a": null});
        let encoded = canonical_json(&value).unwrap();
        assert_eq!(encoded, br#"{"a":null,"b":[{"x":2,"y":1}]}"#);
    }

    #[test]
    fn test_canonical_json_rejects_non_string_keys() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], "v");
        assert!(canonical_json(&map).is_err());
    }

    #[test]
    fn test_finish_without_write() {
        let response = finish(HeaderMap::new(), None, Ok(()));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_finish_error_keeps_staged_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("version", HeaderValue::from_static("1.0"));
        let response = finish(headers, None, Err(GasError::Body("boom".into())));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["version"], "1.0");
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_PLAIN_UTF8);
    }

    #[test]
    fn test_finish_error_after_write_keeps_response() {
        let written = Written {
            status: StatusCode::CREATED,
            body: Bytes::from_static(b"done"),
        };
        let response = finish(
            HeaderMap::new(),
            Some(written),
            Err(GasError::AlreadyWritten(StatusCode::CREATED)),
        );
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

//! Per-request context handed to route handlers.
//!
//! # Responsibilities
//! - Expose the request (method, path, route params, query, headers, body)
//! - Stage response headers
//! - Write exactly one response body (`string`, `html`, `json`, `render`)
//!
//! # Design Decisions
//! - First body write wins; a second one is an `AlreadyWritten` error
//! - Headers are accepted until the first body write, ignored afterwards
//! - A body helper sets its Content-Type only if the handler has not

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    response::Response,
};
use serde::Serialize;

use crate::error::GasError;
use crate::http::request::X_REQUEST_ID;
use crate::http::response::{self, Written, APPLICATION_JSON_UTF8, TEXT_HTML_UTF8, TEXT_PLAIN_UTF8};
use crate::templates::TemplateCache;

/// Request/response mediator for a single request.
pub struct Context {
    request: Request<Body>,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    written: Option<Written>,
    templates: Arc<TemplateCache>,
    body_limit: usize,
    body_taken: bool,
}

impl Context {
    pub(crate) fn new(
        request: Request<Body>,
        params: Vec<(String, String)>,
        templates: Arc<TemplateCache>,
        body_limit: usize,
    ) -> Self {
        Self {
            request,
            params,
            headers: HeaderMap::new(),
            written: None,
            templates,
            body_limit,
            body_taken: false,
        }
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// Value of a route parameter, e.g. `id` for `/users/{id}`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First decoded value of a query string parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.request.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Request header value, if present and valid UTF-8.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Request ID assigned by the request-id middleware.
    pub fn request_id(&self) -> Option<&str> {
        self.request_header(X_REQUEST_ID)
    }

    /// Read the whole request body, bounded by `server.max_body_size`.
    ///
    /// The body can only be read once.
    pub async fn body_bytes(&mut self) -> Result<Bytes, GasError> {
        if self.body_taken {
            return Err(GasError::Body("request body already consumed".into()));
        }
        self.body_taken = true;
        let body = std::mem::take(self.request.body_mut());
        axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| GasError::Body(e.to_string()))
    }

    /// Set a response header. The last value for a name wins.
    ///
    /// Invalid names or values are dropped with a warning, as are headers set
    /// after the body was written.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(written) = &self.written {
            tracing::warn!(
                header = %name,
                status = %written.status,
                "Header set after response body was written; ignoring"
            );
            return;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Invalid response header; ignoring"),
        }
    }

    /// Headers staged for the response so far.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.written.as_ref().map(|w| w.status)
    }

    pub fn is_written(&self) -> bool {
        self.written.is_some()
    }

    /// Write `value` verbatim as a `text/plain` body.
    pub fn string(&mut self, status: StatusCode, value: impl Into<String>) -> Result<(), GasError> {
        self.write(status, TEXT_PLAIN_UTF8, Bytes::from(value.into()))
    }

    /// Write `value` verbatim as a `text/html` body.
    pub fn html(&mut self, status: StatusCode, value: impl Into<String>) -> Result<(), GasError> {
        self.write(status, TEXT_HTML_UTF8, Bytes::from(value.into()))
    }

    /// Write the canonical JSON encoding of `value`.
    pub fn json<T>(&mut self, status: StatusCode, value: &T) -> Result<(), GasError>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_unwritten()?;
        let body = response::canonical_json(value)?;
        self.write(status, APPLICATION_JSON_UTF8, Bytes::from(body))
    }

    /// Render `layout` composed with `contents` and write it with status 200.
    ///
    /// `contents` must name at least one template; an empty slice is a
    /// `GasError::Template` and nothing is written.
    pub fn render<T>(&mut self, data: &T, layout: &str, contents: &[&str]) -> Result<(), GasError>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_unwritten()?;
        let body = self.templates.render(data, layout, contents)?;
        self.write(StatusCode::OK, TEXT_HTML_UTF8, Bytes::from(body))
    }

    fn ensure_unwritten(&self) -> Result<(), GasError> {
        match &self.written {
            Some(written) => Err(GasError::AlreadyWritten(written.status)),
            None => Ok(()),
        }
    }

    fn write(&mut self, status: StatusCode, content_type: &'static str, body: Bytes) -> Result<(), GasError> {
        self.ensure_unwritten()?;
        self.headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(content_type));
        self.written = Some(Written { status, body });
        Ok(())
    }

    /// Assemble the final response for the handler's outcome.
    pub(crate) fn finish(self, outcome: Result<(), GasError>) -> Response {
        response::finish(self.headers, self.written, outcome)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("params", &self.params)
            .field("status", &self.status())
            .finish()
    }
}

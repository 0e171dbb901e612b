//! Shared utilities for integration tests.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use gas::Gas;
use tower::ServiceExt;

pub const CONFIG: &str = "testfiles/config_test.yaml";

/// A response collected from an in-process request.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    #[allow(dead_code)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Build an application from the shared test configuration.
#[allow(dead_code)]
pub fn new_gas() -> Gas {
    Gas::new(CONFIG).expect("test config loads")
}

/// Send a request through the application's middleware stack without a socket.
#[allow(dead_code)]
pub async fn send(gas: &Gas, method: Method, uri: &str, body: impl Into<Body>) -> TestResponse {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap();

    let response = gas.app().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

#[allow(dead_code)]
pub async fn get(gas: &Gas, uri: &str) -> TestResponse {
    send(gas, Method::GET, uri, Body::empty()).await
}

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, middleware stack)
//!     → request.rs (request ID, trace span)
//!     → [routing layer matches method + path]
//!     → context.rs (handler reads request, writes one body)
//!     → response.rs (status, headers, body assembled)
//!     → Send to client
//! ```

pub mod context;
pub mod request;
pub mod response;
pub mod server;

pub use context::Context;
pub use request::X_REQUEST_ID;
pub use server::Gas;

//! gas: a thin web-serving helper layer over axum.
//!
//! A [`Gas`] application owns a [`Router`]; handlers receive a per-request
//! [`Context`] and write one response body through `string`, `html`, `json`
//! or `render`.
//!
//! ```no_run
//! use gas::{Gas, StatusCode};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut gas = Gas::new("gas.yaml")?;
//! gas.router.get("/", |ctx| {
//!     Box::pin(async move {
//!         ctx.set_header("Version", "1.0");
//!         ctx.string(StatusCode::OK, "hello")
//!     })
//! })?;
//!
//! let listener = tokio::net::TcpListener::bind(&gas.config().server.bind_address).await?;
//! gas.run(listener).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod templates;

pub use axum::http::StatusCode;
pub use config::{ConfigError, GasConfig};
pub use error::{GasError, GasResult};
pub use http::{Context, Gas};
pub use lifecycle::Shutdown;
pub use routing::{HandlerFuture, RouteError, Router};
pub use templates::TemplateCache;

//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     (method, path, handler)
//!     → pattern.rs (validate, compute shape)
//!     → router.rs (conflict check, store)
//!
//! Serving:
//!     router.rs builds the axum router (one method router per pattern)
//!     → axum matches method + path
//!     → dispatch builds a Context and runs the handler
//! ```
//!
//! # Design Decisions
//! - Routes fixed at startup, immutable at runtime
//! - Conflicts are registration errors, not request-time surprises
//! - Deterministic: same input always matches same route

pub mod pattern;
pub mod router;

pub use pattern::Pattern;
pub use router::{HandlerFuture, RouteError, Router};

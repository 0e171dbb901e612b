//! Template rendering subsystem.
//!
//! # Data Flow
//! ```text
//! Context::render(data, layout, contents)
//!     → cache.rs (lookup by path tuple, compile on first use)
//!     → minijinja environment (layout extended by content blocks)
//!     → rendered String
//!
//! On file change (templates.watch):
//!     watcher.rs detects change
//!     → cache cleared
//!     → next render recompiles
//! ```

pub mod cache;
pub mod watcher;

pub use cache::TemplateCache;
pub use watcher::TemplateWatcher;

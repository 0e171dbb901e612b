//! Template directory watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::templates::cache::TemplateCache;

/// Clears a [`TemplateCache`] whenever a file under its root changes.
pub struct TemplateWatcher {
    path: PathBuf,
    cache: Arc<TemplateCache>,
}

impl TemplateWatcher {
    /// Create a watcher for the cache's template root.
    pub fn new(cache: Arc<TemplateCache>) -> Self {
        Self {
            path: cache.root().to_path_buf(),
            cache,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start watching in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let cache = self.cache.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        tracing::info!(paths = ?event.paths, "Template change detected, clearing cache");
                        cache.invalidate();
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::Recursive)?;

        tracing::info!(path = ?self.path, "Template watcher started");
        Ok(watcher)
    }
}

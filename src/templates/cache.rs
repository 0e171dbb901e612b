//! Compiled template cache.
//!
//! A layout plus its content fragments compile into one `minijinja`
//! environment whose entry template is
//!
//! ```text
//! {% extends "<layout>" %}<content 1 source><content 2 source>...
//! ```
//!
//! so fragments fill the blocks the layout declares. Environments are cached
//! by the (layout, contents...) path tuple and rendered many times.
//!
//! Each key owns a slot with its own lock. The map shard is only held long
//! enough to fetch the slot, so compiling one key never stalls lookups of
//! another, while concurrent first renders of the same key compile once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use minijinja::{
    default_auto_escape_callback, path_loader, Environment, Error, ErrorKind, UndefinedBehavior,
};
use serde::Serialize;

use crate::config::TemplateConfig;
use crate::error::GasError;
use crate::observability::metrics;

const ENTRY: &str = "__gas_entry__";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TemplateKey(Vec<String>);

impl TemplateKey {
    fn new(layout: &str, contents: &[&str]) -> Self {
        let mut parts = Vec::with_capacity(contents.len() + 1);
        parts.push(layout.to_string());
        parts.extend(contents.iter().map(|c| c.to_string()));
        Self(parts)
    }
}

type Slot = Arc<Mutex<Option<Arc<Environment<'static>>>>>;

/// Thread-safe cache of composed templates.
pub struct TemplateCache {
    root: PathBuf,
    enabled: bool,
    compiled: DashMap<TemplateKey, Slot>,
    compiles: AtomicUsize,
}

impl TemplateCache {
    /// Create an empty cache resolving template paths against `root`.
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            root: root.into(),
            enabled,
            compiled: DashMap::new(),
            compiles: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &TemplateConfig) -> Self {
        Self::new(&config.root, config.cache)
    }

    /// Directory template paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of compiled compositions held.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Number of successful compilations since the cache was created.
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    /// Drop every compiled composition; the next render recompiles.
    pub fn invalidate(&self) {
        self.compiled.clear();
        metrics::record_template_cache_size(0);
    }

    /// Render `layout` composed with `contents`, using `data` as context.
    ///
    /// At least one content template is required.
    pub fn render<T>(&self, data: &T, layout: &str, contents: &[&str]) -> Result<String, GasError>
    where
        T: Serialize + ?Sized,
    {
        if contents.is_empty() {
            return Err(GasError::Template(Error::new(
                ErrorKind::InvalidOperation,
                format!("no content templates given for layout {layout}"),
            )));
        }
        let env = self.environment(layout, contents)?;
        let template = env.get_template(ENTRY).map_err(GasError::Template)?;
        template.render(data).map_err(|err| match err.kind() {
            // Raised by includes resolved at render time.
            ErrorKind::TemplateNotFound | ErrorKind::SyntaxError => GasError::Template(err),
            _ => GasError::Render(err),
        })
    }

    fn environment(&self, layout: &str, contents: &[&str]) -> Result<Arc<Environment<'static>>, GasError> {
        if !self.enabled {
            return self.compile(layout, contents).map(Arc::new);
        }

        let key = TemplateKey::new(layout, contents);
        let slot = Arc::clone(&self.compiled.entry(key.clone()).or_default());

        let mut compiled = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(env) = compiled.as_ref() {
            return Ok(env.clone());
        }
        match self.compile(layout, contents) {
            Ok(env) => {
                let env = Arc::new(env);
                *compiled = Some(env.clone());
                drop(compiled);
                metrics::record_template_cache_size(self.compiled.len());
                Ok(env)
            }
            Err(err) => {
                drop(compiled);
                // Failures are not cached; a fixed template compiles next time.
                self.compiled.remove_if(&key, |_, held| Arc::ptr_eq(held, &slot));
                Err(err)
            }
        }
    }

    fn compile(&self, layout: &str, contents: &[&str]) -> Result<Environment<'static>, GasError> {
        let mut env = Environment::new();
        env.set_loader(path_loader(self.root.clone()));
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        // The entry template escapes like its layout.
        let layout_name = layout.to_string();
        env.set_auto_escape_callback(move |name| {
            if name == ENTRY {
                default_auto_escape_callback(&layout_name)
            } else {
                default_auto_escape_callback(name)
            }
        });

        env.get_template(layout).map_err(GasError::Template)?;

        let mut source = format!("{{% extends {:?} %}}", layout);
        for content in contents {
            let fragment = env.get_template(content).map_err(GasError::Template)?;
            source.push_str(fragment.source());
        }
        env.add_template_owned(ENTRY, source)
            .map_err(GasError::Template)?;

        self.compiles.fetch_add(1, Ordering::Relaxed);
        metrics::record_template_compile();
        tracing::debug!(
            root = %self.root.display(),
            layout = %layout,
            contents = ?contents,
            "Template compiled"
        );
        Ok(env)
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("root", &self.root)
            .field("enabled", &self.enabled)
            .field("entries", &self.compiled.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    const LAYOUT: &str = "<title>{{ title }}</title>{% block body %}{% endblock %}";

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("layout.html"), LAYOUT).unwrap();
        fs::write(
            dir.path().join("page.html"),
            "{% block body %}<p>{{ title }}</p>{% endblock %}",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_compose_layout_and_content() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);

        let out = cache
            .render(&json!({"title": "hi"}), "layout.html", &["page.html"])
            .unwrap();
        assert_eq!(out, "<title>hi</title><p>hi</p>");
        assert_eq!(cache.len(), 1);

        // Served from cache, identical output.
        let again = cache
            .render(&json!({"title": "hi"}), "layout.html", &["page.html"])
            .unwrap();
        assert_eq!(out, again);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_html_is_escaped() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);
        let out = cache
            .render(&json!({"title": "<b>"}), "layout.html", &["page.html"])
            .unwrap();
        assert_eq!(out, "<title>&lt;b&gt;</title><p>&lt;b&gt;</p>");
    }

    #[test]
    fn test_multiple_fragments() {
        let dir = fixture();
        fs::write(
            dir.path().join("two.html"),
            "{% block head %}{% endblock %}|{% block body %}{% endblock %}",
        )
        .unwrap();
        fs::write(dir.path().join("head.html"), "{% block head %}H{% endblock %}").unwrap();
        fs::write(dir.path().join("body.html"), "{% block body %}B{% endblock %}").unwrap();

        let cache = TemplateCache::new(dir.path(), true);
        let out = cache
            .render(&json!({}), "two.html", &["head.html", "body.html"])
            .unwrap();
        assert_eq!(out, "H|B");
    }

    #[test]
    fn test_missing_template() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);

        let err = cache
            .render(&json!({}), "nope.html", &["page.html"])
            .unwrap_err();
        assert!(matches!(err, GasError::Template(_)));

        let err = cache
            .render(&json!({}), "layout.html", &["nope.html"])
            .unwrap_err();
        assert!(matches!(err, GasError::Template(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_syntax_error() {
        let dir = fixture();
        fs::write(dir.path().join("broken.html"), "{% block body %}{{ title ").unwrap();
        let cache = TemplateCache::new(dir.path(), true);

        let err = cache
            .render(&json!({"title": "x"}), "layout.html", &["broken.html"])
            .unwrap_err();
        assert!(matches!(err, GasError::Template(_)));
    }

    #[test]
    fn test_undefined_variable_is_render_error() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);

        let err = cache
            .render(&json!({}), "layout.html", &["page.html"])
            .unwrap_err();
        assert!(matches!(err, GasError::Render(_)));
    }

    #[test]
    fn test_invalidate_picks_up_changes() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);
        let data = json!({"title": "t"});

        cache.render(&data, "layout.html", &["page.html"]).unwrap();
        fs::write(
            dir.path().join("page.html"),
            "{% block body %}<i>{{ title }}</i>{% endblock %}",
        )
        .unwrap();

        // Still cached.
        let out = cache.render(&data, "layout.html", &["page.html"]).unwrap();
        assert_eq!(out, "<title>t</title><p>t</p>");

        cache.invalidate();
        let out = cache.render(&data, "layout.html", &["page.html"]).unwrap();
        assert_eq!(out, "<title>t</title><i>t</i>");
    }

    #[test]
    fn test_concurrent_first_renders_compile_once() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);
        let barrier = std::sync::Barrier::new(16);
        let data = json!({"title": "t"});

        let outputs: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache.render(&data, "layout.html", &["page.html"]).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(outputs.iter().all(|out| out == "<title>t</title><p>t</p>"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.compiles(), 1);
    }

    #[test]
    fn test_compiling_one_key_does_not_block_others() {
        let dir = fixture();
        fs::write(dir.path().join("other.html"), "{% block body %}o{% endblock %}").unwrap();
        let cache = TemplateCache::new(dir.path(), true);
        let data = json!({"title": "t"});

        // Hold the slot of one key locked as if it were mid-compile.
        let key = TemplateKey::new("layout.html", &["page.html"]);
        let slot = Arc::clone(&cache.compiled.entry(key).or_default());
        let _busy = slot.lock().unwrap();

        let out = cache.render(&data, "layout.html", &["other.html"]).unwrap();
        assert_eq!(out, "<title>t</title>o");
    }

    #[test]
    fn test_empty_contents_is_template_error() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);
        let err = cache
            .render(&json!({"title": "t"}), "layout.html", &[])
            .unwrap_err();
        assert!(matches!(err, GasError::Template(_)));
        assert!(cache.is_empty());
        assert_eq!(cache.compiles(), 0);
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), true);
        let data = json!({"title": "t"});

        assert!(cache.render(&data, "layout.html", &["late.html"]).is_err());
        assert!(cache.is_empty());

        fs::write(dir.path().join("late.html"), "{% block body %}L{% endblock %}").unwrap();
        let out = cache.render(&data, "layout.html", &["late.html"]).unwrap();
        assert_eq!(out, "<title>t</title>L");
        assert_eq!(cache.compiles(), 1);
    }

    #[test]
    fn test_disabled_cache_recompiles() {
        let dir = fixture();
        let cache = TemplateCache::new(dir.path(), false);
        cache
            .render(&json!({"title": "t"}), "layout.html", &["page.html"])
            .unwrap();
        cache
            .render(&json!({"title": "t"}), "layout.html", &["page.html"])
            .unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.compiles(), 2);
    }
}

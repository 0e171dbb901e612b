//! Application bootstrap and HTTP serving.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Own the template cache and the route registry
//! - Wire up middleware (request ID, tracing, panics, timeout, metrics)
//! - Bind server to listener and shut down gracefully

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use notify::RecommendedWatcher;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{load_config, validation::validate_config, ConfigError, GasConfig};
use crate::http::request::RequestSpan;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics::track_metrics;
use crate::routing::Router;
use crate::templates::{TemplateCache, TemplateWatcher};

/// A gas application: configuration, templates and routes.
pub struct Gas {
    /// Route registry; register handlers here before serving.
    pub router: Router,
    config: Arc<GasConfig>,
    templates: Arc<TemplateCache>,
    _watcher: Option<RecommendedWatcher>,
}

impl Gas {
    /// Build an application from a configuration file.
    ///
    /// A missing or malformed file is a startup error; the application
    /// cannot run without its configuration.
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = load_config(config_path.as_ref())?;
        Self::from_config(config)
    }

    /// Build an application from an in-memory configuration.
    pub fn from_config(config: GasConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let templates = Arc::new(TemplateCache::from_config(&config.templates));
        let watcher = if config.templates.watch {
            Some(
                TemplateWatcher::new(templates.clone())
                    .run()
                    .map_err(ConfigError::Watch)?,
            )
        } else {
            None
        };
        let router = Router::new(templates.clone(), config.server.max_body_size);

        tracing::info!(
            bind_address = %config.server.bind_address,
            template_root = %config.templates.root,
            template_cache = config.templates.cache,
            request_timeout_secs = config.server.request_timeout_secs,
            "Configuration loaded"
        );

        Ok(Self {
            router,
            config: Arc::new(config),
            templates,
            _watcher: watcher,
        })
    }

    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    pub fn templates(&self) -> &Arc<TemplateCache> {
        &self.templates
    }

    /// Build the axum router for every registered route, with middleware.
    #[allow(deprecated)]
    pub fn app(&self) -> axum::Router {
        let mut router = self.router.handler();
        // route_layer panics on a router without routes.
        if !self.router.is_empty() {
            router = router.route_layer(middleware::from_fn(track_metrics));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CatchPanicLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    self.config.server.request_timeout_secs,
                ))),
        )
    }

    /// Serve on `listener` until SIGINT or SIGTERM.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let shutdown = Shutdown::new();
        signals::spawn_signal_handler(shutdown.clone());
        self.serve(listener, shutdown).await
    }

    /// Serve on `listener` until `shutdown` is triggered, then drain
    /// in-flight requests.
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let mut stop = shutdown.subscribe();
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.router.len(),
            "HTTP server starting"
        );

        let app = self.app();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Gas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gas")
            .field("router", &self.router)
            .field("config", &self.config)
            .field("templates", &self.templates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = GasConfig::default();
        config.server.request_timeout_secs = 0;
        assert!(matches!(
            Gas::from_config(config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_app_without_routes() {
        let gas = Gas::from_config(GasConfig::default()).unwrap();
        assert!(gas.router.is_empty());
        let _ = gas.app();
    }
}

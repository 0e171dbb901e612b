//! Route registration and dispatch.
//!
//! # Responsibilities
//! - Store (method, pattern, handler) registrations
//! - Reject conflicting patterns at registration time
//! - Build the axum router, one method router per pattern, in registration
//!   order
//! - Adapt handlers: build a `Context`, await the handler, assemble the
//!   response
//!
//! # Design Decisions
//! - Immutable once serving starts (the axum router is built from a snapshot)
//! - Handler errors become responses; nothing propagates to the server

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, RawPathParams},
    http::{Method, Request},
    response::Response,
    routing::{on, MethodFilter},
};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::error::GasError;
use crate::http::Context;
use crate::routing::pattern::Pattern;
use crate::templates::TemplateCache;

/// Future returned by a route handler.
pub type HandlerFuture<'a> = BoxFuture<'a, Result<(), GasError>>;

type BoxedHandler = Arc<dyn for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync>;

/// Errors raised while registering routes.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("route {method} {path} conflicts with existing route {existing}")]
    Conflict {
        method: Method,
        path: String,
        existing: String,
    },

    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),
}

struct Route {
    method: Method,
    filter: MethodFilter,
    pattern: Pattern,
    handler: BoxedHandler,
}

/// Registry of route handlers.
pub struct Router {
    routes: Vec<Route>,
    // Mirrors the matcher axum builds, so overlaps surface on registration.
    matcher: matchit::Router<()>,
    templates: Arc<TemplateCache>,
    body_limit: usize,
}

impl Router {
    /// Create an empty router whose contexts render through `templates`.
    pub fn new(templates: Arc<TemplateCache>, body_limit: usize) -> Self {
        Self {
            routes: Vec::new(),
            matcher: matchit::Router::new(),
            templates,
            body_limit,
        }
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(Method::GET, path, handler)
    }

    pub fn post<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(Method::POST, path, handler)
    }

    pub fn put<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(Method::PUT, path, handler)
    }

    pub fn patch<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(Method::PATCH, path, handler)
    }

    pub fn delete<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(Method::DELETE, path, handler)
    }

    pub fn head<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(Method::HEAD, path, handler)
    }

    pub fn options<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.handle(Method::OPTIONS, path, handler)
    }

    /// Register `handler` for `method` requests matching `path`.
    pub fn handle<F>(&mut self, method: Method, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RouteError::UnsupportedMethod(method.clone()))?;
        let pattern = Pattern::parse(path)?;

        // Same shape is only allowed for another method with the exact same
        // parameter names.
        if let Some(existing) = self.routes.iter().find(|r| {
            r.pattern.shape() == pattern.shape()
                && (r.method == method || r.pattern.as_str() != pattern.as_str())
        }) {
            return Err(RouteError::Conflict {
                method,
                path: path.to_string(),
                existing: format!("{} {}", existing.method, existing.pattern.as_str()),
            });
        }

        // Other methods on an identical path share its matcher entry.
        if !self.routes.iter().any(|r| r.pattern.as_str() == pattern.as_str()) {
            self.matcher.insert(path, ()).map_err(|err| match err {
                matchit::InsertError::Conflict { with } => RouteError::Conflict {
                    method: method.clone(),
                    path: path.to_string(),
                    existing: self.describe(&with),
                },
                other => RouteError::InvalidPath {
                    path: path.to_string(),
                    reason: other.to_string(),
                },
            })?;
        }

        tracing::debug!(method = %method, path = %path, "Route registered");
        self.routes.push(Route {
            method,
            filter,
            pattern,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    fn describe(&self, path: &str) -> String {
        let methods: Vec<String> = self
            .routes
            .iter()
            .filter(|r| r.pattern.as_str() == path)
            .map(|r| r.method.to_string())
            .collect();
        if methods.is_empty() {
            path.to_string()
        } else {
            format!("{} {}", methods.join(","), path)
        }
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered (method, pattern) pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.pattern.as_str()))
    }

    /// Build the axum router serving every registered route.
    ///
    /// Paths are added in registration order, the order the matcher
    /// accepted them in; axum merges methods registered on the same path.
    pub fn handler(&self) -> axum::Router {
        self.routes.iter().fold(axum::Router::new(), |router, route| {
            let handler = route.handler.clone();
            let templates = self.templates.clone();
            let body_limit = self.body_limit;
            let endpoint = move |request: Request<Body>| {
                dispatch(handler.clone(), templates.clone(), body_limit, request)
            };
            router.route(route.pattern.as_str(), on(route.filter, endpoint))
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| format!("{} {}", r.method, r.pattern.as_str())))
            .finish()
    }
}

async fn dispatch(
    handler: BoxedHandler,
    templates: Arc<TemplateCache>,
    body_limit: usize,
    request: Request<Body>,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(raw) => raw
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        Err(_) => Vec::new(),
    };

    let mut ctx = Context::new(Request::from_parts(parts, body), params, templates, body_limit);
    let outcome = handler(&mut ctx).await;
    ctx.finish(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn router() -> Router {
        Router::new(Arc::new(TemplateCache::new(".", true)), 1024)
    }

    fn ok(ctx: &mut Context) -> HandlerFuture<'_> {
        Box::pin(async move { ctx.string(StatusCode::OK, "ok") })
    }

    #[test]
    fn test_register_methods_on_same_path() {
        let mut router = router();
        router
            .get("/users/{id}", ok)
            .unwrap()
            .post("/users/{id}", ok)
            .unwrap()
            .delete("/users/{id}", ok)
            .unwrap();
        assert_eq!(router.len(), 3);

        let registered: Vec<_> = router.routes().map(|(m, p)| format!("{m} {p}")).collect();
        assert_eq!(
            registered,
            vec!["GET /users/{id}", "POST /users/{id}", "DELETE /users/{id}"]
        );
    }

    #[test]
    fn test_duplicate_route_conflicts() {
        let mut router = router();
        router.get("/", ok).unwrap();
        let err = router.get("/", ok).unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
        assert_eq!(err.to_string(), "route GET / conflicts with existing route GET /");
    }

    #[test]
    fn test_same_shape_different_names_conflicts() {
        let mut router = router();
        router.get("/users/{id}", ok).unwrap();
        assert!(matches!(
            router.get("/users/{name}", ok),
            Err(RouteError::Conflict { .. })
        ));
        assert!(matches!(
            router.post("/users/{name}", ok),
            Err(RouteError::Conflict { .. })
        ));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_overlapping_param_and_catch_all_conflict() {
        let mut root = router();
        root.get("/{id}", ok).unwrap();
        let err = root.get("/{*rest}", ok).unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
        assert!(err.to_string().starts_with("route GET /{*rest} conflicts"));
        assert_eq!(root.len(), 1);

        let mut files = router();
        files.get("/files/{*p}", ok).unwrap();
        assert!(matches!(
            files.get("/files/{id}/x", ok),
            Err(RouteError::Conflict { .. })
        ));
        assert!(matches!(
            files.post("/files/{id}/x", ok),
            Err(RouteError::Conflict { .. })
        ));
        assert_eq!(files.len(), 1);

        // Only accepted routes reach the axum router.
        let _ = root.handler();
        let _ = files.handler();
    }

    #[test]
    fn test_rejected_route_leaves_registry_usable() {
        let mut router = router();
        router.get("/{id}", ok).unwrap();
        assert!(router.get("/{*rest}", ok).is_err());
        router.post("/{id}", ok).unwrap();
        router.get("/static/app.js", ok).unwrap();
        assert_eq!(router.len(), 3);
        let _ = router.handler();
    }

    #[test]
    fn test_invalid_path_rejected() {
        let mut router = router();
        assert!(matches!(
            router.get("no-slash", ok),
            Err(RouteError::InvalidPath { .. })
        ));
        assert!(router.is_empty());
    }

    #[test]
    fn test_unsupported_method() {
        let mut router = router();
        let method = Method::from_bytes(b"PURGE").unwrap();
        assert!(matches!(
            router.handle(method, "/", ok),
            Err(RouteError::UnsupportedMethod(_))
        ));
    }
}

//! Radix-tree request router with a middleware stack in front of it.
//!
//! One tree per HTTP method. O(path-length) lookup. Middleware registered with
//! [`Router::with`] runs in registration order *before* the route lookup, the
//! way `app.use(...)` does in Express, so a rewrite can change which route is
//! chosen.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::trace;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve),
/// or wrap it in an `Arc` and drive it directly with [`Router::handle`].
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    pub(crate) stack: Vec<BoxedMiddleware>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), stack: Vec::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the route conflicts with an existing one or is malformed.
    /// Routes are fixed at startup, so this is a programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Append a middleware to the stack. The first one registered runs first.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.stack.push(Arc::new(middleware));
        self
    }

    /// Runs `req` through the middleware stack and then the matching route.
    pub fn handle(self: &Arc<Self>, req: Request) -> BoxFuture {
        Next::new(Arc::clone(self)).run(req)
    }

    /// The innermost step of the chain: route lookup and handler call.
    pub(crate) fn route(self: Arc<Self>, mut req: Request) -> BoxFuture {
        Box::pin(async move {
            let Some((handler, params)) = self.lookup(&req.method, &req.path) else {
                trace!(method = %req.method, path = %req.path, "no route");
                return Response::status(StatusCode::NOT_FOUND);
            };
            req.params = params;
            handler.call(req).await
        })
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

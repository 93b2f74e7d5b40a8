//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the router and the response
//! on its way back. Each one receives the request plus a [`Next`] handle for
//! the rest of the chain and decides whether to short-circuit, mutate, or
//! forward:
//!
//! ```text
//! request ─▶ mw[0] ─▶ mw[1] ─▶ … ─▶ router ─▶ handler
//!                                              │
//! response ◀─ mw[0] ◀─ mw[1] ◀─ … ◀────────────┘
//! ```
//!
//! Built-in middleware:
//! - [`csrf`]: double-submit-cookie CSRF protection backed by a token store
//! - [`keyauth`]: API key extraction and validation
//! - [`load_shed`]: per-request deadline with a fallback handler
//! - [`redirect`] / [`rewrite`]: glob rules over the request path
//! - [`request_id`]: `X-Request-ID` propagation
//! - [`response_time`]: `X-Response-Time` stamping

use std::future::Future;
use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::IntoResponse;
use crate::router::Router;

pub mod csrf;
pub mod keyauth;
pub mod load_shed;
pub mod redirect;
pub mod request_id;
pub mod response_time;
pub mod rewrite;

/// A request interceptor.
///
/// Implement it on your own types, or wrap an async closure with [`from_fn`].
/// The returned future must be `'static`: clone whatever configuration it
/// needs out of `&self` before building it.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// Predicate that lets a request bypass a middleware when it returns `true`.
pub type Skip = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// The remainder of the middleware chain, ending in the router.
pub struct Next {
    router: Arc<Router>,
    index: usize,
}

impl Next {
    pub(crate) fn new(router: Arc<Router>) -> Self {
        Self { router, index: 0 }
    }

    /// Runs the next middleware, or the route handler once the stack is
    /// exhausted.
    pub fn run(mut self, req: Request) -> BoxFuture {
        match self.router.stack.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware.call(req, self)
            }
            None => self.router.route(req),
        }
    }
}

/// Adapts an async closure into a [`Middleware`].
///
/// ```rust
/// use tether::middleware::{from_fn, Next};
/// use tether::Request;
///
/// let mw = from_fn(|req: Request, next: Next| async move {
///     let mut res = next.run(req).await;
///     res.set_header("x-powered-by", "tether");
///     res
/// });
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F> {
    FromFn(f)
}

/// Middleware built by [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self.0)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Returns `true` when `skip` is set and says so.
pub(crate) fn skipped(skip: Option<&Skip>, req: &Request) -> bool {
    skip.is_some_and(|f| f(req))
}

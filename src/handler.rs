//! Route handlers and their type-erased storage.
//!
//! Routes, the load-shedding fallback and the CSRF/key-auth error handlers all
//! hold handlers of unrelated closure types, so each one is boxed once at
//! registration:
//!
//! ```text
//! |req: Request| async { … }                ← any Fn(Request) -> impl Future
//!        ↓ into_boxed_handler()
//! Arc<dyn ErasedHandler>                    ← BoxedHandler, shared by clone
//!        ↓ call(req)
//! BoxFuture<Response>                       ← IntoResponse applied here
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Boxed future returned by handlers and middleware. `Send + 'static` so the
/// load-shedding gate can move it onto its own task.
pub type BoxFuture<T = Response> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Object-safe call interface behind [`BoxedHandler`].
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Anything that can answer a request.
///
/// Satisfied by every `Fn(Request) -> impl Future<Output = impl IntoResponse>`
/// that is `Send + Sync + 'static`; async fns and closures both qualify.
/// Sealed, so the blanket impl is the only one.
pub trait Handler: sealed::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod sealed {
    pub trait Sealed {}
}

impl<F, Fut, R> sealed::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(Erased(self))
    }
}

struct Erased<F>(F);

impl<F, Fut, R> ErasedHandler for Erased<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

//! Per-request deadline with a fallback response.
//!
//! The downstream chain runs as its own task and races a timer:
//!
//! ```text
//!            ┌── downstream task ──▶ response ─┐
//! request ───┤                                 ├──▶ first one wins
//!            └── sleep(timeout) ──▶ on_shed ───┘
//! ```
//!
//! Whichever side finishes first produces the response; the other is dropped,
//! so a request is answered exactly once. On timeout the [`Deadline`] token is
//! cancelled and the task aborted. Handlers that want to stop early can watch
//! the token through the request extensions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::StatusCode;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::{skipped, Middleware, Next, Skip};
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The deadline imposed on the current request.
#[derive(Clone, Debug)]
pub struct Deadline {
    /// `None` when the timeout reaches past what the clock can represent.
    at: Option<Instant>,
    token: CancellationToken,
}

impl Deadline {
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Resolves once the gate gives up on this request.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Load-shedding middleware.
pub struct LoadShed {
    timeout: Duration,
    on_shed: BoxedHandler,
    exclude: Option<Skip>,
}

impl LoadShed {
    /// Answers with `on_shed` when the downstream needs longer than `timeout`.
    pub fn new(timeout: Duration, on_shed: impl Handler) -> Self {
        Self { timeout, on_shed: on_shed.into_boxed_handler(), exclude: None }
    }

    /// Requests for which `f` returns `true` bypass the gate entirely.
    pub fn with_exclude(mut self, f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.exclude = Some(Arc::new(f));
        self
    }
}

impl Middleware for LoadShed {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        if skipped(self.exclude.as_ref(), &req) {
            return next.run(req);
        }
        let timeout = self.timeout;
        let on_shed = Arc::clone(&self.on_shed);

        Box::pin(async move {
            let token = CancellationToken::new();
            let at = Instant::now().checked_add(timeout);
            req.extensions_mut().insert(Deadline { at, token: token.clone() });
            let expiry = async move {
                match at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            let fallback = req.clone();
            let mut downstream = AbortOnDrop(tokio::spawn(next.run(req)));

            tokio::select! {
                biased;

                joined = &mut downstream => match joined {
                    Ok(res) => res,
                    Err(e) => {
                        error!(error = %e, "downstream handler failed");
                        Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                },

                () = expiry => {
                    token.cancel();
                    downstream.0.abort();
                    warn!(
                        path = %fallback.path(),
                        timeout_ms = timeout.as_millis() as u64,
                        "request shed after deadline"
                    );
                    on_shed.call(fallback).await
                }
            }
        })
    }
}

/// Aborts the task when dropped, so downstream work never outlives the
/// request even if the caller stops polling.
struct AbortOnDrop(JoinHandle<Response>);

impl Future for AbortOnDrop {
    type Output = Result<Response, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;
    use http::Method;

    use super::*;
    use crate::router::Router;

    async fn shed(_req: Request) -> Response {
        Response::builder().status(StatusCode::SERVICE_UNAVAILABLE).text("busy")
    }

    fn get(uri: &str) -> Request {
        Request::from_http(http::Request::get(uri).body(Bytes::new()).unwrap())
    }

    fn app(gate: LoadShed, finished: Arc<AtomicBool>) -> Arc<Router> {
        Arc::new(
            Router::new()
                .with(gate)
                .on(Method::GET, "/fast", |_req: Request| async { "fast" })
                .on(Method::GET, "/slow", move |_req: Request| {
                    let finished = Arc::clone(&finished);
                    async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        finished.store(true, Ordering::SeqCst);
                        "slow"
                    }
                }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fast_downstream_wins() {
        let app = app(LoadShed::new(Duration::from_secs(1), shed), Arc::default());
        let res = app.handle(get("/fast")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"fast");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_downstream_is_shed_and_aborted() {
        let finished = Arc::new(AtomicBool::new(false));
        let app = app(LoadShed::new(Duration::from_secs(1), shed), Arc::clone(&finished));

        let res = app.handle(get("/slow")).await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body(), b"busy");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!finished.load(Ordering::SeqCst), "aborted task must not complete");
    }

    #[tokio::test(start_paused = true)]
    async fn excluded_requests_bypass_the_gate() {
        let gate = LoadShed::new(Duration::from_secs(1), shed).with_exclude(|req| req.path() == "/slow");
        let app = app(gate, Arc::default());
        let res = app.handle(get("/slow")).await;
        assert_eq!(res.body(), b"slow");
    }

    #[tokio::test(start_paused = true)]
    async fn handler_sees_the_deadline() {
        let app = Arc::new(
            Router::new()
                .with(LoadShed::new(Duration::from_secs(1), shed))
                .on(Method::GET, "/watch", |req: Request| async move {
                    let deadline = req.extensions().get::<Deadline>().cloned();
                    match deadline {
                        Some(d) if !d.is_expired() => "watched",
                        _ => "unwatched",
                    }
                }),
        );
        let res = app.handle(get("/watch")).await;
        assert_eq!(res.body(), b"watched");
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_never_sheds() {
        let finished = Arc::new(AtomicBool::new(false));
        let app = app(LoadShed::new(Duration::MAX, shed), Arc::clone(&finished));

        assert_eq!(app.handle(get("/fast")).await.body(), b"fast");
        let res = app.handle(get("/slow")).await;
        assert_eq!(res.body(), b"slow");
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_deadline_has_no_instant() {
        let app = Arc::new(
            Router::new()
                .with(LoadShed::new(Duration::MAX, shed))
                .on(Method::GET, "/watch", |req: Request| async move {
                    match req.extensions().get::<Deadline>() {
                        Some(d) if d.instant().is_none() && !d.is_expired() => "open",
                        _ => "bounded",
                    }
                }),
        );
        assert_eq!(app.handle(get("/watch")).await.body(), b"open");
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_downstream_is_a_500() {
        let app = Arc::new(
            Router::new()
                .with(LoadShed::new(Duration::from_secs(1), shed))
                .on(Method::GET, "/panic", |_req: Request| async {
                    if true {
                        panic!("handler bug");
                    }
                    "unreachable"
                }),
        );
        let res = app.handle(get("/panic")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Client-visible redirects driven by glob rules.
//!
//! A matching request is answered immediately with a `Location` header; the
//! original query string is carried over. Everything else continues down the
//! chain.

use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use super::{skipped, Middleware, Next, Skip};
use crate::error::Result;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::rules::RuleSet;

/// Configuration for [`Redirect`].
#[derive(Clone)]
pub struct Config {
    /// `(glob, target)` pairs, tried in order.
    pub rules: Vec<(String, String)>,
    /// Defaults to `302 Found`.
    pub status: StatusCode,
    pub skip: Option<Skip>,
}

impl Default for Config {
    fn default() -> Self {
        Self { rules: Vec::new(), status: StatusCode::FOUND, skip: None }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, glob: impl Into<String>, target: impl Into<String>) -> Self {
        self.rules.push((glob.into(), target.into()));
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_skip(mut self, f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.skip = Some(Arc::new(f));
        self
    }
}

/// Redirecting middleware.
pub struct Redirect {
    rules: RuleSet,
    status: StatusCode,
    skip: Option<Skip>,
}

impl Redirect {
    /// Compiles the rules. A rule that fails to compile is an error and no
    /// middleware is produced.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            rules: RuleSet::new(config.rules)?,
            status: config.status,
            skip: config.skip,
        })
    }
}

impl Middleware for Redirect {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        if skipped(self.skip.as_ref(), &req) {
            return next.run(req);
        }
        let Some(mut location) = self.rules.apply(req.path()) else {
            return next.run(req);
        };
        if let Some(query) = req.query().filter(|q| !q.is_empty()) {
            location.push('?');
            location.push_str(query);
        }
        debug!(from = %req.path(), to = %location, status = self.status.as_u16(), "redirect");
        let res = Response::builder()
            .status(self.status)
            .header("location", &location)
            .no_body();
        Box::pin(async move { res })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Method;

    use super::*;
    use crate::router::Router;

    fn get(uri: &str) -> Request {
        Request::from_http(http::Request::get(uri).body(Bytes::new()).unwrap())
    }

    fn app(config: Config) -> Arc<Router> {
        Arc::new(
            Router::new()
                .with(Redirect::new(config).unwrap())
                .on(Method::GET, "/stay", |_req: Request| async { "stayed" }),
        )
    }

    #[tokio::test]
    async fn keeps_query_string() {
        let app = app(Config::new().rule("/params", "/with_params"));
        let res = app.handle(get("/params?q=1")).await;
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/with_params?q=1"));
    }

    #[tokio::test]
    async fn substitutes_captures_with_custom_status() {
        let app = app(
            Config::new()
                .rule("/old/*", "https://example.com/new/$1")
                .with_status(StatusCode::MOVED_PERMANENTLY),
        );
        let res = app.handle(get("/old/a/b")).await;
        assert_eq!(res.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.header("location"), Some("https://example.com/new/a/b"));
    }

    #[tokio::test]
    async fn unmatched_request_reaches_handler() {
        let app = app(Config::new().rule("/params", "/with_params"));
        let res = app.handle(get("/stay")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"stayed");
    }
}

//! Request id propagation.
//!
//! An inbound id is trusted and echoed back; otherwise one is generated. The
//! id is stored in the request extensions as [`RequestId`] and written to the
//! response header.

use std::sync::Arc;

use super::{skipped, Middleware, Next, Skip};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::session::{uuid_generator, KeyGenerator};

pub const DEFAULT_HEADER: &str = "X-Request-ID";

/// The id assigned to the current request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestId(pub String);

/// Configuration for [`RequestIdLayer`].
#[derive(Clone)]
pub struct Config {
    pub header: String,
    pub generator: KeyGenerator,
    pub skip: Option<Skip>,
}

impl Default for Config {
    fn default() -> Self {
        Self { header: DEFAULT_HEADER.to_owned(), generator: uuid_generator(), skip: None }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_generator(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generator = Arc::new(f);
        self
    }

    pub fn with_skip(mut self, f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.skip = Some(Arc::new(f));
        self
    }
}

/// Request-id middleware.
pub struct RequestIdLayer {
    config: Arc<Config>,
}

impl RequestIdLayer {
    pub fn new(config: Config) -> Self {
        Self { config: Arc::new(config) }
    }
}

impl Default for RequestIdLayer {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Middleware for RequestIdLayer {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        if skipped(self.config.skip.as_ref(), &req) {
            return next.run(req);
        }
        let config = Arc::clone(&self.config);
        let id = req.header(&config.header)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| (config.generator)());
        req.extensions_mut().insert(RequestId(id.clone()));

        Box::pin(async move {
            let mut res = next.run(req).await;
            res.set_header(&config.header, id);
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Method;

    use super::*;
    use crate::router::Router;

    fn app(config: Config) -> Arc<Router> {
        Arc::new(
            Router::new()
                .with(RequestIdLayer::new(config))
                .on(Method::GET, "/", |req: Request| async move {
                    req.extensions().get::<RequestId>().map(|id| id.0.clone()).unwrap_or_default()
                }),
        )
    }

    fn get(headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::get("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        Request::from_http(builder.body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn echoes_inbound_id() {
        let app = app(Config::new());
        let res = app.handle(get(&[("x-request-id", "abc-123")])).await;
        assert_eq!(res.header("X-Request-ID"), Some("abc-123"));
        assert_eq!(res.body(), b"abc-123");
    }

    #[tokio::test]
    async fn generates_when_missing_or_empty() {
        let app = app(Config::new().with_generator(|| "generated".to_owned()));
        for headers in [&[][..], &[("x-request-id", "")][..]] {
            let res = app.handle(get(headers)).await;
            assert_eq!(res.header("x-request-id"), Some("generated"));
            assert_eq!(res.body(), b"generated");
        }
    }

    #[tokio::test]
    async fn default_generator_is_uuid() {
        let app = app(Config::new().with_header("X-Trace"));
        let res = app.handle(get(&[])).await;
        let id = res.header("x-trace").unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }
}

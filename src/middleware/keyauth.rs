//! API key authentication.
//!
//! The key is pulled from the request with an [`Extractor`] built from the
//! configured lookup (by default `Authorization: Bearer <key>`) and handed to
//! the validator. Accepted keys are stored in the request extensions as
//! [`ApiKey`].

use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use super::{skipped, Middleware, Next, Skip};
use crate::error::{Error, Result};
use crate::extractor::{ExtractError, Extractor};
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

pub const DEFAULT_KEY_LOOKUP: &str = "header:Authorization";
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// The key that authenticated the current request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiKey(pub String);

/// Why authentication failed; inserted into the request extensions before
/// the error handler runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum KeyAuthError {
    #[error("missing or malformed API key: {0}")]
    Missing(ExtractError),
    #[error("invalid or expired API key")]
    Invalid,
}

pub type Validator = Arc<dyn Fn(&Request, &str) -> bool + Send + Sync>;

/// Configuration for [`KeyAuth`].
#[derive(Clone)]
pub struct Config {
    /// `source:key` pairs, see [`Extractor::parse_lookup`].
    pub key_lookup: String,
    /// Only applies to `header:` lookups. Empty reads the raw header value.
    pub auth_scheme: String,
    /// Required.
    pub validator: Option<Validator>,
    /// Defaults to `401 Unauthorized` with a short reason in the body.
    pub error_handler: Option<BoxedHandler>,
    pub skip: Option<Skip>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_lookup: DEFAULT_KEY_LOOKUP.to_owned(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_owned(),
            validator: None,
            error_handler: None,
            skip: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_lookup(mut self, lookup: impl Into<String>) -> Self {
        self.key_lookup = lookup.into();
        self
    }

    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    pub fn with_validator(mut self, f: impl Fn(&Request, &str) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(f));
        self
    }

    pub fn with_error_handler(mut self, handler: impl Handler) -> Self {
        self.error_handler = Some(handler.into_boxed_handler());
        self
    }

    pub fn with_skip(mut self, f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.skip = Some(Arc::new(f));
        self
    }
}

/// Key-auth middleware.
pub struct KeyAuth {
    extractor: Extractor,
    validator: Validator,
    error_handler: Option<BoxedHandler>,
    skip: Option<Skip>,
}

impl KeyAuth {
    /// Fails when no validator is configured or the lookup is malformed.
    pub fn new(config: Config) -> Result<Self> {
        let validator = config
            .validator
            .ok_or(Error::InvalidConfig("keyauth requires a validator"))?;
        Ok(Self {
            extractor: Extractor::parse_lookup(&config.key_lookup, &config.auth_scheme)?,
            validator,
            error_handler: config.error_handler,
            skip: config.skip,
        })
    }

    fn reject(&self, mut req: Request, reason: KeyAuthError) -> BoxFuture {
        debug!(%reason, path = %req.path(), "api key rejected");
        req.extensions_mut().insert(reason);
        if let Some(handler) = &self.error_handler {
            return handler.call(req);
        }
        let body = match reason {
            KeyAuthError::Missing(_) => "Missing or malformed API Key",
            KeyAuthError::Invalid => "Invalid or expired API Key",
        };
        Box::pin(async move {
            Response::builder().status(StatusCode::UNAUTHORIZED).text(body)
        })
    }
}

impl Middleware for KeyAuth {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        if skipped(self.skip.as_ref(), &req) {
            return next.run(req);
        }
        let key = match self.extractor.extract(&req) {
            Ok(key) => key,
            Err(e) => return self.reject(req, KeyAuthError::Missing(e)),
        };
        if !(self.validator)(&req, &key) {
            return self.reject(req, KeyAuthError::Invalid);
        }
        req.extensions_mut().insert(ApiKey(key));
        next.run(req)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Method;

    use super::*;
    use crate::router::Router;

    fn get(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::get(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        Request::from_http(builder.body(Bytes::new()).unwrap())
    }

    fn app(config: Config) -> Arc<Router> {
        Arc::new(
            Router::new()
                .with(KeyAuth::new(config).unwrap())
                .on(Method::GET, "/", |req: Request| async move {
                    req.extensions().get::<ApiKey>().map(|k| k.0.clone()).unwrap_or_default()
                })
                .on(Method::GET, "/public", |_req: Request| async { "public" }),
        )
    }

    fn valid_is_secret() -> Config {
        Config::new().with_validator(|_req, key| key == "secret")
    }

    #[tokio::test]
    async fn bearer_key_is_accepted() {
        let res = app(valid_is_secret()).handle(get("/", &[("authorization", "Bearer secret")])).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"secret");
    }

    #[tokio::test]
    async fn missing_malformed_and_invalid_keys() {
        let app = app(valid_is_secret());

        let res = app.handle(get("/", &[])).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.body(), b"Missing or malformed API Key");

        let res = app.handle(get("/", &[("authorization", "Basic secret")])).await;
        assert_eq!(res.body(), b"Missing or malformed API Key");

        let res = app.handle(get("/", &[("authorization", "Bearer wrong")])).await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.body(), b"Invalid or expired API Key");
    }

    #[tokio::test]
    async fn lookup_chain_falls_back_to_query() {
        let app = app(valid_is_secret().with_key_lookup("header:X-Api-Key,query:api_key").with_auth_scheme(""));
        let res = app.handle(get("/?api_key=secret", &[])).await;
        assert_eq!(res.body(), b"secret");
        let res = app.handle(get("/", &[("x-api-key", "secret")])).await;
        assert_eq!(res.body(), b"secret");
    }

    #[tokio::test]
    async fn skip_and_custom_error_handler() {
        let config = valid_is_secret()
            .with_skip(|req| req.path() == "/public")
            .with_error_handler(|req: Request| async move {
                match req.extensions().get::<KeyAuthError>() {
                    Some(KeyAuthError::Invalid) => (StatusCode::FORBIDDEN, "invalid"),
                    _ => (StatusCode::UNAUTHORIZED, "missing"),
                }
            });
        let app = app(config);

        assert_eq!(app.handle(get("/public", &[])).await.body(), b"public");
        let res = app.handle(get("/", &[("authorization", "Bearer nope")])).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn validator_is_required() {
        assert!(matches!(KeyAuth::new(Config::new()), Err(Error::InvalidConfig(_))));
    }
}

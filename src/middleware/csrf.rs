//! Double-submit-cookie CSRF protection.
//!
//! Safe methods (GET, HEAD, OPTIONS, TRACE) are handed a token in a cookie.
//! Every other method must echo that token through the configured lookup
//! (a header by default), and the token must still be known to the store:
//!
//! ```text
//! GET  /form     ──▶ Set-Cookie: csrf_=<t>           (t stored with a TTL)
//! POST /form     ──▶ X-Csrf-Token: <t>, Cookie: csrf_=<t>
//!                    ├─ match + stored ──▶ handler, t retired, new token issued
//!                    └─ otherwise      ──▶ 403
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use http::{Method, StatusCode};
use rand::Rng;
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use super::{skipped, Middleware, Next, Skip};
use crate::cookie::{Cookie, SameSite};
use crate::error::Result;
use crate::extractor::{ExtractError, Extractor};
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;
use crate::session::KeyGenerator;
use crate::storage::{Storage, TokenStorage};

pub const DEFAULT_KEY_LOOKUP: &str = "header:X-Csrf-Token";
pub const DEFAULT_COOKIE_NAME: &str = "csrf_";
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60 * 60);

/// The token issued for the current request, readable by handlers that
/// embed it in forms.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CsrfToken(pub String);

/// Why a request was rejected; inserted into the request extensions before
/// the error handler runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CsrfError {
    #[error("csrf cookie missing")]
    MissingCookie,
    #[error("csrf token missing: {0}")]
    MissingToken(ExtractError),
    #[error("csrf token mismatch")]
    Mismatch,
    #[error("csrf token unknown or expired")]
    Unknown,
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn random_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Configuration for [`Csrf`].
#[derive(Clone)]
pub struct Config {
    /// `source:key` pairs, see [`Extractor::parse_lookup`].
    pub key_lookup: String,
    pub cookie_name: String,
    pub cookie_domain: String,
    pub cookie_path: String,
    pub cookie_secure: bool,
    pub cookie_http_only: bool,
    pub cookie_same_site: String,
    pub cookie_session_only: bool,
    pub expiration: Duration,
    /// `None` builds a [`TokenStorage`] sweeping every 10 seconds.
    pub storage: Option<Arc<dyn Storage>>,
    pub key_generator: KeyGenerator,
    /// Defaults to a bare `403 Forbidden`.
    pub error_handler: Option<BoxedHandler>,
    pub skip: Option<Skip>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_lookup: DEFAULT_KEY_LOOKUP.to_owned(),
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            cookie_domain: String::new(),
            cookie_path: "/".to_owned(),
            cookie_secure: false,
            cookie_http_only: false,
            cookie_same_site: "Lax".to_owned(),
            cookie_session_only: false,
            expiration: DEFAULT_EXPIRATION,
            storage: None,
            key_generator: Arc::new(random_token),
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

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_key_generator(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.key_generator = Arc::new(f);
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

struct Inner {
    config: Config,
    extractor: Extractor,
    storage: Arc<dyn Storage>,
}

/// CSRF middleware.
pub struct Csrf {
    inner: Arc<Inner>,
}

impl Csrf {
    /// Builds the middleware. Fails when the lookup string is malformed.
    pub fn new(mut config: Config) -> Result<Self> {
        let extractor = Extractor::parse_lookup(&config.key_lookup, "")?;
        let storage = config.storage.take().unwrap_or_else(|| Arc::new(TokenStorage::new()));
        Ok(Self { inner: Arc::new(Inner { config, extractor, storage }) })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }
}

impl Inner {
    fn is_known(&self, token: &str) -> bool {
        self.storage.get(token).is_ok()
    }

    /// Checks an unsafe request. On success the presented token is retired.
    fn validate(&self, req: &Request) -> std::result::Result<(), CsrfError> {
        let cookie_token = req.cookie(&self.config.cookie_name)
            .filter(|t| !t.is_empty())
            .ok_or(CsrfError::MissingCookie)?;
        let presented = self.extractor.extract(req).map_err(CsrfError::MissingToken)?;
        let same: bool = presented.as_bytes().ct_eq(cookie_token.as_bytes()).into();
        if !same {
            return Err(CsrfError::Mismatch);
        }
        if !self.is_known(cookie_token) {
            return Err(CsrfError::Unknown);
        }
        if let Err(e) = self.storage.delete(cookie_token) {
            warn!(error = %e, "failed to retire csrf token");
        }
        Ok(())
    }

    fn cookie(&self, token: &str) -> Cookie {
        let config = &self.config;
        let mut cookie = Cookie {
            name: config.cookie_name.clone(),
            value: token.to_owned(),
            path: config.cookie_path.clone(),
            domain: config.cookie_domain.clone(),
            secure: config.cookie_secure,
            http_only: config.cookie_http_only,
            same_site: SameSite::parse(&config.cookie_same_site),
            ..Cookie::default()
        };
        if !config.cookie_session_only {
            cookie.max_age = Some(i64::try_from(config.expiration.as_secs()).unwrap_or(i64::MAX));
            cookie.expires = SystemTime::now().checked_add(config.expiration);
        }
        cookie
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

impl Middleware for Csrf {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        let inner = &self.inner;
        if skipped(inner.config.skip.as_ref(), &req) {
            return next.run(req);
        }

        let mut token = None;
        if is_safe(req.method()) {
            token = req.cookie(&inner.config.cookie_name)
                .filter(|t| !t.is_empty() && inner.is_known(t))
                .map(str::to_owned);
        } else if let Err(reason) = inner.validate(&req) {
            debug!(%reason, path = %req.path(), "csrf check failed");
            req.extensions_mut().insert(reason);
            return match &inner.config.error_handler {
                Some(handler) => handler.call(req),
                None => Box::pin(async { Response::status(StatusCode::FORBIDDEN) }),
            };
        }

        let token = token.unwrap_or_else(|| (inner.config.key_generator)());
        if let Err(e) = inner.storage.set(&token, token.as_bytes(), inner.config.expiration) {
            error!(error = %e, "failed to store csrf token");
            return Box::pin(async { Response::status(StatusCode::INTERNAL_SERVER_ERROR) });
        }
        req.extensions_mut().insert(CsrfToken(token.clone()));
        let cookie = inner.cookie(&token);

        Box::pin(async move {
            let mut res = next.run(req).await;
            res.set_cookie(&cookie);
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::Error;
    use crate::router::Router;

    fn request(method: Method, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/form");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        Request::from_http(builder.body(Bytes::new()).unwrap())
    }

    fn app(csrf: Csrf) -> Arc<Router> {
        let echo = |req: Request| async move {
            req.extensions().get::<CsrfToken>().map(|t| t.0.clone()).unwrap_or_default()
        };
        Arc::new(
            Router::new()
                .with(csrf)
                .on(Method::GET, "/form", echo)
                .on(Method::POST, "/form", echo),
        )
    }

    fn cookie_value(res: &Response) -> String {
        let raw = res.cookie(DEFAULT_COOKIE_NAME).unwrap();
        raw.split(';').next().unwrap().split_once('=').unwrap().1.to_owned()
    }

    #[tokio::test]
    async fn get_issues_token_and_post_accepts_it() {
        let app = app(Csrf::new(Config::new()).unwrap());

        let res = app.handle(request(Method::GET, &[])).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let token = cookie_value(&res);
        assert_eq!(res.body(), token.as_bytes());
        assert!(token.len() >= 22);

        let cookie = format!("csrf_={token}");
        let res = app
            .handle(request(Method::POST, &[("cookie", &cookie), ("x-csrf-token", &token)]))
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_ne!(cookie_value(&res), token, "a new token replaces the spent one");
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let app = app(Csrf::new(Config::new()).unwrap());
        let token = cookie_value(&app.handle(request(Method::GET, &[])).await);
        let cookie = format!("csrf_={token}");
        let headers = [("cookie", cookie.as_str()), ("x-csrf-token", token.as_str())];

        assert_eq!(app.handle(request(Method::POST, &headers)).await.status_code(), StatusCode::OK);
        assert_eq!(
            app.handle(request(Method::POST, &headers)).await.status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn get_reuses_known_cookie_token() {
        let app = app(Csrf::new(Config::new()).unwrap());
        let token = cookie_value(&app.handle(request(Method::GET, &[])).await);
        let cookie = format!("csrf_={token}");
        let res = app.handle(request(Method::GET, &[("cookie", &cookie)])).await;
        assert_eq!(cookie_value(&res), token);

        let res = app.handle(request(Method::GET, &[("cookie", "csrf_=forged")])).await;
        assert_ne!(cookie_value(&res), "forged");
    }

    #[tokio::test]
    async fn post_rejections() {
        let app = app(Csrf::new(Config::new()).unwrap());
        let token = cookie_value(&app.handle(request(Method::GET, &[])).await);
        let cookie = format!("csrf_={token}");

        let no_cookie = request(Method::POST, &[("x-csrf-token", &token)]);
        let no_header = request(Method::POST, &[("cookie", &cookie)]);
        let mismatch = request(Method::POST, &[("cookie", &cookie), ("x-csrf-token", "other")]);
        let truncated = request(Method::POST, &[("cookie", &cookie), ("x-csrf-token", &token[..10])]);
        let unknown = request(Method::POST, &[("cookie", "csrf_=made-up"), ("x-csrf-token", "made-up")]);
        for req in [no_cookie, no_header, mismatch, truncated, unknown] {
            assert_eq!(app.handle(req).await.status_code(), StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn custom_error_handler_sees_reason() {
        let csrf = Csrf::new(Config::new().with_error_handler(|req: Request| async move {
            let reason = req.extensions().get::<CsrfError>().copied();
            (StatusCode::IM_A_TEAPOT, format!("{reason:?}"))
        }))
        .unwrap();
        let res = app(csrf).handle(request(Method::POST, &[])).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(res.body(), b"Some(MissingCookie)");
    }

    #[test]
    fn malformed_lookup_is_rejected() {
        assert!(Csrf::new(Config::new().with_key_lookup("nonsense")).is_err());
    }

    /// Store that keeps nothing and refuses writes.
    struct FailingStorage;

    impl Storage for FailingStorage {
        fn get(&self, _: &str) -> Result<Vec<u8>> { Err(Error::KeyNotExist) }
        fn set(&self, _: &str, _: &[u8], _: Duration) -> Result<()> {
            Err(Error::Storage("token store offline".to_owned()))
        }
        fn delete(&self, _: &str) -> Result<()> { Ok(()) }
        fn reset(&self) -> Result<()> { Ok(()) }
        fn close(&self) -> Result<()> { Ok(()) }
    }

    #[tokio::test]
    async fn unstorable_token_is_not_issued() {
        let csrf = Csrf::new(Config::new().with_storage(Arc::new(FailingStorage))).unwrap();
        let res = app(csrf).handle(request(Method::GET, &[])).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.cookie(DEFAULT_COOKIE_NAME).is_none());
        assert!(res.body().is_empty());
    }
}

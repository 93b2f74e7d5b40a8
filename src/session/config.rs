//! Configuration for the session manager.

use std::sync::Arc;
use std::time::Duration;

use crate::storage::Storage;

/// Default session lifetime.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30 * 60);

/// Cookie name used when the caller does not choose one.
pub const DEFAULT_COOKIE_NAME: &str = "session_id";

/// Produces a fresh, unguessable session id.
pub type KeyGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Random UUID v4, hyphenated.
pub fn uuid_generator() -> KeyGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// Configuration for the session [`Manager`](super::Manager).
#[derive(Clone)]
pub struct Config {
    /// How long a saved session stays in storage and in the client's cookie.
    /// Zero keeps it in storage forever.
    pub expiration: Duration,

    /// Backing store. `None` builds a [`MemoryStorage`](crate::storage::MemoryStorage).
    pub storage: Option<Arc<dyn Storage>>,

    pub key_generator: KeyGenerator,

    pub cookie_name: String,
    pub cookie_path: String,
    pub cookie_domain: String,
    pub cookie_secure: bool,
    pub cookie_http_only: bool,
    /// `"Strict"`, `"None"` or anything else for `Lax`; compared case-insensitively.
    pub cookie_same_site: String,

    /// Omit `Max-Age` and `Expires` so the cookie ends with the browser session.
    pub cookie_session_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expiration: DEFAULT_EXPIRATION,
            storage: None,
            key_generator: uuid_generator(),
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            cookie_path: "/".to_owned(),
            cookie_domain: String::new(),
            cookie_secure: false,
            cookie_http_only: false,
            cookie_same_site: "Lax".to_owned(),
            cookie_session_only: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
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

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = domain.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: impl Into<String>) -> Self {
        self.cookie_same_site = same_site.into();
        self
    }

    pub fn with_session_only(mut self, session_only: bool) -> Self {
        self.cookie_session_only = session_only;
        self
    }
}

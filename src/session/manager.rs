//! Turns incoming requests into [`Session`] handles.

use std::sync::Arc;

use tracing::{debug, warn};

use super::config::Config;
use super::db;
use super::handle::Session;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::storage::{MemoryStorage, Storage, DEFAULT_GC_INTERVAL};

pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) storage: Arc<dyn Storage>,
}

/// The configured session factory.
///
/// Cheap to clone; clones share the configuration and the store.
///
/// ```rust
/// use std::time::Duration;
/// use tether::session::{Config, Manager};
///
/// let sessions = Manager::new(
///     Config::new()
///         .with_cookie_name("sid")
///         .with_expiration(Duration::from_secs(60)),
/// ).unwrap();
/// ```
#[derive(Clone)]
pub struct Manager {
    pub(crate) inner: Arc<Inner>,
}

impl Manager {
    /// Builds a manager. An empty cookie name is rejected.
    pub fn new(mut config: Config) -> Result<Self> {
        if config.cookie_name.is_empty() {
            return Err(Error::InvalidConfig("session cookie name must not be empty"));
        }
        let storage = config
            .storage
            .take()
            .unwrap_or_else(|| Arc::new(MemoryStorage::new(DEFAULT_GC_INTERVAL)));
        Ok(Self { inner: Arc::new(Inner { config, storage }) })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    /// Materialises the session for `req`.
    ///
    /// Without a session cookie a fresh id is generated and written into the
    /// request's `Cookie` header, so a second call within the same request
    /// resolves to the same id. A stored payload that is missing, expired or
    /// unreadable yields an empty session under the requested id.
    pub fn get(&self, req: &mut Request) -> Session {
        let name = self.inner.config.cookie_name.as_str();
        let existing = req.cookie(name).filter(|id| !id.is_empty()).map(str::to_owned);

        let (id, fresh) = match existing {
            Some(id) => (id, false),
            None => {
                let id = (self.inner.config.key_generator)();
                req.set_cookie(name, &id);
                (id, true)
            }
        };

        let mut data = db::acquire();
        if !fresh {
            match self.inner.storage.get(&id) {
                Ok(raw) => {
                    if let Err(e) = data.unmarshal(&raw) {
                        warn!(error = %e, "discarding unreadable session payload");
                    }
                }
                Err(Error::KeyNotExist) => debug!("session not found in storage"),
                Err(e) => warn!(error = %e, "session storage lookup failed"),
            }
        }

        Session::new(self.clone(), data, id, fresh)
    }

    /// Removes a session from storage by id.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.inner.storage.delete(id)
    }

    /// Removes every session from storage.
    pub fn reset(&self) -> Result<()> {
        self.inner.storage.reset()
    }
}

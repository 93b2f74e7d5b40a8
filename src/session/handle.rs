//! The per-request session handle.

use std::time::SystemTime;

use serde_json::Value;
use tracing::{debug, warn};

use super::db::{self, Db};
use super::manager::Manager;
use crate::cookie::{Cookie, SameSite};
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// One request's view of a session.
///
/// Reads and writes touch only the in-memory [`Db`]; nothing reaches storage
/// or the client until [`save`](Session::save).
///
/// A successful save finishes the handle: its state goes back to the pool,
/// reads answer as empty, writes are ignored and further saves do nothing.
/// Load a new handle through [`Manager::get`] to keep working with the
/// session.
pub struct Session {
    manager: Manager,
    /// `None` once a successful save has handed the state back to the pool.
    db: Option<Db>,
    id: String,
    fresh: bool,
}

impl Session {
    pub(crate) fn new(manager: Manager, db: Db, id: String, fresh: bool) -> Self {
        Self { manager, db: Some(db), id, fresh }
    }

    /// `true` when the id was generated for this request.
    pub fn fresh(&self) -> bool {
        self.fresh
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.db.as_ref()?.get(key)
    }

    /// Ignored once the handle has been saved.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        match self.db.as_mut() {
            Some(db) => db.set(key, value.into()),
            None => warn!(key, "session already saved, write ignored"),
        }
    }

    /// Ignored once the handle has been saved.
    pub fn delete(&mut self, key: &str) {
        match self.db.as_mut() {
            Some(db) => db.delete(key),
            None => warn!(key, "session already saved, delete ignored"),
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.db.as_ref().map(|db| db.keys().collect()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.db.as_ref().map_or(0, Db::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears the state and removes the stored entry. Saving afterwards
    /// tells the client to drop its cookie, even on an already saved handle.
    pub fn reset(&mut self) -> Result<()> {
        self.db.get_or_insert_with(db::acquire).reset();
        self.manager.storage().delete(&self.id)
    }

    /// Swaps in a new id, keeping the data. The old stored entry is removed
    /// so the previous id cannot be replayed, and the request's `Cookie`
    /// header is pointed at the new id so later lookups in the same request
    /// agree with this handle.
    pub fn regenerate(&mut self, req: &mut Request) -> Result<()> {
        self.manager.storage().delete(&self.id)?;
        self.id = (self.manager.config().key_generator)();
        self.fresh = true;
        req.set_cookie(&self.manager.config().cookie_name, &self.id);
        Ok(())
    }

    /// Commits the session to storage and to the response cookie.
    ///
    /// An empty session writes no payload and emits a removal cookie instead.
    /// If the payload cannot be encoded or stored, the error is returned and
    /// neither the response nor the in-memory state is touched. Saving a
    /// handle that was already saved is a no-op.
    pub fn save(&mut self, res: &mut Response) -> Result<()> {
        let Some(data) = self.db.as_ref() else {
            return Ok(());
        };

        if data.is_empty() {
            res.set_cookie(&self.removal_cookie());
            if let Some(db) = self.db.take() {
                db::release(db);
            }
            return Ok(());
        }

        let payload = data.marshal()?;
        let config = self.manager.config();
        self.manager.storage().set(&self.id, &payload, config.expiration)?;

        if let Some(db) = self.db.take() {
            db::release(db);
        }
        res.set_cookie(&self.session_cookie());
        debug!(fresh = self.fresh, "session saved");
        Ok(())
    }

    fn template(&self) -> Cookie {
        let config = self.manager.config();
        Cookie {
            name: config.cookie_name.clone(),
            path: config.cookie_path.clone(),
            domain: config.cookie_domain.clone(),
            secure: config.cookie_secure,
            http_only: config.cookie_http_only,
            same_site: SameSite::parse(&config.cookie_same_site),
            ..Cookie::default()
        }
    }

    fn session_cookie(&self) -> Cookie {
        let config = self.manager.config();
        let mut cookie = self.template();
        cookie.value = self.id.clone();
        if !config.cookie_session_only {
            cookie.max_age = Some(i64::try_from(config.expiration.as_secs()).unwrap_or(i64::MAX));
            cookie.expires = SystemTime::now().checked_add(config.expiration);
        }
        cookie
    }

    fn removal_cookie(&self) -> Cookie {
        let removal = Cookie::removal(self.manager.config().cookie_name.as_str());
        Cookie { expires: removal.expires, ..self.template() }
    }
}

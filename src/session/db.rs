//! Per-request session state and its reuse pool.
//!
//! A session rarely holds more than a handful of keys, so [`Db`] is a flat
//! vector of pairs: linear lookup, append on insert, insertion order kept.
//! Instances cycle through a process-wide pool; [`acquire`] hands out an empty
//! one and [`release`] clears it without freeing its backing storage.
//!
//! ```text
//! acquire ──▶ Db (empty) ──▶ unmarshal / get / set ──▶ marshal ──▶ release
//!                                                                   │
//!            pool ◀─────────────────── reset (capacity kept) ◀──────┘
//! ```

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;

/// Upper bound on idle instances kept for reuse.
const MAX_POOLED: usize = 1024;

static POOL: Mutex<Vec<Db>> = Mutex::new(Vec::new());

/// An ordered key/value accumulator with a JSON wire form.
///
/// The payload is a JSON array of `[key, value]` pairs, so order survives a
/// round trip and a truncated payload fails to decode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Db {
    entries: Vec<(String, Value)>,
}

impl Db {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Overwrites in place when the key exists, appends otherwise.
    pub fn set(&mut self, key: &str, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key.to_owned(), value)),
        }
    }

    pub fn delete(&mut self, key: &str) {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k == key) {
            self.entries.remove(pos);
        }
    }

    /// Empties the collection, keeping its allocation.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.entries)?)
    }

    /// Replaces the contents with the decoded payload. On error the
    /// collection is left untouched.
    pub fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        let entries: Vec<(String, Value)> = serde_json::from_slice(data)?;
        self.entries.clear();
        self.entries.extend(entries);
        Ok(())
    }
}

/// Takes an empty [`Db`] from the pool, or builds one when the pool is dry.
pub(crate) fn acquire() -> Db {
    POOL.lock().pop().unwrap_or_default()
}

/// Returns a [`Db`] to the pool. Taking it by value makes a second release of
/// the same instance unrepresentable.
pub(crate) fn release(mut db: Db) {
    db.reset();
    let mut pool = POOL.lock();
    if pool.len() < MAX_POOLED {
        pool.push(db);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_overwrites_in_place() {
        let mut db = Db::default();
        db.set("a", json!(1));
        db.set("b", json!(2));
        db.set("a", json!(3));
        assert_eq!(db.len(), 2);
        assert_eq!(db.get("a"), Some(&json!(3)));
        assert_eq!(db.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn delete_keeps_order() {
        let mut db = Db::default();
        for k in ["a", "b", "c"] {
            db.set(k, json!(k));
        }
        db.delete("b");
        db.delete("missing");
        assert_eq!(db.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn marshal_round_trip_preserves_structure() {
        let mut db = Db::default();
        db.set("user", json!("alice"));
        db.set("visits", json!(3));
        db.set("roles", json!(["admin", "ops"]));
        db.set("prefs", json!({"theme": "dark"}));

        let bytes = db.marshal().unwrap();
        let mut back = Db::default();
        back.unmarshal(&bytes).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn truncated_payload_fails_without_clobbering() {
        let mut db = Db::default();
        db.set("user", json!("alice"));
        let bytes = db.marshal().unwrap();

        let mut target = Db::default();
        target.set("keep", json!(true));
        assert!(target.unmarshal(&bytes[..bytes.len() - 3]).is_err());
        assert_eq!(target.get("keep"), Some(&json!(true)));
    }

    #[test]
    fn released_db_comes_back_empty() {
        let mut db = acquire();
        db.set("x", json!(1));
        release(db);
        assert!(acquire().is_empty());
    }
}

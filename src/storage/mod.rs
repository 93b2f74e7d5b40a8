//! Key/value storage with per-entry expiration.
//!
//! [`Storage`] is the contract the session manager and the CSRF middleware
//! program against. [`MemoryStorage`] is the in-process implementation with a
//! background sweeper; [`TokenStorage`] is its variant for CSRF tokens.

use std::time::Duration;

use crate::error::Result;

mod memory;
mod token;

pub use memory::{MemoryStorage, DEFAULT_GC_INTERVAL};
pub use token::TokenStorage;

/// A TTL key/value store.
///
/// Every method is synchronous: implementations are expected to answer from
/// memory or a fast local cache, and callers invoke them on request threads.
pub trait Storage: Send + Sync {
    /// Returns the stored bytes, or [`Error::KeyNotExist`](crate::Error::KeyNotExist)
    /// when the key is absent or expired.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Stores `value` under `key`. A zero `ttl` never expires.
    /// An empty key or value is a successful no-op.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Removes `key`. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Drops every entry.
    fn reset(&self) -> Result<()>;

    /// Stops background work. Later mutations are not observable.
    fn close(&self) -> Result<()>;
}

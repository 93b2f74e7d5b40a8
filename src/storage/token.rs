//! Storage for short-lived CSRF tokens.
//!
//! Tokens are their own payload: the only question ever asked is whether a
//! token is still known, so `get` answers with the key itself.

use std::time::Duration;

use super::{MemoryStorage, Storage, DEFAULT_GC_INTERVAL};
use crate::error::Result;

const MARKER: &[u8] = b"1";

/// A [`MemoryStorage`] whose `get` echoes the key of any unexpired entry.
pub struct TokenStorage {
    inner: MemoryStorage,
}

impl TokenStorage {
    /// Creates a token store that sweeps every 10 seconds.
    pub fn new() -> Self {
        Self::with_gc_interval(DEFAULT_GC_INTERVAL)
    }

    pub fn with_gc_interval(gc_interval: Duration) -> Self {
        Self { inner: MemoryStorage::new(gc_interval) }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for TokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for TokenStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).map(|_| key.as_bytes().to_vec())
    }

    /// The value is ignored; presence is all that is recorded.
    fn set(&self, key: &str, _value: &[u8], ttl: Duration) -> Result<()> {
        self.inner.set(key, MARKER, ttl)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn reset(&self) -> Result<()> {
        self.inner.reset()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

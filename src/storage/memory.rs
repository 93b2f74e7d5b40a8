//! In-process TTL store with a background sweeper thread.
//!
//! ```text
//!   get ──▶ RwLock (shared)  ─┐
//!   set ──▶ RwLock (excl.)   ─┼─▶ HashMap<String, Entry>
//! sweep ──▶ RwLock (excl.)   ─┘        ▲
//!                                      │ every gc_interval
//!                     sweeper thread ──┘ ◀── stop channel (close / drop)
//! ```
//!
//! Expired entries are invisible to `get` immediately; the sweeper only
//! reclaims their memory. The sweeper waits on a channel with a timeout, so a
//! stop signal is never lost regardless of what the writers are doing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::Storage;
use crate::error::{Error, Result};

/// Sweep period used when none (or zero) is given.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

struct Entry {
    data: Vec<u8>,
    /// `None` never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Shared {
    db: RwLock<HashMap<String, Entry>>,
    closed: AtomicBool,
}

impl Shared {
    fn sweep(&self) {
        let now = Instant::now();
        let mut db = self.db.write();
        let before = db.len();
        db.retain(|_, entry| !entry.is_expired(now));
        let removed = before - db.len();
        drop(db);
        if removed > 0 {
            debug!(removed, "swept expired entries");
        } else {
            trace!("sweep found nothing to remove");
        }
    }
}

struct Sweeper {
    stop: SyncSender<()>,
    handle: JoinHandle<()>,
}

/// A concurrent in-memory [`Storage`] with per-entry expiration.
///
/// Readers share the lock; `set`, `delete`, `reset` and the periodic sweep
/// take it exclusively. Dropping the store stops the sweeper as well.
pub struct MemoryStorage {
    shared: Arc<Shared>,
    gc_interval: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl MemoryStorage {
    /// Creates a store whose sweeper runs every `gc_interval`.
    /// A zero interval falls back to [`DEFAULT_GC_INTERVAL`].
    pub fn new(gc_interval: Duration) -> Self {
        let gc_interval = if gc_interval.is_zero() { DEFAULT_GC_INTERVAL } else { gc_interval };
        let shared = Arc::new(Shared {
            db: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let (stop, stopped) = mpsc::sync_channel::<()>(1);
        let worker = Arc::clone(&shared);
        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(gc_interval) {
                Err(RecvTimeoutError::Timeout) => worker.sweep(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            shared,
            gc_interval,
            sweeper: Mutex::new(Some(Sweeper { stop, handle })),
        }
    }

    pub fn gc_interval(&self) -> Duration {
        self.gc_interval
    }

    /// Number of entries held, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.shared.db.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::Storage("storage is closed".to_owned()));
        }
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_GC_INTERVAL)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let db = self.shared.db.read();
        match db.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.data.clone()),
            _ => Err(Error::KeyNotExist),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        if key.is_empty() || value.is_empty() {
            return Ok(());
        }
        self.ensure_open()?;
        let expires_at = if ttl.is_zero() { None } else { Instant::now().checked_add(ttl) };
        let entry = Entry { data: value.to_vec(), expires_at };
        self.shared.db.write().insert(key.to_owned(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.ensure_open()?;
        self.shared.db.write().remove(key);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        *self.shared.db.write() = HashMap::new();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        let Some(sweeper) = self.sweeper.lock().take() else {
            return Ok(());
        };
        // The channel holds one slot and only close sends, so this never blocks.
        let _ = sweeper.stop.try_send(());
        if sweeper.handle.join().is_err() {
            warn!("storage sweeper panicked");
            return Err(Error::Storage("sweeper panicked".to_owned()));
        }
        debug!("memory storage closed");
        Ok(())
    }
}

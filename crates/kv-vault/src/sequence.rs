//! Batched monotonic counter.
//!
//! Values are handed out from an in-memory `(current, max)` window. When the
//! window is exhausted the persisted high-water mark at `/db/increment` is
//! bumped by [`BATCH_SIZE`] and the window refilled, so a process restart
//! skips whatever was left in its window. The sequence is a total order,
//! never a dense count.

use std::sync::Mutex;

use kv_core::paths::format_seq;
use kv_core::{Entity, VaultError, VaultResult};

use crate::db::Db;

/// Values reserved per store write.
pub const BATCH_SIZE: u64 = 1000;

#[derive(Debug, Default)]
struct Window {
    current: u64,
    max: u64,
}

#[derive(Debug)]
pub struct Sequencer {
    db: Db,
    window: Mutex<Window>,
    batch: u64,
}

impl Sequencer {
    pub fn new(db: Db) -> Self {
        Self::with_batch(db, BATCH_SIZE)
    }

    pub fn with_batch(db: Db, batch: u64) -> Self {
        Self {
            db,
            window: Mutex::new(Window::default()),
            batch: batch.max(1),
        }
    }

    /// Next value, starting at 1.
    pub fn next(&self) -> VaultResult<u64> {
        let mut window = self
            .window
            .lock()
            .map_err(|_| VaultError::Store(anyhow::anyhow!("sequencer lock poisoned")))?;

        if window.current >= window.max {
            let persisted = self.db.get_u64(Entity::Db("increment"))?.unwrap_or(0);
            let base = persisted.max(window.max);
            let max = base + self.batch;
            self.db.set_u64(Entity::Db("increment"), max)?;
            tracing::debug!(from = base, to = max, "sequencer window refilled");
            window.current = base;
            window.max = max;
        }

        window.current += 1;
        Ok(window.current)
    }

    /// Next value as a zero-padded, lexicographically sortable string.
    pub fn increment(&self) -> VaultResult<String> {
        Ok(format_seq(self.next()?))
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::schema;

/// A small bounded pool of mutex-guarded SQLite connections.
///
/// `skynet` (the teacher) uses a single `Arc<Mutex<Connection>>` per
/// subsystem crate — adequate there because each channel/session crate owns
/// its own table set. This crate serves many concurrent sessions against
/// shared tables, so the pattern is replicated N times behind a
/// round-robin checkout instead of introducing an external pooling crate
/// (SPEC_FULL §4.5).
pub struct ConnectionPool {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ConnectionPool {
    /// Open `size` connections against `path` (or `:memory:`), run
    /// `init_db` on each, and return the pool.
    pub fn open(path: &str, size: usize) -> Result<Self> {
        let size = size.max(1);
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = if path == ":memory:" {
                Connection::open_in_memory()?
            } else {
                Connection::open(path)?
            };
            schema::init_db(&conn)?;
            conns.push(Mutex::new(conn));
        }
        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    /// In-memory pool of a single connection, for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:", 1)
    }

    /// Check out the next connection in round-robin order. The returned
    /// guard is held only for the duration of one query.
    pub fn checkout(&self) -> std::sync::MutexGuard<'_, Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        self.conns[idx].lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `SELECT 1` probe against one connection (§4.5 health check).
    pub fn health_check(&self) -> Result<()> {
        let conn = self.checkout();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

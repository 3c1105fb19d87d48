//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The lifecycle controller goes through the repository and collaborator
//! traits and never executes SQL directly.
//!
//! The connection sits behind a Mutex, so every store method runs as one
//! serialized unit. Mutating methods additionally open an IMMEDIATE
//! transaction so that several stores sharing one database file still
//! see compare-and-swap semantics.

use crate::error::{DeskError, DeskResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};
use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

mod event;
mod ingest;
mod rule_version;
mod suggestion;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DeskStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl DeskStore {
    pub fn open(path: &str) -> DeskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DeskResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> DeskResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run more than once.
    pub fn migrate(&self) -> DeskResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_suggestions.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/003_event_log.sql"))?;
        Ok(())
    }

    fn conn(&self) -> DeskResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DeskError::LockPoisoned("store connection"))
    }
}

// ── Timestamps ─────────────────────────────────────────────────────

pub(crate) fn format_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> DeskResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("Bad timestamp '{raw}' in store: {e}").into())
}

//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The machine calls store methods; it never executes SQL directly.
//!
//! Progress is kept as two independent values so a damaged one never
//! takes the other down with it. Anything unreadable loads as empty.

use crate::{
    error::{LullabyError, LullabyResult},
    progression::ProgressionState,
    types::{ItemId, PullCount},
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

mod pull_log;

pub use pull_log::PullLogEntry;

pub const KEY_UNLOCKED_ITEMS: &str = "unlocked_items";
pub const KEY_PULL_COUNT: &str = "pull_count";

/// The persistence collaborator as the machine sees it.
pub trait ProgressStore: Send {
    /// Read saved progress. Absent or corrupt data is the empty state.
    fn load(&self) -> ProgressionState;

    /// Write the full state. Last write wins.
    fn save(&self, state: &ProgressionState) -> LullabyResult<()>;

    /// Remove all saved progress.
    fn clear(&self) -> LullabyResult<()>;

    /// Append one resolved pull to the log, if the store keeps one.
    fn record_pull(&self, _entry: &PullLogEntry) -> LullabyResult<()> {
        Ok(())
    }
}

pub struct SqliteProgressStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl SqliteProgressStore {
    pub fn open(path: &str) -> LullabyResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LullabyResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    /// Open and migrate in one step.
    pub fn open_migrated(path: &str) -> LullabyResult<Self> {
        let store = if path == ":memory:" {
            Self::in_memory()?
        } else {
            Self::open(path)?
        };
        store.migrate()?;
        Ok(store)
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new, empty, migrated database.
    pub fn reopen(&self) -> LullabyResult<Self> {
        match &self.path {
            Some(p) => Self::open_migrated(p),
            None => Self::open_migrated(":memory:"),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LullabyResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_progress.sql"))?;
        Ok(())
    }

    // ── Raw values ─────────────────────────────────────────────

    pub fn put_value(&self, key: &str, value: &str) -> LullabyResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO progress_value (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> LullabyResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM progress_value WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_value(&self, key: &str) -> LullabyResult<()> {
        self.conn
            .execute("DELETE FROM progress_value WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ── Progress ───────────────────────────────────────────────

    /// Strict read of the unlocked set. Errors on a malformed payload.
    pub fn load_unlocked(&self) -> LullabyResult<BTreeSet<ItemId>> {
        match self.get_value(KEY_UNLOCKED_ITEMS)? {
            None => Ok(BTreeSet::new()),
            Some(raw) => {
                let values: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
                // Keep only string entries; anything else is noise.
                Ok(values
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect())
            }
        }
    }

    /// Strict read of the pull count. Negative values clamp to zero.
    pub fn load_pull_count(&self) -> LullabyResult<PullCount> {
        match self.get_value(KEY_PULL_COUNT)? {
            None => Ok(0),
            Some(raw) => {
                let count: i64 = raw.trim().parse().map_err(|e| {
                    LullabyError::Other(anyhow::anyhow!("malformed pull count '{raw}': {e}"))
                })?;
                Ok(count.max(0) as PullCount)
            }
        }
    }

    pub fn save_unlocked(&self, unlocked: &BTreeSet<ItemId>) -> LullabyResult<()> {
        let ids: Vec<&str> = unlocked.iter().map(String::as_str).collect();
        self.put_value(KEY_UNLOCKED_ITEMS, &serde_json::to_string(&ids)?)
    }

    pub fn save_pull_count(&self, count: PullCount) -> LullabyResult<()> {
        self.put_value(KEY_PULL_COUNT, &count.to_string())
    }

    /// Read one value leniently: on failure, log, drop the bad payload
    /// and fall back to the default.
    fn recover<T: Default>(&self, key: &str, read: LullabyResult<T>) -> T {
        match read {
            Ok(value) => value,
            Err(e) => {
                log::warn!("saved '{key}' unreadable, starting from empty: {e}");
                if let Err(e) = self.delete_value(key) {
                    log::warn!("could not discard corrupt '{key}': {e}");
                }
                T::default()
            }
        }
    }
}

impl ProgressStore for SqliteProgressStore {
    fn load(&self) -> ProgressionState {
        let unlocked = self.recover(KEY_UNLOCKED_ITEMS, self.load_unlocked());
        let pull_count = self.recover(KEY_PULL_COUNT, self.load_pull_count());
        ProgressionState {
            unlocked,
            pull_count,
        }
    }

    fn save(&self, state: &ProgressionState) -> LullabyResult<()> {
        self.save_unlocked(&state.unlocked)?;
        self.save_pull_count(state.pull_count)?;
        Ok(())
    }

    fn clear(&self) -> LullabyResult<()> {
        self.delete_value(KEY_UNLOCKED_ITEMS)?;
        self.delete_value(KEY_PULL_COUNT)?;
        Ok(())
    }

    fn record_pull(&self, entry: &PullLogEntry) -> LullabyResult<()> {
        self.append_pull(entry)
    }
}

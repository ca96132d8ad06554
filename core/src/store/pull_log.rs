//! Store methods for the pull log.

use super::SqliteProgressStore;
use crate::{error::LullabyResult, types::PullCount};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// One resolved pull as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullLogEntry {
    pub id: Option<i64>,
    pub session_id: String,
    pub pull: PullCount,
    pub kind: String,
    pub slots: [String; 3],
    pub is_win: bool,
    pub new_unlock: bool,
}

impl SqliteProgressStore {
    pub fn append_pull(&self, entry: &PullLogEntry) -> LullabyResult<()> {
        self.conn.execute(
            "INSERT INTO pull_log
                 (session_id, pull, kind, slot_a, slot_b, slot_c, is_win, new_unlock)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.session_id,
                entry.pull as i64,
                entry.kind,
                entry.slots[0],
                entry.slots[1],
                entry.slots[2],
                entry.is_win,
                entry.new_unlock,
            ],
        )?;
        Ok(())
    }

    pub fn pulls_for_session(&self, session_id: &str) -> LullabyResult<Vec<PullLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, pull, kind, slot_a, slot_b, slot_c, is_win, new_unlock
             FROM pull_log WHERE session_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![session_id], |row| {
                Ok(PullLogEntry {
                    id: Some(row.get(0)?),
                    session_id: row.get(1)?,
                    pull: row.get::<_, i64>(2)? as u64,
                    kind: row.get(3)?,
                    slots: [row.get(4)?, row.get(5)?, row.get(6)?],
                    is_win: row.get(7)?,
                    new_unlock: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Test / summary helpers ────────────────────────────────────────

    pub fn pull_log_count(&self, session_id: &str) -> LullabyResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pull_log WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn win_count(&self, session_id: &str) -> LullabyResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pull_log WHERE session_id = ?1 AND is_win = 1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

//! Lifecycle audit log (`event_log`).

use super::{format_ts, DeskStore};
use crate::{
    error::DeskResult,
    event::{EventLogEntry, LifecycleEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

/// Called inside the transaction of the mutation being recorded.
pub(super) fn append_event(
    conn:  &Connection,
    event: &LifecycleEvent,
    at:    &DateTime<Utc>,
) -> DeskResult<()> {
    conn.execute(
        "INSERT INTO event_log (suggestion_id, event_type, payload, recorded_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event.suggestion_id(),
            event.type_name(),
            serde_json::to_string(event)?,
            format_ts(at),
        ],
    )?;
    Ok(())
}

impl DeskStore {
    pub fn events_for_suggestion(&self, suggestion_id: &str) -> DeskResult<Vec<EventLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, suggestion_id, event_type, payload, recorded_at
             FROM event_log WHERE suggestion_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![suggestion_id], |row| {
                Ok(EventLogEntry {
                    id:            Some(row.get(0)?),
                    suggestion_id: row.get(1)?,
                    event_type:    row.get(2)?,
                    payload:       row.get(3)?,
                    recorded_at:   row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count events of one type across all suggestions.
    pub fn count_events(&self, event_type: &str) -> DeskResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

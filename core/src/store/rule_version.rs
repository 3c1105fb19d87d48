//! Append-only rule history (`rule_version`).

use super::{format_ts, parse_ts, DeskStore};
use crate::{
    collaborator::RuleHistory,
    error::DeskResult,
    suggestion::RuleVersion,
    types::RuleId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Append `text` as the next version of `rule_id`.
/// Version ids are `<rule_id>@v<n>`, n counting from 1 per rule.
pub(super) fn append_version(
    conn:       &Connection,
    rule_id:    &str,
    text:       &str,
    created_at: &DateTime<Utc>,
) -> DeskResult<RuleVersion> {
    let version_no: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_no), 0) + 1 FROM rule_version WHERE rule_id = ?1",
        params![rule_id],
        |row| row.get(0),
    )?;
    let version_id = format!("{rule_id}@v{version_no}");
    conn.execute(
        "INSERT INTO rule_version (version_id, rule_id, version_no, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![version_id, rule_id, version_no, text, format_ts(created_at)],
    )?;
    Ok(RuleVersion {
        version_id,
        rule_id:    rule_id.to_string(),
        text:       text.to_string(),
        created_at: *created_at,
    })
}

/// Text of the newest version of `rule_id`, if it has any.
pub(super) fn head_text(conn: &Connection, rule_id: &str) -> DeskResult<Option<String>> {
    let text = conn
        .query_row(
            "SELECT text FROM rule_version WHERE rule_id = ?1 ORDER BY version_no DESC LIMIT 1",
            params![rule_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(text)
}

fn decode(raw: (String, String, String, String)) -> DeskResult<RuleVersion> {
    let (version_id, rule_id, text, created_at) = raw;
    Ok(RuleVersion {
        version_id,
        rule_id,
        text,
        created_at: parse_ts(&created_at)?,
    })
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

impl DeskStore {
    /// Seed or extend a rule's history outside the suggestion lifecycle.
    pub fn insert_rule_version(
        &self,
        rule_id:    &str,
        text:       &str,
        created_at: &DateTime<Utc>,
    ) -> DeskResult<RuleVersion> {
        let conn = self.conn()?;
        append_version(&conn, rule_id, text, created_at)
    }
}

impl RuleHistory for DeskStore {
    fn rule_ids(&self) -> DeskResult<Vec<RuleId>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT rule_id FROM rule_version ORDER BY rule_id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn latest_version(&self, rule_id: &str) -> DeskResult<Option<RuleVersion>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT version_id, rule_id, text, created_at FROM rule_version
                 WHERE rule_id = ?1 ORDER BY version_no DESC LIMIT 1",
                params![rule_id],
                raw_row,
            )
            .optional()?;
        raw.map(decode).transpose()
    }

    fn versions(&self, rule_id: &str) -> DeskResult<Vec<RuleVersion>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT version_id, rule_id, text, created_at FROM rule_version
             WHERE rule_id = ?1 ORDER BY version_no ASC",
        )?;
        let raw = stmt
            .query_map(params![rule_id], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(decode).collect()
    }
}

//! Ingestion-side tables: regulatory updates and transaction facts.
//!
//! Both are written once by ingestion and only read by the desk.
//! Redelivery of the same id is ignored.

use super::DeskStore;
use crate::{
    collaborator::{TransactionSource, UpdateSource},
    error::{DeskError, DeskResult},
    fact::TransactionFact,
    suggestion::RegulatoryUpdate,
};
use rusqlite::{params, OptionalExtension};

impl DeskStore {
    /// Returns false when the update id was already ingested.
    pub fn insert_update(&self, update: &RegulatoryUpdate) -> DeskResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO regulatory_update
             (update_id, authority, title, summary, tags_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                update.id,
                update.authority,
                update.title,
                update.summary,
                serde_json::to_string(&update.tags)?,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Returns false when the transaction id was already ingested.
    pub fn insert_fact(&self, fact: &TransactionFact) -> DeskResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO transaction_fact (transaction_id, payload) VALUES (?1, ?2)",
            params![fact.transaction_id, serde_json::to_string(fact)?],
        )?;
        Ok(changed == 1)
    }

    pub fn fact_count(&self) -> DeskResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM transaction_fact", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl UpdateSource for DeskStore {
    fn get_update(&self, id: &str) -> DeskResult<Option<RegulatoryUpdate>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT update_id, authority, title, summary, tags_json
                 FROM regulatory_update WHERE update_id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some((id, authority, title, summary, tags_json)) => Ok(Some(RegulatoryUpdate {
                id,
                authority,
                title,
                summary,
                tags: serde_json::from_str(&tags_json)?,
            })),
        }
    }
}

impl TransactionSource for DeskStore {
    fn get_fact(&self, id: &str) -> DeskResult<Option<TransactionFact>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM transaction_fact WHERE transaction_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str::<TransactionFact>(&p).map_err(DeskError::from))
            .transpose()
    }

    fn recent_facts(&self, limit: usize) -> DeskResult<Vec<TransactionFact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM (
                 SELECT seq, payload FROM transaction_fact ORDER BY seq DESC LIMIT ?1
             ) ORDER BY seq ASC",
        )?;
        let payloads = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str::<TransactionFact>(p).map_err(DeskError::from))
            .collect()
    }
}

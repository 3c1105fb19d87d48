//! Suggestion repository backed by `rule_suggestion` and `suggestion_comment`.

use super::{
    event::append_event,
    format_ts, parse_ts,
    rule_version::{append_version, head_text},
    DeskStore,
};
use crate::{
    error::{DeskError, DeskResult},
    event::LifecycleEvent,
    repository::{SuggestionDraft, SuggestionRepository, Transition},
    suggestion::{Comment, RuleSuggestion, SuggestionStatus},
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

const SUGGESTION_COLUMNS: &str =
    "suggestion_id, source_update_id, target_rule_id, rationale, confidence, impact_json,
     suggested_text, baseline_text, unified_diff, structured_diff_json, status, created_at,
     created_version_id, compile_artifact_id, promoted_at";

/// Raw row from `rule_suggestion`, before JSON and timestamp decoding.
struct SuggestionRow {
    suggestion_id:        String,
    source_update_id:     String,
    target_rule_id:       Option<String>,
    rationale:            String,
    confidence:           f64,
    impact_json:          String,
    suggested_text:       String,
    baseline_text:        String,
    unified_diff:         String,
    structured_diff_json: String,
    status:               String,
    created_at:           String,
    created_version_id:   Option<String>,
    compile_artifact_id:  Option<String>,
    promoted_at:          Option<String>,
}

impl SuggestionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            suggestion_id:        row.get(0)?,
            source_update_id:     row.get(1)?,
            target_rule_id:       row.get(2)?,
            rationale:            row.get(3)?,
            confidence:           row.get(4)?,
            impact_json:          row.get(5)?,
            suggested_text:       row.get(6)?,
            baseline_text:        row.get(7)?,
            unified_diff:         row.get(8)?,
            structured_diff_json: row.get(9)?,
            status:               row.get(10)?,
            created_at:           row.get(11)?,
            created_version_id:   row.get(12)?,
            compile_artifact_id:  row.get(13)?,
            promoted_at:          row.get(14)?,
        })
    }

    fn decode(self, comments: Vec<Comment>) -> DeskResult<RuleSuggestion> {
        let status = SuggestionStatus::parse(&self.status).ok_or_else(|| {
            anyhow::anyhow!("Unknown status '{}' on {}", self.status, self.suggestion_id)
        })?;
        Ok(RuleSuggestion {
            id:                  self.suggestion_id,
            source_update_id:    self.source_update_id,
            target_rule_id:      self.target_rule_id,
            rationale:           self.rationale,
            confidence:          self.confidence,
            impact:              serde_json::from_str(&self.impact_json)?,
            suggested_text:      self.suggested_text,
            baseline_text:       self.baseline_text,
            unified_diff:        self.unified_diff,
            structured_diff:     serde_json::from_str(&self.structured_diff_json)?,
            status,
            created_at:          parse_ts(&self.created_at)?,
            comments,
            created_version_id:  self.created_version_id,
            compile_artifact_id: self.compile_artifact_id,
            promoted_at:         self.promoted_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

fn load_comments(conn: &Connection, suggestion_id: &str) -> DeskResult<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT author, body, created_at FROM suggestion_comment
         WHERE suggestion_id = ?1 ORDER BY id ASC",
    )?;
    let raw = stmt
        .query_map(params![suggestion_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(author, text, created_at)| {
            Ok(Comment {
                author,
                text,
                created_at: parse_ts(&created_at)?,
            })
        })
        .collect()
}

fn decode_all(conn: &Connection, rows: Vec<SuggestionRow>) -> DeskResult<Vec<RuleSuggestion>> {
    rows.into_iter()
        .map(|row| {
            let comments = load_comments(conn, &row.suggestion_id)?;
            row.decode(comments)
        })
        .collect()
}

fn load(conn: &Connection, id: &str) -> DeskResult<Option<RuleSuggestion>> {
    let row = conn
        .query_row(
            &format!("SELECT {SUGGESTION_COLUMNS} FROM rule_suggestion WHERE suggestion_id = ?1"),
            params![id],
            SuggestionRow::from_row,
        )
        .optional()?;
    Ok(decode_all(conn, row.into_iter().collect())?.pop())
}

fn load_pending(conn: &Connection, update_id: &str) -> DeskResult<Option<RuleSuggestion>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SUGGESTION_COLUMNS} FROM rule_suggestion
                 WHERE source_update_id = ?1 AND status = 'needs_review'
                 ORDER BY seq ASC LIMIT 1"
            ),
            params![update_id],
            SuggestionRow::from_row,
        )
        .optional()?;
    Ok(decode_all(conn, row.into_iter().collect())?.pop())
}

/// Conditional status update. Zero rows changed means another writer won.
fn compare_and_set(
    conn: &Connection,
    id: &str,
    from: SuggestionStatus,
    op: &'static str,
    sql: &str,
    values: &[&dyn rusqlite::ToSql],
) -> DeskResult<()> {
    let changed = conn.execute(sql, values)?;
    if changed != 1 {
        return Err(DeskError::InvalidTransition {
            id:   id.to_string(),
            from: from.to_string(),
            op,
        });
    }
    Ok(())
}

impl SuggestionRepository for DeskStore {
    fn get(&self, id: &str) -> DeskResult<Option<RuleSuggestion>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let found = load(&tx, id)?;
        tx.commit()?;
        Ok(found)
    }

    fn list(&self, status: Option<SuggestionStatus>) -> DeskResult<Vec<RuleSuggestion>> {
        let mut conn = self.conn()?;
        // Rows and their comments come from one read snapshot.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let rows = match status {
            Some(status) => {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {SUGGESTION_COLUMNS} FROM rule_suggestion
                     WHERE status = ?1 ORDER BY seq ASC"
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], SuggestionRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {SUGGESTION_COLUMNS} FROM rule_suggestion ORDER BY seq ASC"
                ))?;
                let rows = stmt
                    .query_map([], SuggestionRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        let suggestions = decode_all(&tx, rows)?;
        tx.commit()?;
        Ok(suggestions)
    }

    fn find_pending_by_update(&self, update_id: &str) -> DeskResult<Option<RuleSuggestion>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let found = load_pending(&tx, update_id)?;
        tx.commit()?;
        Ok(found)
    }

    fn insert_pending(&self, draft: SuggestionDraft) -> DeskResult<(RuleSuggestion, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = load_pending(&tx, &draft.source_update_id)? {
            tx.commit()?;
            return Ok((existing, false));
        }

        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM rule_suggestion",
            [],
            |row| row.get(0),
        )?;
        let id = format!("sug-{seq:06}");

        tx.execute(
            "INSERT INTO rule_suggestion
             (seq, suggestion_id, source_update_id, target_rule_id, rationale, confidence,
              impact_json, suggested_text, baseline_text, unified_diff, structured_diff_json,
              status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'needs_review', ?12)",
            params![
                seq,
                id,
                draft.source_update_id,
                draft.target_rule_id,
                draft.rationale,
                draft.confidence,
                serde_json::to_string(&draft.impact)?,
                draft.suggested_text,
                draft.baseline_text,
                draft.diff.unified,
                serde_json::to_string(&draft.diff.structured)?,
                format_ts(&draft.created_at),
            ],
        )?;

        append_event(
            &tx,
            &LifecycleEvent::SuggestionCreated {
                suggestion_id:    id.clone(),
                source_update_id: draft.source_update_id.clone(),
                target_rule_id:   draft.target_rule_id.clone(),
            },
            &draft.created_at,
        )?;

        let created = load(&tx, &id)?.ok_or_else(|| DeskError::not_found("suggestion", &id))?;
        tx.commit()?;
        Ok((created, true))
    }

    fn transition(&self, id: &str, transition: Transition) -> DeskResult<RuleSuggestion> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = load(&tx, id)?.ok_or_else(|| DeskError::not_found("suggestion", id))?;
        let from = transition.from_status();
        let op = transition.op();
        if current.status != from {
            return Err(DeskError::InvalidTransition {
                id:   id.to_string(),
                from: current.status.to_string(),
                op,
            });
        }
        let to = transition.to_status().as_str();

        let (event, at) = match &transition {
            Transition::Approve { rule_id, created_at } => {
                // The head must still be the text the suggestion was diffed
                // against; a rule with no history matches an empty baseline.
                let head = head_text(&tx, rule_id)?.unwrap_or_default();
                if head != current.baseline_text {
                    return Err(DeskError::StaleBaseline {
                        id:      id.to_string(),
                        rule_id: rule_id.clone(),
                    });
                }
                let version = append_version(&tx, rule_id, &current.suggested_text, created_at)?;
                compare_and_set(
                    &tx,
                    id,
                    from,
                    op,
                    "UPDATE rule_suggestion SET status = ?1, created_version_id = ?2
                     WHERE suggestion_id = ?3 AND status = ?4 AND created_version_id IS NULL",
                    params![to, version.version_id, id, from.as_str()],
                )?;
                let event = LifecycleEvent::SuggestionApproved {
                    suggestion_id: id.to_string(),
                    version_id:    version.version_id,
                };
                (event, *created_at)
            }
            Transition::Reject { at } => {
                compare_and_set(
                    &tx,
                    id,
                    from,
                    op,
                    "UPDATE rule_suggestion SET status = ?1
                     WHERE suggestion_id = ?2 AND status = ?3",
                    params![to, id, from.as_str()],
                )?;
                let event = LifecycleEvent::SuggestionRejected {
                    suggestion_id: id.to_string(),
                };
                (event, *at)
            }
            Transition::Promote { compile_artifact_id, promoted_at } => {
                compare_and_set(
                    &tx,
                    id,
                    from,
                    op,
                    "UPDATE rule_suggestion
                     SET status = ?1, compile_artifact_id = ?2, promoted_at = ?3
                     WHERE suggestion_id = ?4 AND status = ?5 AND compile_artifact_id IS NULL",
                    params![to, compile_artifact_id, format_ts(promoted_at), id, from.as_str()],
                )?;
                let event = LifecycleEvent::SuggestionPromoted {
                    suggestion_id:       id.to_string(),
                    compile_artifact_id: compile_artifact_id.clone(),
                };
                (event, *promoted_at)
            }
        };

        append_event(&tx, &event, &at)?;
        let updated = load(&tx, id)?.ok_or_else(|| DeskError::not_found("suggestion", id))?;
        tx.commit()?;
        Ok(updated)
    }

    fn append_comment(&self, id: &str, comment: Comment) -> DeskResult<RuleSuggestion> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT seq FROM rule_suggestion WHERE suggestion_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DeskError::not_found("suggestion", id));
        }

        tx.execute(
            "INSERT INTO suggestion_comment (suggestion_id, author, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, comment.author, comment.text, format_ts(&comment.created_at)],
        )?;
        append_event(
            &tx,
            &LifecycleEvent::CommentAdded {
                suggestion_id: id.to_string(),
                author:        comment.author.clone(),
            },
            &comment.created_at,
        )?;

        let updated = load(&tx, id)?.ok_or_else(|| DeskError::not_found("suggestion", id))?;
        tx.commit()?;
        Ok(updated)
    }
}

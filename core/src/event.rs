//! Lifecycle audit events.
//!
//! RULE: Every mutation of a suggestion appends exactly one event in the
//! same database transaction as the mutation itself.
//! Variants are added over time. Never remove or reorder them.

use crate::types::{RuleId, SuggestionId, UpdateId, VersionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SuggestionCreated {
        suggestion_id:    SuggestionId,
        source_update_id: UpdateId,
        target_rule_id:   Option<RuleId>,
    },
    SuggestionApproved {
        suggestion_id: SuggestionId,
        version_id:    VersionId,
    },
    SuggestionRejected {
        suggestion_id: SuggestionId,
    },
    SuggestionPromoted {
        suggestion_id:       SuggestionId,
        compile_artifact_id: String,
    },
    CommentAdded {
        suggestion_id: SuggestionId,
        author:        String,
    },
}

impl LifecycleEvent {
    pub fn suggestion_id(&self) -> &str {
        match self {
            LifecycleEvent::SuggestionCreated { suggestion_id, .. }
            | LifecycleEvent::SuggestionApproved { suggestion_id, .. }
            | LifecycleEvent::SuggestionRejected { suggestion_id }
            | LifecycleEvent::SuggestionPromoted { suggestion_id, .. }
            | LifecycleEvent::CommentAdded { suggestion_id, .. } => suggestion_id,
        }
    }

    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            LifecycleEvent::SuggestionCreated { .. }  => "suggestion_created",
            LifecycleEvent::SuggestionApproved { .. } => "suggestion_approved",
            LifecycleEvent::SuggestionRejected { .. } => "suggestion_rejected",
            LifecycleEvent::SuggestionPromoted { .. } => "suggestion_promoted",
            LifecycleEvent::CommentAdded { .. }       => "comment_added",
        }
    }
}

/// A row in the persistent event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:            Option<i64>,
    pub suggestion_id: SuggestionId,
    pub event_type:    String,
    pub payload:       String, // JSON-serialized LifecycleEvent
    pub recorded_at:   String,
}

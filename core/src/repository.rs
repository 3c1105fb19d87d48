//! Suggestion repository: the seam between the lifecycle controller and
//! whatever hosts the suggestions.
//!
//! RULE: Implementations must make `insert_pending` and `transition` atomic.
//! `insert_pending` returns the existing `needs_review` suggestion for the
//! update instead of creating a second one. `transition` is a
//! compare-and-swap on status: every field of the transition is written,
//! or none is.

use crate::{
    diff::RuleDiff,
    error::DeskResult,
    suggestion::{Comment, ImpactEstimate, RuleSuggestion, SuggestionStatus},
    types::{RuleId, UpdateId},
};
use chrono::{DateTime, Utc};

/// Everything the controller derives before a suggestion gets an id.
#[derive(Debug, Clone)]
pub struct SuggestionDraft {
    pub source_update_id: UpdateId,
    pub target_rule_id:   Option<RuleId>,
    pub rationale:        String,
    pub confidence:       f64,
    pub impact:           ImpactEstimate,
    pub suggested_text:   String,
    pub baseline_text:    String,
    pub diff:             RuleDiff,
    pub created_at:       DateTime<Utc>,
}

/// A status change plus the fields it sets.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Appends `suggested_text` as the next version of `rule_id` and
    /// records that version as `created_version_id`.
    Approve {
        rule_id:    RuleId,
        created_at: DateTime<Utc>,
    },
    Reject {
        at: DateTime<Utc>,
    },
    Promote {
        compile_artifact_id: String,
        promoted_at:         DateTime<Utc>,
    },
}

impl Transition {
    pub fn op(&self) -> &'static str {
        match self {
            Transition::Approve { .. } => "approve",
            Transition::Reject { .. }  => "reject",
            Transition::Promote { .. } => "promote",
        }
    }

    /// The only status this transition may start from.
    pub fn from_status(&self) -> SuggestionStatus {
        match self {
            Transition::Approve { .. } | Transition::Reject { .. } => {
                SuggestionStatus::NeedsReview
            }
            Transition::Promote { .. } => SuggestionStatus::Approved,
        }
    }

    pub fn to_status(&self) -> SuggestionStatus {
        match self {
            Transition::Approve { .. } => SuggestionStatus::Approved,
            Transition::Reject { .. }  => SuggestionStatus::Rejected,
            Transition::Promote { .. } => SuggestionStatus::Promoted,
        }
    }
}

pub trait SuggestionRepository: Send + Sync {
    fn get(&self, id: &str) -> DeskResult<Option<RuleSuggestion>>;

    /// All suggestions, oldest first, optionally filtered by status.
    fn list(&self, status: Option<SuggestionStatus>) -> DeskResult<Vec<RuleSuggestion>>;

    fn find_pending_by_update(&self, update_id: &str) -> DeskResult<Option<RuleSuggestion>>;

    /// Returns `(suggestion, created)`. `created` is false when a pending
    /// suggestion for the same update already existed.
    fn insert_pending(&self, draft: SuggestionDraft) -> DeskResult<(RuleSuggestion, bool)>;

    /// Fails with `NotFound` for an unknown id and `InvalidTransition` when
    /// the stored status is not `transition.from_status()`.
    fn transition(&self, id: &str, transition: Transition) -> DeskResult<RuleSuggestion>;

    /// Permitted in any status.
    fn append_comment(&self, id: &str, comment: Comment) -> DeskResult<RuleSuggestion>;
}

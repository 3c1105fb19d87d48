//! Suggestion entities and the shapes review surfaces consume verbatim.

use crate::{
    diff::StructuredChange,
    types::{RuleId, SuggestionId, UpdateId, VersionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle:
///   needs_review → approved → promoted
///   needs_review → rejected
/// `rejected` and `promoted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    NeedsReview,
    Approved,
    Rejected,
    Promoted,
}

impl SuggestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionStatus::NeedsReview => "needs_review",
            SuggestionStatus::Approved    => "approved",
            SuggestionStatus::Rejected    => "rejected",
            SuggestionStatus::Promoted    => "promoted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "needs_review" => Some(SuggestionStatus::NeedsReview),
            "approved"     => Some(SuggestionStatus::Approved),
            "rejected"     => Some(SuggestionStatus::Rejected),
            "promoted"     => Some(SuggestionStatus::Promoted),
            _              => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SuggestionStatus::Rejected | SuggestionStatus::Promoted)
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer comment. The comment log is the audit trail of a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author:     String,
    pub text:       String,
    pub created_at: DateTime<Utc>,
}

/// Expected effect of a suggestion over the recent transaction window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEstimate {
    pub evaluated:         usize,
    pub baseline_matches:  usize,
    pub suggested_matches: usize,
    /// suggested_matches - baseline_matches.
    pub delta:             i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSuggestion {
    pub id:                  SuggestionId,
    pub source_update_id:    UpdateId,
    pub target_rule_id:      Option<RuleId>,
    pub rationale:           String,
    pub confidence:          f64,
    pub impact:              ImpactEstimate,
    pub suggested_text:      String,
    pub baseline_text:       String,
    pub unified_diff:        String,
    pub structured_diff:     Vec<StructuredChange>,
    pub status:              SuggestionStatus,
    pub created_at:          DateTime<Utc>,
    pub comments:            Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_version_id:  Option<VersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_at:         Option<DateTime<Utc>>,
}

impl RuleSuggestion {
    /// Rule the suggestion writes to once approved. New rules are keyed
    /// off the suggestion id so approval never collides with a live rule.
    pub fn effective_rule_id(&self) -> RuleId {
        self.target_rule_id
            .clone()
            .unwrap_or_else(|| format!("new-{}", self.id))
    }
}

/// Immutable, append-only history entry for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleVersion {
    pub version_id: VersionId,
    pub rule_id:    RuleId,
    pub text:       String,
    pub created_at: DateTime<Utc>,
}

/// Regulatory update as delivered by the crawling collaborator.
/// Only `id` and the free text are used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatoryUpdate {
    pub id:        UpdateId,
    pub authority: String,
    pub title:     String,
    pub summary:   String,
    #[serde(default)]
    pub tags:      Vec<String>,
}

impl RegulatoryUpdate {
    /// Title, summary and tags as one lowercase haystack.
    pub fn text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.summary);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok:       bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub ok:           bool,
    pub evaluated:    usize,
    pub regressions:  usize,
    pub improvements: usize,
}

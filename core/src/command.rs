use crate::{
    suggestion::{ReplayReport, RuleSuggestion, ValidationReport},
    types::SuggestionId,
};
use serde::{Deserialize, Serialize};

/// Every operation a reviewer can issue against an existing suggestion.
/// Matched exhaustively by `LifecycleController::apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SuggestionOp {
    Approve  { suggestion_id: SuggestionId },
    Reject   { suggestion_id: SuggestionId },
    Promote  { suggestion_id: SuggestionId },
    Validate { suggestion_id: SuggestionId },
    Replay   { suggestion_id: SuggestionId },
    Comment {
        suggestion_id: SuggestionId,
        author:        String,
        text:          String,
    },
}

impl SuggestionOp {
    pub fn suggestion_id(&self) -> &str {
        match self {
            SuggestionOp::Approve { suggestion_id }
            | SuggestionOp::Reject { suggestion_id }
            | SuggestionOp::Promote { suggestion_id }
            | SuggestionOp::Validate { suggestion_id }
            | SuggestionOp::Replay { suggestion_id }
            | SuggestionOp::Comment { suggestion_id, .. } => suggestion_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OpOutcome {
    Updated   { suggestion: RuleSuggestion },
    Validated { report: ValidationReport },
    Replayed  { report: ReplayReport },
}

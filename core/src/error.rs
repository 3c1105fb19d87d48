use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Cannot {op} suggestion '{id}' from status '{from}'")]
    InvalidTransition {
        id:   String,
        from: String,
        op:   &'static str,
    },

    #[error("'{id}' failed validation: {}", warnings.join("; "))]
    ValidationFailure { id: String, warnings: Vec<String> },

    /// The target rule gained a version after the suggestion was drafted.
    #[error("Suggestion '{id}' was drafted against an older version of rule '{rule_id}'")]
    StaleBaseline { id: String, rule_id: String },

    #[error("Collaborator '{collaborator}' unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason:       String,
    },

    #[error("Invalid rule text: {0}")]
    RuleText(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeskError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        DeskError::NotFound { kind, id: id.into() }
    }

    pub fn unavailable(collaborator: &'static str, reason: impl ToString) -> Self {
        DeskError::CollaboratorUnavailable {
            collaborator,
            reason: reason.to_string(),
        }
    }

    /// Stable code for surfaces that render distinct messages per failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            DeskError::NotFound { .. }                => "not_found",
            DeskError::InvalidTransition { .. }       => "invalid_transition",
            DeskError::ValidationFailure { .. }       => "validation_failure",
            DeskError::StaleBaseline { .. }           => "stale_baseline",
            DeskError::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            DeskError::RuleText(_)                    => "invalid_rule_text",
            DeskError::Database(_)
            | DeskError::Serialization(_)
            | DeskError::LockPoisoned(_)
            | DeskError::Other(_)                     => "internal",
        }
    }
}

pub type DeskResult<T> = Result<T, DeskError>;

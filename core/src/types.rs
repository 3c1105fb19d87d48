//! Shared primitive types used across the entire desk.

/// Identifier of a suggestion entity (`sug-000001`).
pub type SuggestionId = String;

/// Identifier of a detection rule (`rule-2`).
pub type RuleId = String;

/// Identifier of a regulatory update as supplied by ingestion (`reg-7`).
pub type UpdateId = String;

/// Identifier of a transaction fact as supplied by ingestion.
pub type TransactionId = String;

/// Identifier of one immutable rule version (`rule-2@v3`).
pub type VersionId = String;

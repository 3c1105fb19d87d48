//! Suggestion lifecycle controller.
//!
//! STATES:
//!   needs_review (initial) → approved → promoted (terminal)
//!   needs_review → rejected (terminal)
//!
//! RULES:
//!   - At most one needs_review suggestion per regulatory update;
//!     re-proposing returns the existing one.
//!   - Transitions on one suggestion are mutually exclusive. A per-id lock
//!     serializes them here and the repository re-checks status with a
//!     compare-and-swap, so a second store on the same database is safe too.
//!   - Every precondition is checked before anything is written.
//!     A failed operation leaves the suggestion untouched.
//!   - validate/replay are read-only and never gate transitions.

use crate::{
    clock::Clock,
    collaborator::{
        ImpactEstimator, Replayer, RuleCompiler, RuleHistory, TransactionSource, UpdateSource,
        WindowImpactEstimator, WindowReplayer,
    },
    command::{OpOutcome, SuggestionOp},
    config::LifecycleConfig,
    diff::diff,
    error::{DeskError, DeskResult},
    lint,
    proposal::propose,
    repository::{SuggestionDraft, SuggestionRepository, Transition},
    store::DeskStore,
    suggestion::{Comment, ReplayReport, RuleSuggestion, SuggestionStatus, ValidationReport},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn SuggestionRepository>,
    pub rules:      Arc<dyn RuleHistory>,
    pub updates:    Arc<dyn UpdateSource>,
    pub estimator:  Arc<dyn ImpactEstimator>,
    pub replayer:   Arc<dyn Replayer>,
    pub compiler:   Arc<dyn RuleCompiler>,
    pub clock:      Arc<dyn Clock>,
}

impl Collaborators {
    /// Wire a single store as repository and data source, with window-based
    /// estimation and replay over its transaction facts.
    pub fn from_store(
        store:    Arc<DeskStore>,
        compiler: Arc<dyn RuleCompiler>,
        clock:    Arc<dyn Clock>,
        config:   &LifecycleConfig,
    ) -> Self {
        let facts: Arc<dyn TransactionSource> = store.clone();
        Self {
            repository: store.clone(),
            rules:      store.clone(),
            updates:    store,
            estimator:  Arc::new(WindowImpactEstimator::new(facts.clone(), config.replay_window)),
            replayer:   Arc::new(WindowReplayer::new(facts, config.replay_window)),
            compiler,
            clock,
        }
    }
}

/// One mutex per key. A slot lives only while some caller holds or
/// waits on it, so the table stays as small as the set of busy keys.
struct KeyedLocks {
    name:  &'static str,
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn new(name: &'static str) -> Self {
        Self { name, slots: Mutex::new(HashMap::new()) }
    }

    /// Run `f` while holding the lock for `key`.
    fn with<T>(&self, key: &str, f: impl FnOnce() -> DeskResult<T>) -> DeskResult<T> {
        let slot = self.table()?.entry(key.to_string()).or_default().clone();
        let result = {
            let _guard = slot.lock().map_err(|_| DeskError::LockPoisoned(self.name))?;
            f()
        };

        // Table lock held: nobody can clone the slot between the count
        // check and the removal. Two owners means the table and us.
        let mut slots = self.table()?;
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
        result
    }

    fn table(&self) -> DeskResult<std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>>> {
        self.slots
            .lock()
            .map_err(|_| DeskError::LockPoisoned("keyed lock table"))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

pub struct LifecycleController {
    collab:           Collaborators,
    config:           LifecycleConfig,
    update_locks:     KeyedLocks,
    suggestion_locks: KeyedLocks,
}

impl LifecycleController {
    pub fn new(collab: Collaborators, config: LifecycleConfig) -> Self {
        Self {
            collab,
            config,
            update_locks:     KeyedLocks::new("update lock"),
            suggestion_locks: KeyedLocks::new("suggestion lock"),
        }
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> DeskResult<RuleSuggestion> {
        self.collab
            .repository
            .get(id)?
            .ok_or_else(|| DeskError::not_found("suggestion", id))
    }

    pub fn list(&self, status: Option<SuggestionStatus>) -> DeskResult<Vec<RuleSuggestion>> {
        self.collab.repository.list(status)
    }

    // ── Creation ───────────────────────────────────────────────

    /// Propose a rule change for a regulatory update.
    /// Returns the existing needs_review suggestion for the update if any.
    pub fn create_from_update(&self, update_id: &str) -> DeskResult<RuleSuggestion> {
        self.update_locks
            .with(update_id, || self.create_locked(update_id))
    }

    fn create_locked(&self, update_id: &str) -> DeskResult<RuleSuggestion> {
        if let Some(existing) = self.collab.repository.find_pending_by_update(update_id)? {
            log::debug!("Update {update_id} already has pending suggestion {}", existing.id);
            return Ok(existing);
        }

        let update = self
            .collab
            .updates
            .get_update(update_id)?
            .ok_or_else(|| DeskError::not_found("regulatory update", update_id))?;

        let mut rules = Vec::new();
        for rule_id in self.collab.rules.rule_ids()? {
            if let Some(version) = self.collab.rules.latest_version(&rule_id)? {
                rules.push(version);
            }
        }

        let proposal = propose(&update, &rules, &self.config)?;
        let rule_diff = diff(&proposal.baseline_text, &proposal.suggested_text);
        let impact = self
            .collab
            .estimator
            .estimate(&proposal.baseline_text, &proposal.suggested_text)
            .map_err(|e| collaborator_failure("impact_estimator", e))?;

        let draft = SuggestionDraft {
            source_update_id: update.id.clone(),
            target_rule_id:   proposal.target_rule_id,
            rationale:        proposal.rationale,
            confidence:       proposal.confidence,
            impact,
            suggested_text:   proposal.suggested_text,
            baseline_text:    proposal.baseline_text,
            diff:             rule_diff,
            created_at:       self.collab.clock.now(),
        };

        let (suggestion, created) = self.collab.repository.insert_pending(draft)?;
        if created {
            log::info!(
                "Created suggestion {} from {} ({}, target={})",
                suggestion.id,
                update_id,
                proposal.kind.describe(),
                suggestion.target_rule_id.as_deref().unwrap_or("new rule"),
            );
        }
        Ok(suggestion)
    }

    // ── Read-only review aids ──────────────────────────────────

    pub fn validate(&self, id: &str) -> DeskResult<ValidationReport> {
        let suggestion = self.get(id)?;
        let report = lint::validate(&suggestion.suggested_text, &self.config);
        if !report.ok {
            log::debug!("Suggestion {id} lints with {} warning(s)", report.warnings.len());
        }
        Ok(report)
    }

    pub fn replay(&self, id: &str) -> DeskResult<ReplayReport> {
        let suggestion = self.get(id)?;
        self.collab
            .replayer
            .replay(&suggestion.baseline_text, &suggestion.suggested_text)
            .map_err(|e| collaborator_failure("replayer", e))
    }

    // ── Transitions ────────────────────────────────────────────

    /// Write the suggested text as the target rule's next version.
    /// Fails with StaleBaseline if the rule moved on since the suggestion
    /// was drafted; reject it and propose again against the new head.
    pub fn approve(&self, id: &str) -> DeskResult<RuleSuggestion> {
        self.suggestion_locks.with(id, || self.approve_locked(id))
    }

    fn approve_locked(&self, id: &str) -> DeskResult<RuleSuggestion> {
        let current = self.get(id)?;
        require_status(&current, SuggestionStatus::NeedsReview, "approve")?;

        let updated = self
            .collab
            .repository
            .transition(
                id,
                Transition::Approve {
                    rule_id:    current.effective_rule_id(),
                    created_at: self.collab.clock.now(),
                },
            )
            .map_err(|e| {
                if let DeskError::StaleBaseline { rule_id, .. } = &e {
                    log::warn!("Refusing to approve {id}: {rule_id} changed since it was drafted");
                }
                e
            })?;
        log::info!(
            "Approved {id} as {}",
            updated.created_version_id.as_deref().unwrap_or("?")
        );
        Ok(updated)
    }

    pub fn reject(&self, id: &str) -> DeskResult<RuleSuggestion> {
        self.suggestion_locks.with(id, || self.reject_locked(id))
    }

    fn reject_locked(&self, id: &str) -> DeskResult<RuleSuggestion> {
        let current = self.get(id)?;
        require_status(&current, SuggestionStatus::NeedsReview, "reject")?;

        let updated = self
            .collab
            .repository
            .transition(id, Transition::Reject { at: self.collab.clock.now() })?;
        log::info!("Rejected {id}");
        Ok(updated)
    }

    /// Compile and activate an approved suggestion.
    /// Approval is a mandatory gate: needs_review cannot be promoted.
    pub fn promote(&self, id: &str) -> DeskResult<RuleSuggestion> {
        self.suggestion_locks.with(id, || self.promote_locked(id))
    }

    fn promote_locked(&self, id: &str) -> DeskResult<RuleSuggestion> {
        let current = self.get(id)?;
        require_status(&current, SuggestionStatus::Approved, "promote")?;

        let artifact = self
            .collab
            .compiler
            .compile(&current.effective_rule_id(), &current.suggested_text)
            .map_err(|e| collaborator_failure("rule_compiler", e))?;

        let updated = self.collab.repository.transition(
            id,
            Transition::Promote {
                compile_artifact_id: artifact,
                promoted_at:         self.collab.clock.now(),
            },
        )?;
        log::info!(
            "Promoted {id} with artifact {}",
            updated.compile_artifact_id.as_deref().unwrap_or("?")
        );
        Ok(updated)
    }

    /// Append-only; permitted in any status.
    pub fn add_comment(&self, id: &str, author: &str, text: &str) -> DeskResult<RuleSuggestion> {
        let comment = Comment {
            author:     author.to_string(),
            text:       text.to_string(),
            created_at: self.collab.clock.now(),
        };
        self.collab.repository.append_comment(id, comment)
    }

    /// Dispatch a reviewer operation.
    pub fn apply(&self, op: SuggestionOp) -> DeskResult<OpOutcome> {
        let outcome = match op {
            SuggestionOp::Approve { suggestion_id } => OpOutcome::Updated {
                suggestion: self.approve(&suggestion_id)?,
            },
            SuggestionOp::Reject { suggestion_id } => OpOutcome::Updated {
                suggestion: self.reject(&suggestion_id)?,
            },
            SuggestionOp::Promote { suggestion_id } => OpOutcome::Updated {
                suggestion: self.promote(&suggestion_id)?,
            },
            SuggestionOp::Validate { suggestion_id } => OpOutcome::Validated {
                report: self.validate(&suggestion_id)?,
            },
            SuggestionOp::Replay { suggestion_id } => OpOutcome::Replayed {
                report: self.replay(&suggestion_id)?,
            },
            SuggestionOp::Comment { suggestion_id, author, text } => OpOutcome::Updated {
                suggestion: self.add_comment(&suggestion_id, &author, &text)?,
            },
        };
        Ok(outcome)
    }
}

fn require_status(
    suggestion: &RuleSuggestion,
    expected: SuggestionStatus,
    op: &'static str,
) -> DeskResult<()> {
    if suggestion.status == expected {
        return Ok(());
    }
    log::warn!(
        "Refusing to {op} {}: status is {}",
        suggestion.id,
        suggestion.status
    );
    Err(DeskError::InvalidTransition {
        id:   suggestion.id.clone(),
        from: suggestion.status.to_string(),
        op,
    })
}

/// Collaborator errors surface as CollaboratorUnavailable unless they
/// already carry a more specific class.
fn collaborator_failure(collaborator: &'static str, err: DeskError) -> DeskError {
    match err {
        DeskError::CollaboratorUnavailable { .. } => err,
        other => {
            log::warn!("{collaborator} failed: {other}");
            DeskError::unavailable(collaborator, other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Barrier, thread};

    #[test]
    fn slot_is_dropped_once_its_holder_returns() {
        let locks = KeyedLocks::new("test lock");
        let value = locks.with("sug-000001", || Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn slot_is_dropped_when_the_body_fails() {
        let locks = KeyedLocks::new("test lock");
        let err = locks
            .with("sug-404", || -> DeskResult<()> {
                Err(DeskError::not_found("suggestion", "sug-404"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn many_distinct_keys_leave_no_slots_behind() {
        let locks = KeyedLocks::new("test lock");
        for n in 0..1000 {
            locks.with(&format!("reg-{n}"), || Ok(())).unwrap();
        }
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn same_key_callers_are_serialized_and_the_table_drains() {
        let locks = Arc::new(KeyedLocks::new("test lock"));
        let inside = Arc::new(Mutex::new(0usize));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    locks
                        .with("sug-000001", || {
                            let now = {
                                let mut n = inside.lock().unwrap();
                                *n += 1;
                                *n
                            };
                            thread::yield_now();
                            *inside.lock().unwrap() -= 1;
                            Ok(now)
                        })
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
        assert_eq!(locks.len(), 0);
    }
}

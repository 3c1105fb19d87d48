//! External collaborators the lifecycle controller depends on.
//!
//! Data sources (updates, rule history, transaction facts) are implemented
//! by `DeskStore`. Estimation and replay default to window-based
//! implementations that run rule texts over recent transaction facts.
//! Compilation is always supplied by the host.

use crate::{
    error::{DeskError, DeskResult},
    fact::TransactionFact,
    rule_text::RuleDoc,
    suggestion::{ImpactEstimate, RegulatoryUpdate, ReplayReport, RuleVersion},
    types::RuleId,
};
use std::sync::Arc;

pub trait UpdateSource: Send + Sync {
    fn get_update(&self, id: &str) -> DeskResult<Option<RegulatoryUpdate>>;
}

pub trait RuleHistory: Send + Sync {
    /// Every rule with at least one version, in id order.
    fn rule_ids(&self) -> DeskResult<Vec<RuleId>>;

    fn latest_version(&self, rule_id: &str) -> DeskResult<Option<RuleVersion>>;

    /// Oldest first.
    fn versions(&self, rule_id: &str) -> DeskResult<Vec<RuleVersion>>;
}

pub trait TransactionSource: Send + Sync {
    fn get_fact(&self, id: &str) -> DeskResult<Option<TransactionFact>>;

    /// Up to `limit` most recently ingested facts, oldest first.
    fn recent_facts(&self, limit: usize) -> DeskResult<Vec<TransactionFact>>;
}

pub trait ImpactEstimator: Send + Sync {
    fn estimate(&self, baseline: &str, suggested: &str) -> DeskResult<ImpactEstimate>;
}

pub trait Replayer: Send + Sync {
    fn replay(&self, baseline: &str, suggested: &str) -> DeskResult<ReplayReport>;
}

/// Versioning/compilation collaborator used by `promote`.
pub trait RuleCompiler: Send + Sync {
    /// Returns the compile artifact id for `text`.
    fn compile(&self, rule_id: &str, text: &str) -> DeskResult<String>;
}

// ── Window-based defaults ────────────────────────────────────────────────────

/// Per-fact match outcome of a baseline and a suggested rule.
struct WindowTally {
    evaluated:         usize,
    baseline_matches:  usize,
    suggested_matches: usize,
    regressions:       usize,
    improvements:      usize,
}

fn tally(
    source: &dyn TransactionSource,
    window: usize,
    baseline: &str,
    suggested: &str,
) -> DeskResult<WindowTally> {
    let facts = source
        .recent_facts(window)
        .map_err(|e| DeskError::unavailable("transaction_window", e))?;

    let baseline_doc = RuleDoc::parse(baseline);
    let suggested_doc = RuleDoc::parse(suggested);
    // An empty baseline is a rule that does not exist yet: it matches nothing.
    let baseline_live = !baseline.trim().is_empty();

    let mut t = WindowTally {
        evaluated:         facts.len(),
        baseline_matches:  0,
        suggested_matches: 0,
        regressions:       0,
        improvements:      0,
    };
    for tx in &facts {
        let before = baseline_live && baseline_doc.matches(tx);
        let after = suggested_doc.matches(tx);
        t.baseline_matches += before as usize;
        t.suggested_matches += after as usize;
        match (before, after) {
            (true, false) => t.regressions += 1,
            (false, true) => t.improvements += 1,
            _ => {}
        }
    }
    Ok(t)
}

pub struct WindowImpactEstimator {
    source: Arc<dyn TransactionSource>,
    window: usize,
}

impl WindowImpactEstimator {
    pub fn new(source: Arc<dyn TransactionSource>, window: usize) -> Self {
        Self { source, window }
    }
}

impl ImpactEstimator for WindowImpactEstimator {
    fn estimate(&self, baseline: &str, suggested: &str) -> DeskResult<ImpactEstimate> {
        let t = tally(self.source.as_ref(), self.window, baseline, suggested)?;
        Ok(ImpactEstimate {
            evaluated:         t.evaluated,
            baseline_matches:  t.baseline_matches,
            suggested_matches: t.suggested_matches,
            delta:             t.suggested_matches as i64 - t.baseline_matches as i64,
        })
    }
}

/// Replays both rule texts over the recent window. A regression is a fact
/// the baseline caught that the suggestion no longer catches.
pub struct WindowReplayer {
    source: Arc<dyn TransactionSource>,
    window: usize,
}

impl WindowReplayer {
    pub fn new(source: Arc<dyn TransactionSource>, window: usize) -> Self {
        Self { source, window }
    }
}

impl Replayer for WindowReplayer {
    fn replay(&self, baseline: &str, suggested: &str) -> DeskResult<ReplayReport> {
        let t = tally(self.source.as_ref(), self.window, baseline, suggested)?;
        Ok(ReplayReport {
            ok:           t.regressions == 0,
            evaluated:    t.evaluated,
            regressions:  t.regressions,
            improvements: t.improvements,
        })
    }
}

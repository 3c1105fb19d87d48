//! Change heuristic: regulatory update → proposed rule text.
//!
//! Deterministic: the same update and rule set always yield the same
//! proposal. Real language understanding happens upstream; this module
//! only pattern-matches the update's free text.
//!
//! Steps:
//!   1. Pick the target rule by keyword overlap (ties → lowest rule id).
//!      No overlap → propose a new rule.
//!   2. If the update names a currency amount and the target has an
//!      `amount` threshold, substitute the threshold.
//!   3. Otherwise append the first catalogue filter the update mentions
//!      (or the fallback filter) that the rule does not already carry.
//!      A rule that already carries all of them gets no proposal.

use crate::{
    config::{FilterTemplate, LifecycleConfig},
    error::{DeskError, DeskResult},
    rule_text::{format_number, Condition, Op, RuleDoc},
    suggestion::{RegulatoryUpdate, RuleVersion},
    types::RuleId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const MIN_KEYWORD_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "alert", "also", "and", "from", "have", "into", "must", "rule", "shall", "should",
    "that", "their", "then", "these", "this", "when", "where", "which", "will", "with",
    "true", "false", "severity", "high", "medium", "low",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ParameterSubstitution,
    FilterAddition,
    NewRule,
}

impl ChangeKind {
    pub fn describe(self) -> &'static str {
        match self {
            ChangeKind::ParameterSubstitution => "threshold substitution",
            ChangeKind::FilterAddition        => "filter addition",
            ChangeKind::NewRule               => "new rule",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub target_rule_id: Option<RuleId>,
    pub baseline_text:  String,
    pub suggested_text: String,
    pub kind:           ChangeKind,
    /// Keywords shared by the update and the target rule.
    pub overlap:        usize,
    pub confidence:     f64,
    pub rationale:      String,
}

/// Build a proposal for `update` against the latest version of each rule.
pub fn propose(
    update: &RegulatoryUpdate,
    rules: &[RuleVersion],
    config: &LifecycleConfig,
) -> DeskResult<Proposal> {
    let haystack = update.text();
    let update_words = keywords(&haystack);
    let amount = extract_amount(&format!("{} {}", update.title, update.summary));

    let target = select_target(&update_words, rules);

    let (target_rule_id, baseline_text, suggested_text, kind, overlap) = match target {
        None => {
            let text = new_rule_text(update, &haystack, amount, config)?;
            (None, String::new(), text, ChangeKind::NewRule, 0)
        }
        Some((rule, overlap)) => {
            let doc = RuleDoc::parse(&rule.text);
            let (text, kind) = match substitute_threshold(&doc, amount)? {
                Some(text) => (text, ChangeKind::ParameterSubstitution),
                None => match add_filter(&doc, &haystack, config)? {
                    Some(text) => (text, ChangeKind::FilterAddition),
                    None => {
                        return Err(DeskError::ValidationFailure {
                            id:       update.id.clone(),
                            warnings: vec![format!(
                                "rule '{}' already carries every applicable filter",
                                rule.rule_id
                            )],
                        })
                    }
                },
            };
            (Some(rule.rule_id.clone()), rule.text.clone(), text, kind, overlap)
        }
    };

    let confidence = confidence(kind, overlap, config);
    let rationale = format!(
        "{} update {} \"{}\": {} on {}",
        update.authority,
        update.id,
        update.title,
        kind.describe(),
        target_rule_id.as_deref().unwrap_or("a new rule"),
    );

    Ok(Proposal {
        target_rule_id,
        baseline_text,
        suggested_text,
        kind,
        overlap,
        confidence,
        rationale,
    })
}

/// Lowercase words of at least MIN_KEYWORD_LEN letters, minus stopwords.
/// Snake-case identifiers contribute each part.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() >= MIN_KEYWORD_LEN && !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn select_target<'a>(
    update_words: &BTreeSet<String>,
    rules: &'a [RuleVersion],
) -> Option<(&'a RuleVersion, usize)> {
    let mut sorted: Vec<&RuleVersion> = rules.iter().collect();
    sorted.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

    let mut best: Option<(&RuleVersion, usize)> = None;
    for rule in sorted {
        let overlap = keywords(&rule.text).intersection(update_words).count();
        if overlap == 0 {
            continue;
        }
        if best.map_or(true, |(_, b)| overlap > b) {
            best = Some((rule, overlap));
        }
    }
    best
}

/// First currency-marked amount in `text`: `$3,000`, `€10000`, `USD 5,000`.
pub fn extract_amount(text: &str) -> Option<f64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        let token = token.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')'));
        let token = token.trim_start_matches('(');
        let symbol = token.strip_prefix(['$', '€', '£']);
        let prev_is_code = i > 0
            && matches!(tokens[i - 1].to_ascii_uppercase().as_str(), "USD" | "EUR" | "GBP");
        let raw = match symbol {
            Some(rest) => rest,
            None if prev_is_code => token,
            None => continue,
        };
        if let Ok(n) = raw.replace(',', "").parse::<f64>() {
            if n.is_finite() && n > 0.0 {
                return Some(n);
            }
        }
    }
    None
}

fn substitute_threshold(doc: &RuleDoc, amount: Option<f64>) -> DeskResult<Option<String>> {
    let Some(amount) = amount else {
        return Ok(None);
    };
    let threshold = doc
        .conditions
        .iter()
        .find(|c| c.field == "amount" && matches!(c.op, Op::Gte | Op::Gt));
    match threshold {
        Some(cond) if cond.value.as_number() != Some(amount) => {
            let text = doc.set_param(&cond.path(), &format_number(amount))?;
            Ok(Some(text))
        }
        _ => Ok(None),
    }
}

fn matching_filters<'a>(haystack: &str, catalogue: &'a [FilterTemplate]) -> Vec<&'a str> {
    catalogue
        .iter()
        .filter(|t| t.keywords.iter().any(|k| haystack.contains(&k.to_lowercase())))
        .map(|t| t.condition.as_str())
        .collect()
}

/// `None` when every candidate filter is already on the rule.
fn add_filter(
    doc: &RuleDoc,
    haystack: &str,
    config: &LifecycleConfig,
) -> DeskResult<Option<String>> {
    let mut candidates = matching_filters(haystack, &config.filter_catalogue);
    candidates.push(config.fallback_filter.as_str());

    let existing: BTreeSet<String> = doc.conditions.iter().map(Condition::path).collect();
    for candidate in candidates {
        let Some(cond) = Condition::parse(candidate, 0) else {
            log::warn!("Skipping unparseable catalogue filter '{candidate}'");
            continue;
        };
        if !existing.contains(&cond.path()) {
            return doc.with_condition(candidate).map(Some);
        }
    }
    Ok(None)
}

fn new_rule_text(
    update: &RegulatoryUpdate,
    haystack: &str,
    amount: Option<f64>,
    config: &LifecycleConfig,
) -> DeskResult<String> {
    let mut conditions: Vec<String> = Vec::new();
    if let Some(amount) = amount {
        conditions.push(format!("amount >= {}", format_number(amount)));
    }
    for filter in matching_filters(haystack, &config.filter_catalogue) {
        if !conditions.iter().any(|c| c == filter) {
            conditions.push(filter.to_string());
        }
    }
    if conditions.is_empty() {
        conditions.push(config.fallback_filter.clone());
    }

    let title = update.title.replace('"', "'");
    let mut text = format!("rule \"{title}\"\n");
    for (i, cond) in conditions.iter().enumerate() {
        let keyword = if i == 0 { "when" } else { "and" };
        text.push_str(&format!("{keyword} {cond}\n"));
    }
    text.push_str(&format!("then alert severity=medium source={}\n", update.id));

    // Catalogue filters come from config and are not checked on load.
    let doc = RuleDoc::parse(&text);
    if !doc.problems.is_empty() {
        log::warn!("New rule for {} has problems: {:?}", update.id, doc.problems);
    }
    Ok(text)
}

fn confidence(kind: ChangeKind, overlap: usize, config: &LifecycleConfig) -> f64 {
    let table = &config.confidence;
    let base = match kind {
        ChangeKind::ParameterSubstitution => table.parameter_substitution,
        ChangeKind::FilterAddition        => table.filter_addition,
        ChangeKind::NewRule               => table.new_rule,
    };
    let bonus = (overlap as f64 * table.overlap_bonus).min(table.max_overlap_bonus);
    let raw = (base + bonus).clamp(0.0, 1.0);
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn version(rule_id: &str, text: &str) -> RuleVersion {
        RuleVersion {
            version_id: format!("{rule_id}@v1"),
            rule_id:    rule_id.into(),
            text:       text.into(),
            created_at: Utc::now(),
        }
    }

    fn update(id: &str, title: &str, summary: &str) -> RegulatoryUpdate {
        RegulatoryUpdate {
            id:        id.into(),
            authority: "FinCEN".into(),
            title:     title.into(),
            summary:   summary.into(),
            tags:      vec![],
        }
    }

    fn rules() -> Vec<RuleVersion> {
        vec![
            version("rule-1", "rule \"PEP wires\"\nwhen pep == true\nand swift_message_type != \"\"\nthen alert severity=high\n"),
            version("rule-2", "rule \"Large cash deposits\"\nwhen amount >= 10000\nand channel == \"cash\"\nthen alert severity=high\n"),
        ]
    }

    #[test]
    fn extracts_currency_marked_amounts_only() {
        assert_eq!(extract_amount("Rule 2024 lowers the limit to $3,000."), Some(3000.0));
        assert_eq!(extract_amount("threshold of USD 5,500 applies"), Some(5500.0));
        assert_eq!(extract_amount("effective 2025 under section 12"), None);
    }

    #[test]
    fn amount_update_substitutes_threshold_on_best_rule() {
        let u = update("reg-3", "Cash deposit reporting", "Lower the cash threshold to $3,000.");
        let p = propose(&u, &rules(), &LifecycleConfig::default()).unwrap();
        assert_eq!(p.target_rule_id.as_deref(), Some("rule-2"));
        assert_eq!(p.kind, ChangeKind::ParameterSubstitution);
        assert!(p.suggested_text.contains("when amount >= 3000"));
        assert!(p.suggested_text.contains("and channel == \"cash\""));
    }

    #[test]
    fn keyword_update_adds_catalogue_filter() {
        let u = update("reg-5", "Cash couriers", "Cash deposits lacking travel rule originator data.");
        let p = propose(&u, &rules(), &LifecycleConfig::default()).unwrap();
        assert_eq!(p.target_rule_id.as_deref(), Some("rule-2"));
        assert_eq!(p.kind, ChangeKind::FilterAddition);
        assert!(p.suggested_text.contains("and travel_rule_complete == false\nthen"));
    }

    #[test]
    fn unrelated_update_proposes_new_rule() {
        let u = update("reg-9", "Virtual asset providers", "VASP counterparties require review.");
        let p = propose(&u, &rules(), &LifecycleConfig::default()).unwrap();
        assert_eq!(p.target_rule_id, None);
        assert_eq!(p.kind, ChangeKind::NewRule);
        assert!(p.baseline_text.is_empty());
        assert!(p.suggested_text.starts_with("rule \"Virtual asset providers\"\nwhen virtual_asset_exposure == true\n"));
        assert!(p.suggested_text.ends_with("then alert severity=medium source=reg-9\n"));
    }

    #[test]
    fn rule_with_every_candidate_filter_gets_no_proposal() {
        let mut rules = rules();
        rules.push(version(
            "rule-4",
            "rule \"Travel rule originator\"\nwhen travel_rule_complete == false\nand counterparty_country in [\"IR\", \"KP\", \"SY\", \"CU\"]\nthen alert severity=medium\n",
        ));
        let u = update("reg-12", "Originator gaps", "Travel rule originator data incomplete.");

        let err = propose(&u, &rules, &LifecycleConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "validation_failure");
        match err {
            DeskError::ValidationFailure { id, warnings } => {
                assert_eq!(id, "reg-12");
                assert_eq!(warnings, vec!["rule 'rule-4' already carries every applicable filter"]);
            }
            other => panic!("expected ValidationFailure, got {other:?}"),
        }
    }

    #[test]
    fn confidence_depends_on_kind_and_overlap() {
        let config = LifecycleConfig::default();
        assert_eq!(confidence(ChangeKind::NewRule, 0, &config), 0.5);
        assert_eq!(confidence(ChangeKind::ParameterSubstitution, 2, &config), 0.84);
        assert_eq!(confidence(ChangeKind::FilterAddition, 50, &config), 0.75);
    }

    #[test]
    fn proposals_are_deterministic() {
        let u = update("reg-3", "Cash deposit reporting", "Lower the cash threshold to $3,000.");
        let a = propose(&u, &rules(), &LifecycleConfig::default()).unwrap();
        let b = propose(&u, &rules(), &LifecycleConfig::default()).unwrap();
        assert_eq!(a, b);
    }
}

//! Rule evaluation engine: transaction fact → risk assessment.
//!
//! Pure and deterministic: no I/O, no clock, no randomness, never fails.
//! A missing optional attribute means the predicate does not apply.
//!
//! ALGORITHM:
//!   1. Walk DECLARED_ORDER, emitting a RuleHit for every predicate that matches.
//!   2. Sum the contributions and clamp to the score ceiling.
//!   3. Apply score floors (sanctions hit, potential match, large amount).
//!   4. Derive severity from sanctions status and the final score.
//!   5. Keep the first `max_rule_hits` hits by position, never by magnitude.

use crate::{
    config::RiskPolicy,
    fact::{SanctionsStatus, TransactionFact},
    types::TransactionId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low      => "low",
            Severity::Medium   => "medium",
            Severity::High     => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHit {
    pub id:    String,
    pub name:  String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub severity:   Severity,
    pub risk_score: u32,
    pub rule_hits:  Vec<RuleHit>,
}

// ── Predicates ───────────────────────────────────────────────────────────────

/// Every detection predicate the engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    SanctionsHit,
    SanctionsPotentialMatch,
    AmlScore,
    HighAmount,
    Pep,
    TravelRuleIncomplete,
    VirtualAssetUndisclosed,
    SwiftOrderingCustomer,
    SwiftBeneficiary,
    SwiftRemittanceInfo,
    SwiftCharges,
    KycOverdue,
    EddNotPerformed,
    SourceOfWealthUndocumented,
    FxSpread,
    DailyCashVolume,
    DailyCashCount,
    CashIdUnverified,
    OffHours,
    Weekend,
}

/// Evaluation order. Display truncation keeps the first matches of this
/// list, so reordering it changes what reviewers see.
pub const DECLARED_ORDER: [Check; 20] = [
    Check::SanctionsHit,
    Check::SanctionsPotentialMatch,
    Check::AmlScore,
    Check::HighAmount,
    Check::Pep,
    Check::TravelRuleIncomplete,
    Check::VirtualAssetUndisclosed,
    Check::SwiftOrderingCustomer,
    Check::SwiftBeneficiary,
    Check::SwiftRemittanceInfo,
    Check::SwiftCharges,
    Check::KycOverdue,
    Check::EddNotPerformed,
    Check::SourceOfWealthUndocumented,
    Check::FxSpread,
    Check::DailyCashVolume,
    Check::DailyCashCount,
    Check::CashIdUnverified,
    Check::OffHours,
    Check::Weekend,
];

impl Check {
    pub fn id(self) -> &'static str {
        match self {
            Check::SanctionsHit               => "SANCTIONS_HIT",
            Check::SanctionsPotentialMatch    => "SANCTIONS_POTENTIAL",
            Check::AmlScore                   => "AML_SCORE",
            Check::HighAmount                 => "HIGH_AMOUNT",
            Check::Pep                        => "PEP",
            Check::TravelRuleIncomplete       => "TRAVEL_RULE",
            Check::VirtualAssetUndisclosed    => "VA_UNDISCLOSED",
            Check::SwiftOrderingCustomer      => "SWIFT_50K",
            Check::SwiftBeneficiary           => "SWIFT_59",
            Check::SwiftRemittanceInfo        => "SWIFT_70",
            Check::SwiftCharges               => "SWIFT_71A",
            Check::KycOverdue                 => "KYC_OVERDUE",
            Check::EddNotPerformed            => "EDD_MISSING",
            Check::SourceOfWealthUndocumented => "SOW_UNDOCUMENTED",
            Check::FxSpread                   => "FX_SPREAD",
            Check::DailyCashVolume            => "CASH_VOLUME",
            Check::DailyCashCount             => "CASH_COUNT",
            Check::CashIdUnverified           => "CASH_ID",
            Check::OffHours                   => "OFF_HOURS",
            Check::Weekend                    => "WEEKEND",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Check::SanctionsHit               => "Sanctions hit",
            Check::SanctionsPotentialMatch    => "Sanctions potential match",
            Check::AmlScore                   => "High AML score",
            Check::HighAmount                 => "High amount",
            Check::Pep                        => "Politically exposed person",
            Check::TravelRuleIncomplete       => "Travel rule incomplete",
            Check::VirtualAssetUndisclosed    => "Undisclosed virtual asset exposure",
            Check::SwiftOrderingCustomer      => "SWIFT 50K missing",
            Check::SwiftBeneficiary           => "SWIFT 59 missing",
            Check::SwiftRemittanceInfo        => "SWIFT 70 missing",
            Check::SwiftCharges               => "SWIFT 71A missing",
            Check::KycOverdue                 => "KYC review overdue",
            Check::EddNotPerformed            => "EDD required but not performed",
            Check::SourceOfWealthUndocumented => "Source of wealth undocumented",
            Check::FxSpread                   => "FX spread above threshold",
            Check::DailyCashVolume            => "Elevated daily cash volume",
            Check::DailyCashCount             => "Elevated daily cash count",
            Check::CashIdUnverified           => "Cash identity unverified",
            Check::OffHours                   => "Off-hours booking",
            Check::Weekend                    => "Weekend booking",
        }
    }

    pub fn weight(self, policy: &RiskPolicy) -> u32 {
        let w = &policy.weights;
        match self {
            Check::SanctionsHit               => w.sanctions_hit,
            Check::SanctionsPotentialMatch    => w.sanctions_potential_match,
            Check::AmlScore                   => w.aml_score,
            Check::HighAmount                 => w.high_amount,
            Check::Pep                        => w.pep,
            Check::TravelRuleIncomplete       => w.travel_rule_incomplete,
            Check::VirtualAssetUndisclosed    => w.virtual_asset_undisclosed,
            Check::SwiftOrderingCustomer      => w.swift_ordering_customer,
            Check::SwiftBeneficiary           => w.swift_beneficiary,
            Check::SwiftRemittanceInfo        => w.swift_remittance_info,
            Check::SwiftCharges               => w.swift_charges,
            Check::KycOverdue                 => w.kyc_overdue,
            Check::EddNotPerformed            => w.edd_not_performed,
            Check::SourceOfWealthUndocumented => w.source_of_wealth_undocumented,
            Check::FxSpread                   => w.fx_spread,
            Check::DailyCashVolume            => w.daily_cash_volume,
            Check::DailyCashCount             => w.daily_cash_count,
            Check::CashIdUnverified           => w.cash_id_unverified,
            Check::OffHours                   => w.off_hours,
            Check::Weekend                    => w.weekend,
        }
    }

    pub fn applies(self, tx: &TransactionFact, policy: &RiskPolicy) -> bool {
        let t = &policy.thresholds;
        match self {
            Check::SanctionsHit => tx.sanctions() == SanctionsStatus::Hit,
            Check::SanctionsPotentialMatch => {
                tx.sanctions() == SanctionsStatus::PotentialMatch
            }
            Check::AmlScore => tx.aml_score.is_some_and(|s| s >= t.aml_score),
            Check::HighAmount => is_large_amount(tx, policy),
            Check::Pep => tx.pep,
            Check::TravelRuleIncomplete => tx.travel_rule_complete == Some(false),
            Check::VirtualAssetUndisclosed => {
                tx.virtual_asset_exposure && !tx.virtual_asset_disclosed
            }
            Check::SwiftOrderingCustomer => {
                tx.swift_message().is_some_and(|s| !s.ordering_customer)
            }
            Check::SwiftBeneficiary => tx.swift_message().is_some_and(|s| !s.beneficiary),
            Check::SwiftRemittanceInfo => {
                tx.swift_message().is_some_and(|s| !s.remittance_info)
            }
            Check::SwiftCharges => tx.swift_message().is_some_and(|s| !s.charges),
            Check::KycOverdue => tx.kyc_overdue() == Some(true),
            Check::EddNotPerformed => tx.edd_required && !tx.edd_performed,
            Check::SourceOfWealthUndocumented => tx.source_of_wealth_documented == Some(false),
            Check::FxSpread => tx.fx_spread_bps.is_some_and(|bps| bps > t.fx_spread_bps),
            Check::DailyCashVolume => {
                tx.daily_cash_total.is_some_and(|v| v >= t.daily_cash_volume)
            }
            Check::DailyCashCount => {
                tx.daily_cash_count.is_some_and(|c| c >= t.daily_cash_count)
            }
            Check::CashIdUnverified => tx.cash_id_verified == Some(false),
            Check::OffHours => tx.booking_hour().is_some_and(|h| {
                h < t.business_hours_start || h >= t.business_hours_end
            }),
            Check::Weekend => tx.booked_on_weekend() == Some(true),
        }
    }
}

fn is_large_amount(tx: &TransactionFact, policy: &RiskPolicy) -> bool {
    tx.amount.is_finite() && tx.amount > policy.thresholds.large_amount
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Stateless evaluator bound to one policy. Safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    policy: RiskPolicy,
}

impl RiskEngine {
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub fn evaluate(&self, tx: &TransactionFact) -> RiskAssessment {
        evaluate(tx, &self.policy)
    }

    /// Evaluate a batch and order it for alert lists:
    /// highest score first, then severity, then transaction id.
    pub fn rank(&self, facts: &[TransactionFact]) -> Vec<(TransactionId, RiskAssessment)> {
        let mut ranked: Vec<_> = facts
            .iter()
            .map(|tx| (tx.transaction_id.clone(), self.evaluate(tx)))
            .collect();
        ranked.sort_by(|(id_a, a), (id_b, b)| {
            b.risk_score
                .cmp(&a.risk_score)
                .then(b.severity.cmp(&a.severity))
                .then(id_a.cmp(id_b))
        });
        ranked
    }
}

/// Evaluate one transaction fact under `policy`.
pub fn evaluate(tx: &TransactionFact, policy: &RiskPolicy) -> RiskAssessment {
    let mut hits = Vec::new();
    let mut total: u32 = 0;

    for check in DECLARED_ORDER {
        if !check.applies(tx, policy) {
            continue;
        }
        let score = check.weight(policy);
        total = total.saturating_add(score);
        hits.push(RuleHit {
            id:    check.id().to_string(),
            name:  check.name().to_string(),
            score,
        });
    }

    let sanctions = tx.sanctions();
    let mut risk_score = total.min(policy.score_ceiling);

    match sanctions {
        SanctionsStatus::Hit => risk_score = risk_score.max(policy.floors.sanctions_hit),
        SanctionsStatus::PotentialMatch => {
            risk_score = risk_score.max(policy.floors.sanctions_potential_match)
        }
        SanctionsStatus::Clear => {}
    }
    if is_large_amount(tx, policy) {
        risk_score = risk_score.max(policy.floors.large_amount);
    }
    let risk_score = risk_score.min(policy.score_ceiling).min(100);

    let severity = match sanctions {
        SanctionsStatus::Hit => Severity::Critical,
        SanctionsStatus::PotentialMatch => Severity::High,
        SanctionsStatus::Clear if risk_score >= policy.severity.high => Severity::High,
        SanctionsStatus::Clear if risk_score >= policy.severity.medium => Severity::Medium,
        SanctionsStatus::Clear => Severity::Low,
    };

    hits.truncate(policy.max_rule_hits);

    log::debug!(
        "evaluated {}: score={} severity={} hits={}",
        tx.transaction_id,
        risk_score,
        severity.as_str(),
        hits.len()
    );

    RiskAssessment {
        severity,
        risk_score,
        rule_hits: hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::SwiftFields;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid timestamp")
    }

    fn fact(amount: f64) -> TransactionFact {
        TransactionFact {
            transaction_id: "tx-1".into(),
            amount,
            sanctions_status: Some(SanctionsStatus::Clear),
            ..Default::default()
        }
    }

    #[test]
    fn empty_fact_is_low_with_no_hits() {
        let result = RiskEngine::default().evaluate(&TransactionFact::default());
        assert_eq!(result.risk_score, 0);
        assert_eq!(result.severity, Severity::Low);
        assert!(result.rule_hits.is_empty());
    }

    #[test]
    fn hit_is_critical_even_with_nothing_else() {
        let mut tx = fact(10.0);
        tx.sanctions_status = Some(SanctionsStatus::Hit);
        let result = RiskEngine::default().evaluate(&tx);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.risk_score, 95);
        assert_eq!(result.rule_hits[0].id, "SANCTIONS_HIT");
    }

    #[test]
    fn potential_match_floors_to_75_and_is_high() {
        let mut tx = fact(10.0);
        tx.sanctions_status = Some(SanctionsStatus::PotentialMatch);
        let result = RiskEngine::default().evaluate(&tx);
        assert_eq!(result.risk_score, 75);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn large_amount_floor_applies_to_clear_transactions() {
        let result = RiskEngine::default().evaluate(&fact(150_000.0));
        assert_eq!(result.risk_score, 70);
        assert_eq!(result.severity, Severity::Medium);
        assert!(result.rule_hits.iter().any(|h| h.name == "High amount"));
    }

    #[test]
    fn amount_at_threshold_is_not_large() {
        let result = RiskEngine::default().evaluate(&fact(100_000.0));
        assert_eq!(result.risk_score, 0);
    }

    #[test]
    fn hits_are_truncated_by_position_not_score() {
        // Five matches; OFF_HOURS is fifth in declared order and is dropped
        // from display but still counted in the score.
        let mut tx = fact(200_000.0);
        tx.travel_rule_complete = Some(false);
        tx.kyc_due_date = NaiveDate::from_ymd_opt(2023, 12, 1);
        tx.booked_at = Some(at(2024, 1, 15, 23));
        tx.edd_required = true;
        let result = RiskEngine::default().evaluate(&tx);
        let ids: Vec<_> = result.rule_hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["HIGH_AMOUNT", "TRAVEL_RULE", "KYC_OVERDUE", "EDD_MISSING"]);
        assert_eq!(result.risk_score, 100);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn swift_checks_need_a_message_type() {
        let mut tx = fact(500.0);
        tx.swift = Some(SwiftFields::default());
        assert!(RiskEngine::default().evaluate(&tx).rule_hits.is_empty());

        tx.swift = Some(SwiftFields {
            message_type: Some("MT103".into()),
            ordering_customer: true,
            ..Default::default()
        });
        let result = RiskEngine::default().evaluate(&tx);
        let ids: Vec<_> = result.rule_hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["SWIFT_59", "SWIFT_70", "SWIFT_71A"]);
        assert_eq!(result.risk_score, 35);
    }

    #[test]
    fn off_hours_and_weekend_score_independently() {
        // 2024-01-13 is a Saturday.
        let mut tx = fact(50.0);
        tx.booked_at = Some(at(2024, 1, 13, 6));
        let result = RiskEngine::default().evaluate(&tx);
        assert_eq!(result.risk_score, 20);
        assert_eq!(result.rule_hits.len(), 2);

        tx.booked_at = Some(at(2024, 1, 13, 12));
        assert_eq!(RiskEngine::default().evaluate(&tx).risk_score, 10);
    }

    #[test]
    fn score_clamps_at_ceiling() {
        let mut tx = fact(500_000.0);
        tx.sanctions_status = Some(SanctionsStatus::Hit);
        tx.pep = true;
        tx.aml_score = Some(99.0);
        tx.edd_required = true;
        let result = RiskEngine::default().evaluate(&tx);
        assert_eq!(result.risk_score, 100);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn rank_orders_by_score_then_id() {
        let mut hit = fact(1.0);
        hit.transaction_id = "tx-b".into();
        hit.sanctions_status = Some(SanctionsStatus::Hit);
        let mut quiet = fact(1.0);
        quiet.transaction_id = "tx-a".into();
        let mut large = fact(120_000.0);
        large.transaction_id = "tx-c".into();

        let ranked = RiskEngine::default().rank(&[quiet, hit, large]);
        let ids: Vec<_> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["tx-b", "tx-c", "tx-a"]);
    }
}

//! Risk evaluation integration tests: score bounds, severity derivation,
//! hit ordering, ranking, and the shipped policy file.

use chrono::NaiveDate;
use rulewatch_core::{
    config::{DeskConfig, RiskPolicy},
    fact::{SanctionsStatus, SwiftFields, TransactionFact},
    risk_engine::{evaluate, RiskEngine, Severity, DECLARED_ORDER},
};

fn base(id: &str, amount: f64) -> TransactionFact {
    TransactionFact {
        transaction_id: id.into(),
        amount,
        sanctions_status: Some(SanctionsStatus::Clear),
        ..Default::default()
    }
}

/// A spread of facts that trips every predicate at least once.
fn corpus() -> Vec<TransactionFact> {
    let booked = |d: u32, h: u32| {
        NaiveDate::from_ymd_opt(2024, 1, d).and_then(|date| date.and_hms_opt(h, 15, 0))
    };
    let mut out = Vec::new();
    for i in 0..64u32 {
        let mut tx = base(&format!("tx-{i:03}"), 2_500.0 * (i as f64 + 1.0));
        tx.sanctions_status = Some(match i % 9 {
            0 => SanctionsStatus::Hit,
            4 => SanctionsStatus::PotentialMatch,
            _ => SanctionsStatus::Clear,
        });
        tx.aml_score = Some((i * 7 % 100) as f64);
        tx.pep = i % 5 == 0;
        tx.travel_rule_complete = Some(i % 4 != 0);
        tx.virtual_asset_exposure = i % 6 == 0;
        tx.kyc_due_date = NaiveDate::from_ymd_opt(2024, 1, 1 + i % 28);
        tx.booked_at = booked(1 + i % 28, i % 24);
        tx.edd_required = i % 3 == 0;
        tx.source_of_wealth_documented = Some(i % 8 != 0);
        tx.fx_spread_bps = Some((i * 13 % 300) as f64);
        tx.daily_cash_total = Some(800.0 * i as f64);
        tx.daily_cash_count = Some(i % 9);
        tx.cash_id_verified = Some(i % 10 != 0);
        if i % 2 == 0 {
            tx.swift = Some(SwiftFields {
                message_type:      Some("MT103".into()),
                ordering_customer: i % 4 == 0,
                beneficiary:       i % 8 == 0,
                ..Default::default()
            });
        }
        out.push(tx);
    }
    out
}

#[test]
fn scores_are_bounded_and_hits_limited() {
    let policy = RiskPolicy::default();
    for tx in corpus() {
        let result = evaluate(&tx, &policy);
        assert!(result.risk_score <= 100, "{}: score {}", tx.transaction_id, result.risk_score);
        assert!(result.rule_hits.len() <= policy.max_rule_hits);
    }
}

#[test]
fn hits_follow_declared_order() {
    let policy = RiskPolicy::default();
    let position = |id: &str| DECLARED_ORDER.iter().position(|c| c.id() == id);
    for tx in corpus() {
        let result = evaluate(&tx, &policy);
        let positions: Vec<_> = result.rule_hits.iter().map(|h| position(&h.id)).collect();
        assert!(positions.iter().all(Option::is_some), "unknown hit id");
        assert!(
            positions.windows(2).all(|w| w[0] < w[1]),
            "{}: hits out of order {:?}",
            tx.transaction_id,
            result.rule_hits
        );
    }
}

#[test]
fn sanctions_status_drives_severity() {
    let policy = RiskPolicy::default();
    for tx in corpus() {
        let result = evaluate(&tx, &policy);
        match tx.sanctions() {
            SanctionsStatus::Hit => {
                assert_eq!(result.severity, Severity::Critical);
                assert!(result.risk_score >= 95);
            }
            SanctionsStatus::PotentialMatch => {
                assert_eq!(result.severity, Severity::High);
                assert!(result.risk_score >= 75);
            }
            SanctionsStatus::Clear => {
                assert_ne!(result.severity, Severity::Critical);
                let expected = if result.risk_score >= 80 {
                    Severity::High
                } else if result.risk_score >= 50 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                assert_eq!(result.severity, expected, "{}", tx.transaction_id);
            }
        }
    }
}

#[test]
fn large_clear_transfer_scores_seventy() {
    let result = RiskEngine::default().evaluate(&base("tx-big", 150_000.0));
    assert_eq!(result.risk_score, 70);
    assert_eq!(result.severity, Severity::Medium);
    assert_eq!(result.rule_hits.len(), 1);
    assert_eq!(result.rule_hits[0].id, "HIGH_AMOUNT");
    assert_eq!(result.rule_hits[0].score, 20);
}

#[test]
fn missing_sanctions_status_counts_as_clear() {
    let mut tx = base("tx-none", 150_000.0);
    tx.sanctions_status = None;
    let engine = RiskEngine::default();
    assert_eq!(engine.evaluate(&tx), engine.evaluate(&base("tx-none", 150_000.0)));
}

#[test]
fn ranking_is_by_score_then_severity_then_id() {
    let engine = RiskEngine::default();
    let ranked = engine.rank(&corpus());
    assert_eq!(ranked.len(), 64);
    for pair in ranked.windows(2) {
        let (id_a, a) = &pair[0];
        let (id_b, b) = &pair[1];
        assert!(a.risk_score >= b.risk_score);
        if a.risk_score == b.risk_score {
            assert!(a.severity >= b.severity);
            if a.severity == b.severity {
                assert!(id_a < id_b);
            }
        }
    }
}

#[test]
fn stricter_policy_raises_scores() {
    let mut strict = RiskPolicy::default();
    strict.thresholds.large_amount = 1_000.0;
    strict.weights.pep = 60;

    let mut tx = base("tx-pep", 5_000.0);
    tx.pep = true;

    let normal = evaluate(&tx, &RiskPolicy::default());
    let tightened = evaluate(&tx, &strict);
    assert_eq!(normal.risk_score, 30);
    assert_eq!(tightened.risk_score, 80);
    assert_eq!(tightened.severity, Severity::High);
}

#[test]
fn shipped_config_matches_defaults() {
    let config = DeskConfig::load("../data").unwrap();
    assert_eq!(config, DeskConfig::default_test());
}

#[test]
fn missing_config_dir_is_an_error() {
    let err = DeskConfig::load("../no-such-dir").unwrap_err();
    assert!(err.to_string().contains("Cannot read"));
}

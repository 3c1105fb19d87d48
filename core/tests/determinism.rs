//! Two desks, same inputs, same operations.
//! They must produce byte-identical suggestions and event logs.
//! Any divergence means hidden state leaked into proposal or persistence.

use rulewatch_core::{
    clock::{Clock, FixedClock},
    collaborator::RuleCompiler,
    config::DeskConfig,
    error::DeskResult,
    fact::{SanctionsStatus, TransactionFact},
    lifecycle::{Collaborators, LifecycleController},
    risk_engine::RiskEngine,
    store::DeskStore,
    suggestion::RegulatoryUpdate,
};
use std::sync::Arc;

struct StaticCompiler;

impl RuleCompiler for StaticCompiler {
    fn compile(&self, rule_id: &str, _text: &str) -> DeskResult<String> {
        Ok(format!("artifact-{rule_id}"))
    }
}

const RULES: &[(&str, &str)] = &[
    ("rule-1", "rule \"PEP wires\"\nwhen pep == true\nand swift_message_type != \"\"\nthen alert severity=high\n"),
    ("rule-2", "rule \"Large cash deposits\"\nwhen amount >= 10000\nand channel == \"cash\"\nthen alert severity=high\n"),
    ("rule-3", "rule \"Sanctioned corridors\"\nwhen counterparty_country in [\"IR\", \"KP\"]\nthen alert severity=critical\n"),
];

const UPDATES: &[(&str, &str, &str)] = &[
    ("reg-1", "Sanctions corridor expansion", "Add designation lists for corridors under OFAC review."),
    ("reg-3", "Cash deposit reporting", "Lower the cash threshold to $3,000."),
    ("reg-7", "Cash couriers", "Cash deposits lacking travel rule originator data."),
    ("reg-9", "Virtual asset providers", "VASP counterparties require review."),
];

fn facts() -> Vec<TransactionFact> {
    (0..40)
        .map(|i| TransactionFact {
            transaction_id: format!("tx-{i:03}"),
            amount: 500.0 * (i as f64 + 1.0),
            channel: Some(if i % 3 == 0 { "cash" } else { "wire" }.into()),
            counterparty_country: Some(if i % 7 == 0 { "IR" } else { "DE" }.into()),
            pep: i % 11 == 0,
            sanctions_status: Some(if i % 13 == 0 {
                SanctionsStatus::PotentialMatch
            } else {
                SanctionsStatus::Clear
            }),
            travel_rule_complete: Some(i % 5 != 0),
            ..Default::default()
        })
        .collect()
}

fn build_desk() -> (Arc<DeskStore>, LifecycleController) {
    let store = Arc::new(DeskStore::in_memory().expect("in-memory store"));
    store.migrate().expect("migration");
    let at = FixedClock::default_test().now();
    for (rule_id, text) in RULES {
        store.insert_rule_version(rule_id, text, &at).expect("seed rule");
    }
    for (id, title, summary) in UPDATES {
        store
            .insert_update(&RegulatoryUpdate {
                id:        id.to_string(),
                authority: "FinCEN".into(),
                title:     title.to_string(),
                summary:   summary.to_string(),
                tags:      vec![],
            })
            .expect("seed update");
    }
    for fact in facts() {
        store.insert_fact(&fact).expect("seed fact");
    }

    let config = DeskConfig::default_test();
    let collab = Collaborators::from_store(
        store.clone(),
        Arc::new(StaticCompiler),
        Arc::new(FixedClock::default_test()),
        &config.lifecycle,
    );
    (store, LifecycleController::new(collab, config.lifecycle))
}

/// Propose every update, approve and promote the first two, reject the third.
fn run_script(desk: &LifecycleController) -> Vec<String> {
    let ids: Vec<String> = UPDATES
        .iter()
        .map(|(id, ..)| desk.create_from_update(id).expect("propose").id)
        .collect();

    for id in &ids[..2] {
        desk.approve(id).expect("approve");
        desk.promote(id).expect("promote");
    }
    desk.reject(&ids[2]).expect("reject");
    desk.add_comment(&ids[3], "ana", "needs a second look").expect("comment");
    ids
}

#[test]
fn same_inputs_produce_identical_suggestions_and_event_logs() {
    let (store_a, desk_a) = build_desk();
    let (store_b, desk_b) = build_desk();

    let ids_a = run_script(&desk_a);
    let ids_b = run_script(&desk_b);
    assert_eq!(ids_a, ids_b);

    let json_a = serde_json::to_string(&desk_a.list(None).unwrap()).unwrap();
    let json_b = serde_json::to_string(&desk_b.list(None).unwrap()).unwrap();
    assert_eq!(json_a, json_b, "Suggestions diverged");

    for id in &ids_a {
        let log_a: Vec<_> = store_a
            .events_for_suggestion(id)
            .expect("read events")
            .into_iter()
            .map(|e| (e.event_type, e.payload, e.recorded_at))
            .collect();
        let log_b: Vec<_> = store_b
            .events_for_suggestion(id)
            .expect("read events")
            .into_iter()
            .map(|e| (e.event_type, e.payload, e.recorded_at))
            .collect();
        assert!(!log_a.is_empty());
        assert_eq!(log_a, log_b, "Event log diverged for {id}");
    }
}

#[test]
fn risk_evaluation_is_stable_across_engines() {
    let engine_a = RiskEngine::new(DeskConfig::default_test().risk);
    let engine_b = RiskEngine::new(DeskConfig::default_test().risk);
    let batch = facts();

    let ranked_a = serde_json::to_string(&engine_a.rank(&batch)).unwrap();
    let ranked_b = serde_json::to_string(&engine_b.rank(&batch)).unwrap();
    assert_eq!(ranked_a, ranked_b);

    for fact in &batch {
        assert_eq!(engine_a.evaluate(fact), engine_a.evaluate(fact));
    }
}

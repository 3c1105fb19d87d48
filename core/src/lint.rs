//! Static lint of suggested rule texts. Side-effect free.
//!
//! Findings are warnings, never errors: a reviewer may still approve a
//! suggestion that lints dirty.

use crate::{
    config::LifecycleConfig,
    fact::KNOWN_FIELDS,
    rule_text::{format_number, Literal, Op, RuleDoc},
    suggestion::ValidationReport,
};

pub fn validate(text: &str, config: &LifecycleConfig) -> ValidationReport {
    let doc = RuleDoc::parse(text);
    let mut warnings = doc.problems.clone();

    if doc.name.is_none() {
        warnings.push("missing rule name".into());
    }
    if doc.action.is_none() {
        warnings.push("missing 'then' action line".into());
    }

    if doc.conditions.is_empty() {
        warnings.push("rule has no conditions and would alert on every transaction".into());
    } else if doc.conditions.iter().all(|c| c.op == Op::Ne) {
        warnings.push("rule only has '!=' conditions and is overly broad".into());
    }

    for cond in &doc.conditions {
        if !KNOWN_FIELDS.contains(&cond.field.as_str()) {
            warnings.push(format!("unknown field '{}'", cond.field));
        }
        match (&cond.value, cond.op) {
            (Literal::List(items), Op::In) if items.is_empty() => {
                warnings.push(format!("empty list for '{}' never matches", cond.field));
            }
            (Literal::Number(n), Op::Gte | Op::Gt)
                if cond.field == "amount" && *n < config.broad_amount_floor =>
            {
                warnings.push(format!(
                    "amount threshold {} is below {} and is overly broad",
                    format_number(*n),
                    format_number(config.broad_amount_floor),
                ));
            }
            _ => {}
        }
    }

    ValidationReport {
        ok: warnings.is_empty(),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint(text: &str) -> ValidationReport {
        validate(text, &LifecycleConfig::default())
    }

    #[test]
    fn clean_rule_passes() {
        let report = lint("rule \"Cash\"\nwhen amount >= 3000\nand channel == \"cash\"\nthen alert\n");
        assert!(report.ok, "{:?}", report.warnings);
    }

    #[test]
    fn flags_broad_amount_threshold() {
        let report = lint("rule \"Cash\"\nwhen amount > 50\nthen alert\n");
        assert!(!report.ok);
        assert_eq!(report.warnings, ["amount threshold 50 is below 1000 and is overly broad"]);
    }

    #[test]
    fn flags_rule_without_conditions() {
        let report = lint("rule \"Everything\"\nthen alert\n");
        assert!(report.warnings[0].contains("no conditions"));
    }

    #[test]
    fn flags_unknown_fields_and_empty_lists() {
        let report = lint("rule \"x\"\nwhen shoe_size > 3\nand counterparty_country in []\nthen alert\n");
        assert!(report.warnings.contains(&"unknown field 'shoe_size'".to_string()));
        assert!(report.warnings.iter().any(|w| w.starts_with("empty list")));
    }

    #[test]
    fn flags_negative_only_rules_and_missing_lines() {
        let report = lint("when sanctions_status != \"CLEAR\"\n");
        assert_eq!(report.warnings.len(), 3);
    }
}

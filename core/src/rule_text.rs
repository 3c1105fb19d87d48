//! Rule texts: the small line-oriented documents suggestions rewrite.
//!
//! ```text
//! rule "Large cash deposits"
//! when amount >= 10000
//! and channel == "cash"
//! then alert severity=high
//! ```
//!
//! Every value in a rule is addressable by a parameter path:
//! `rule.name`, `when.<field>.<opcode>` and `then.<key>` (`then.action`
//! for the verb). Edits are applied line by line so untouched lines keep
//! their existing spelling and diffs stay minimal.

use crate::{
    error::{DeskError, DeskResult},
    fact::{FieldValue, TransactionFact},
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Ne,
    In,
}

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Gte => ">=",
            Op::Gt  => ">",
            Op::Lte => "<=",
            Op::Lt  => "<",
            Op::Eq  => "==",
            Op::Ne  => "!=",
            Op::In  => "in",
        }
    }

    /// Path segment for this operator.
    pub fn code(self) -> &'static str {
        match self {
            Op::Gte => "gte",
            Op::Gt  => "gt",
            Op::Lte => "lte",
            Op::Lt  => "lt",
            Op::Eq  => "eq",
            Op::Ne  => "ne",
            Op::In  => "in",
        }
    }

    fn from_symbol(s: &str) -> Option<Op> {
        match s {
            ">=" => Some(Op::Gte),
            ">"  => Some(Op::Gt),
            "<=" => Some(Op::Lte),
            "<"  => Some(Op::Lt),
            "==" => Some(Op::Eq),
            "!=" => Some(Op::Ne),
            "in" => Some(Op::In),
            _    => None,
        }
    }

    fn from_code(s: &str) -> Option<Op> {
        [Op::Gte, Op::Gt, Op::Lte, Op::Lt, Op::Eq, Op::Ne, Op::In]
            .into_iter()
            .find(|op| op.code() == s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl Literal {
    pub fn parse(raw: &str) -> Option<Literal> {
        let raw = raw.trim();
        if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let items = inner
                .split(',')
                .map(|item| unquote(item.trim()).to_string())
                .filter(|item| !item.is_empty())
                .collect();
            return Some(Literal::List(items));
        }
        if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            return Some(Literal::Text(raw[1..raw.len() - 1].to_string()));
        }
        match raw {
            "true"  => return Some(Literal::Flag(true)),
            "false" => return Some(Literal::Flag(false)),
            _ => {}
        }
        raw.replace('_', "").parse::<f64>().ok().filter(|n| n.is_finite()).map(Literal::Number)
    }

    pub fn render(&self) -> String {
        match self {
            Literal::Number(n) => format_number(*n),
            Literal::Flag(b)   => b.to_string(),
            Literal::Text(s)   => format!("\"{s}\""),
            Literal::List(items) => {
                let quoted: Vec<String> = items.iter().map(|i| format!("\"{i}\"")).collect();
                format!("[{}]", quoted.join(", "))
            }
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            _ => None,
        }
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|r| r.strip_suffix('"')).unwrap_or(s)
}

/// Integral values render without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op:    Op,
    pub value: Literal,
    /// Zero-based line index in the source text.
    pub line:  usize,
}

impl Condition {
    pub fn parse(raw: &str, line: usize) -> Option<Condition> {
        let raw = raw.trim();
        let (field, rest) = raw.split_once(char::is_whitespace)?;
        let rest = rest.trim_start();
        let (op_token, value) = rest.split_once(char::is_whitespace)?;
        let op = Op::from_symbol(op_token)?;
        let value = Literal::parse(value)?;
        if op == Op::In && !matches!(value, Literal::List(_)) {
            return None;
        }
        Some(Condition {
            field: field.to_string(),
            op,
            value,
            line,
        })
    }

    pub fn path(&self) -> String {
        format!("when.{}.{}", self.field, self.op.code())
    }

    pub fn render(&self) -> String {
        format!("{} {} {}", self.field, self.op.symbol(), self.value.render())
    }

    /// A condition on an attribute the fact does not carry never matches.
    pub fn matches(&self, tx: &TransactionFact) -> bool {
        let Some(actual) = tx.field(&self.field) else {
            return false;
        };
        match (&actual, self.op, &self.value) {
            (FieldValue::Number(a), op, Literal::Number(b)) => match op {
                Op::Gte => a >= b,
                Op::Gt  => a > b,
                Op::Lte => a <= b,
                Op::Lt  => a < b,
                Op::Eq  => a == b,
                Op::Ne  => a != b,
                Op::In  => false,
            },
            (FieldValue::Flag(a), Op::Eq, Literal::Flag(b)) => a == b,
            (FieldValue::Flag(a), Op::Ne, Literal::Flag(b)) => a != b,
            (FieldValue::Text(a), Op::Eq, Literal::Text(b)) => a.eq_ignore_ascii_case(b),
            (FieldValue::Text(a), Op::Ne, Literal::Text(b)) => !a.eq_ignore_ascii_case(b),
            (FieldValue::Text(a), Op::In, Literal::List(items)) => {
                items.iter().any(|i| i.eq_ignore_ascii_case(a))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub verb:   String,
    pub params: Vec<(String, String)>,
    pub line:   usize,
}

impl Action {
    fn render(&self) -> String {
        let mut out = format!("then {}", self.verb);
        for (k, v) in &self.params {
            out.push_str(&format!(" {k}={v}"));
        }
        out
    }
}

/// A parsed rule text. Unrecognised lines are kept as problems, not errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleDoc {
    pub name:       Option<String>,
    pub conditions: Vec<Condition>,
    pub action:     Option<Action>,
    pub problems:   Vec<String>,
    lines:          Vec<String>,
}

impl RuleDoc {
    pub fn parse(text: &str) -> RuleDoc {
        let mut doc = RuleDoc {
            lines: text.lines().map(str::to_string).collect(),
            ..Default::default()
        };

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            match keyword {
                "rule" => doc.name = Some(unquote(rest.trim()).to_string()),
                "when" | "and" => match Condition::parse(rest, idx) {
                    Some(cond) => doc.conditions.push(cond),
                    None => doc.problems.push(format!("line {}: cannot parse condition '{rest}'", idx + 1)),
                },
                "then" => {
                    let mut tokens = rest.split_whitespace();
                    let verb = tokens.next().unwrap_or_default().to_string();
                    let params = tokens
                        .filter_map(|t| t.split_once('='))
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    doc.action = Some(Action { verb, params, line: idx });
                }
                _ => doc.problems.push(format!("line {}: unrecognised '{line}'", idx + 1)),
            }
        }
        doc
    }

    /// Every parameter keyed by path. The first occurrence of a path wins.
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(name) = &self.name {
            out.insert("rule.name".to_string(), name.clone());
        }
        for cond in &self.conditions {
            out.entry(cond.path()).or_insert_with(|| cond.value.render());
        }
        if let Some(action) = &self.action {
            out.insert("then.action".to_string(), action.verb.clone());
            for (k, v) in &action.params {
                out.entry(format!("then.{k}")).or_insert_with(|| v.clone());
            }
        }
        out
    }

    pub fn condition(&self, field: &str, op: Op) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.field == field && c.op == op)
    }

    /// Whether every condition holds for `tx`.
    pub fn matches(&self, tx: &TransactionFact) -> bool {
        self.conditions.iter().all(|c| c.matches(tx))
    }

    /// Append a condition line before the `then` line (or at the end).
    pub fn with_condition(&self, condition: &str) -> DeskResult<String> {
        let parsed = Condition::parse(condition, 0).ok_or_else(|| {
            DeskError::RuleText(format!("cannot parse condition '{condition}'"))
        })?;
        let keyword = if self.conditions.is_empty() { "when" } else { "and" };
        let new_line = format!("{keyword} {}", parsed.render());
        let mut lines = self.lines.clone();
        let at = self.action.as_ref().map(|a| a.line).unwrap_or(lines.len());
        lines.insert(at, new_line);
        Ok(join_lines(&lines))
    }

    /// Rewrite the parameter at `path` to `value`, returning the new text.
    /// A `when.*` or `then.*` path that does not exist yet is added.
    pub fn set_param(&self, path: &str, value: &str) -> DeskResult<String> {
        let mut lines = self.lines.clone();
        let segments: Vec<&str> = path.split('.').collect();

        match segments.as_slice() {
            ["rule", "name"] => {
                let line = format!("rule \"{}\"", unquote(value));
                match self.lines.iter().position(|l| l.trim_start().starts_with("rule ")) {
                    Some(idx) => lines[idx] = line,
                    None => lines.insert(0, line),
                }
            }
            ["when", field, code] => {
                let op = Op::from_code(code)
                    .ok_or_else(|| DeskError::RuleText(format!("unknown operator in '{path}'")))?;
                let literal = Literal::parse(value)
                    .ok_or_else(|| DeskError::RuleText(format!("cannot parse value '{value}'")))?;
                match self.condition(field, op) {
                    Some(existing) => {
                        let keyword = lines[existing.line]
                            .trim_start()
                            .split_whitespace()
                            .next()
                            .unwrap_or("and")
                            .to_string();
                        let updated = Condition { value: literal, ..existing.clone() };
                        lines[existing.line] = format!("{keyword} {}", updated.render());
                    }
                    None => {
                        let cond = format!("{field} {} {}", op.symbol(), literal.render());
                        return self.with_condition(&cond);
                    }
                }
            }
            ["then", key] => {
                let mut action = self.action.clone().unwrap_or(Action {
                    verb:   "alert".into(),
                    params: Vec::new(),
                    line:   lines.len(),
                });
                if *key == "action" {
                    action.verb = value.to_string();
                } else {
                    match action.params.iter_mut().find(|(k, _)| k == key) {
                        Some((_, v)) => *v = value.to_string(),
                        None => action.params.push((key.to_string(), value.to_string())),
                    }
                }
                if action.line < lines.len() {
                    lines[action.line] = action.render();
                } else {
                    lines.push(action.render());
                }
            }
            _ => return Err(DeskError::RuleText(format!("unknown parameter path '{path}'"))),
        }
        Ok(join_lines(&lines))
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASH_RULE: &str = "rule \"Large cash deposits\"\n\
                             when amount >= 10000\n\
                             and channel == \"cash\"\n\
                             then alert severity=high\n";

    #[test]
    fn parses_name_conditions_and_action() {
        let doc = RuleDoc::parse(CASH_RULE);
        assert_eq!(doc.name.as_deref(), Some("Large cash deposits"));
        assert_eq!(doc.conditions.len(), 2);
        assert_eq!(doc.conditions[0].op, Op::Gte);
        assert_eq!(doc.conditions[0].value, Literal::Number(10000.0));
        assert!(doc.problems.is_empty());

        let params = doc.params();
        assert_eq!(params["when.amount.gte"], "10000");
        assert_eq!(params["when.channel.eq"], "\"cash\"");
        assert_eq!(params["then.severity"], "high");
    }

    #[test]
    fn unparseable_lines_become_problems() {
        let doc = RuleDoc::parse("rule \"x\"\nwhen amount about 5\nfrobnicate\n");
        assert_eq!(doc.problems.len(), 2);
        assert!(doc.conditions.is_empty());
    }

    #[test]
    fn set_param_rewrites_only_the_target_line() {
        let doc = RuleDoc::parse(CASH_RULE);
        let updated = doc.set_param("when.amount.gte", "3000").unwrap();
        assert_eq!(
            updated,
            "rule \"Large cash deposits\"\nwhen amount >= 3000\nand channel == \"cash\"\nthen alert severity=high\n"
        );
    }

    #[test]
    fn with_condition_inserts_before_then() {
        let doc = RuleDoc::parse(CASH_RULE);
        let updated = doc.with_condition("pep == true").unwrap();
        let lines: Vec<&str> = updated.lines().collect();
        assert_eq!(lines[3], "and pep == true");
        assert_eq!(lines[4], "then alert severity=high");
    }

    #[test]
    fn matches_requires_every_condition() {
        let doc = RuleDoc::parse(CASH_RULE);
        let mut tx = TransactionFact {
            amount: 12_000.0,
            channel: Some("CASH".into()),
            ..Default::default()
        };
        assert!(doc.matches(&tx));
        tx.channel = Some("wire".into());
        assert!(!doc.matches(&tx));
        tx.channel = None;
        assert!(!doc.matches(&tx));
    }

    #[test]
    fn in_lists_match_case_insensitively() {
        let doc = RuleDoc::parse("when counterparty_country in [\"IR\", \"KP\"]\n");
        let tx = TransactionFact {
            counterparty_country: Some("kp".into()),
            ..Default::default()
        };
        assert!(doc.matches(&tx));
    }
}

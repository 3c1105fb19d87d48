//! Diff generator: two rule texts → unified + structured diff.
//!
//! Output is a pure function of the inputs: the diff is computed once when a
//! suggestion is created and stored verbatim, never recomputed.
//!
//! Unified form follows the usual line-prefix conventions so additions and
//! deletions can be counted by scanning prefixes:
//!   `--- baseline` / `+++ suggested` headers, `@@ -a,b +c,d @@` hunks,
//!   then ` `, `-`, `+` content lines.

use crate::{
    error::DeskResult,
    rule_text::RuleDoc,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const CONTEXT_LINES: usize = 3;
pub const BASELINE_HEADER: &str = "--- baseline";
pub const SUGGESTED_HEADER: &str = "+++ suggested";

/// One parameter-level change, or a single descriptive entry for
/// structural edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredChange {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDiff {
    pub unified:    String,
    pub structured: Vec<StructuredChange>,
}

impl RuleDiff {
    /// (additions, deletions) counted by line prefix, headers excluded.
    pub fn line_counts(&self) -> (usize, usize) {
        count_changes(&self.unified)
    }
}

/// Diff `before` against `after`. An empty `before` is a new rule.
pub fn diff(before: &str, after: &str) -> RuleDiff {
    RuleDiff {
        unified:    unified(before, after),
        structured: structured(before, after),
    }
}

/// Count `+`/`-` content lines inside hunks. The `---`/`+++` headers
/// come before the first `@@` and are skipped.
pub fn count_changes(unified: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    let mut in_hunk = false;
    for line in unified.lines() {
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        // File headers only precede the first hunk; inside one, a removed
        // "-- note" line renders as "--- note" and still counts.
        if !in_hunk {
            continue;
        }
        if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') {
            removed += 1;
        }
    }
    (added, removed)
}

/// Replay structured entries onto `before`. Entries without `to` are skipped.
pub fn apply_changes(before: &str, changes: &[StructuredChange]) -> DeskResult<String> {
    let mut text = before.to_string();
    for change in changes {
        if let Some(to) = &change.to {
            text = RuleDoc::parse(&text).set_param(&change.path, to)?;
        }
    }
    Ok(text)
}

// ── Unified ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit<'a> {
    Keep(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

impl Edit<'_> {
    fn is_change(&self) -> bool {
        !matches!(self, Edit::Keep(_))
    }
}

/// Longest-common-subsequence edit script. Deletions are emitted before
/// insertions when both are possible so the output is stable.
fn edit_script<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<Edit<'a>> {
    let (n, m) = (a.len(), b.len());
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut edits = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            edits.push(Edit::Keep(a[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            edits.push(Edit::Delete(a[i]));
            i += 1;
        } else {
            edits.push(Edit::Insert(b[j]));
            j += 1;
        }
    }
    edits.extend(a[i..].iter().map(|l| Edit::Delete(*l)));
    edits.extend(b[j..].iter().map(|l| Edit::Insert(*l)));
    edits
}

fn unified(before: &str, after: &str) -> String {
    let a: Vec<&str> = before.lines().collect();
    let b: Vec<&str> = after.lines().collect();
    let edits = edit_script(&a, &b);

    let mut out = format!("{BASELINE_HEADER}\n{SUGGESTED_HEADER}\n");

    // Old/new line index at the start of every edit.
    let mut positions = Vec::with_capacity(edits.len() + 1);
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for edit in &edits {
        positions.push((old_pos, new_pos));
        match edit {
            Edit::Keep(_)   => { old_pos += 1; new_pos += 1; }
            Edit::Delete(_) => old_pos += 1,
            Edit::Insert(_) => new_pos += 1,
        }
    }
    positions.push((old_pos, new_pos));

    for (start, end) in hunk_ranges(&edits) {
        let slice = &edits[start..end];
        let old_len = slice.iter().filter(|e| !matches!(e, Edit::Insert(_))).count();
        let new_len = slice.iter().filter(|e| !matches!(e, Edit::Delete(_))).count();
        let (old_idx, new_idx) = positions[start];
        let old_start = if old_len == 0 { old_idx } else { old_idx + 1 };
        let new_start = if new_len == 0 { new_idx } else { new_idx + 1 };

        out.push_str(&format!("@@ -{old_start},{old_len} +{new_start},{new_len} @@\n"));
        for edit in slice {
            let (prefix, line) = match edit {
                Edit::Keep(l)   => (' ', l),
                Edit::Delete(l) => ('-', l),
                Edit::Insert(l) => ('+', l),
            };
            out.push(prefix);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Half-open edit ranges, each covering a run of changes plus context.
/// Runs separated by at most twice the context are merged.
fn hunk_ranges(edits: &[Edit<'_>]) -> Vec<(usize, usize)> {
    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_change())
        .map(|(i, _)| i)
        .collect();

    let mut groups: Vec<(usize, usize)> = Vec::new();
    for idx in changes {
        match groups.last_mut() {
            Some((_, last)) if idx <= *last + 2 * CONTEXT_LINES + 1 => *last = idx,
            _ => groups.push((idx, idx)),
        }
    }

    groups
        .into_iter()
        .map(|(first, last)| {
            (
                first.saturating_sub(CONTEXT_LINES),
                (last + CONTEXT_LINES + 1).min(edits.len()),
            )
        })
        .collect()
}

// ── Structured ───────────────────────────────────────────────────────────────

fn structured(before: &str, after: &str) -> Vec<StructuredChange> {
    let doc_after = RuleDoc::parse(after);

    if before.trim().is_empty() {
        if after.trim().is_empty() {
            return Vec::new();
        }
        let name = doc_after.name.clone().unwrap_or_else(|| "unnamed".into());
        return vec![StructuredChange {
            path: "rule".into(),
            from: None,
            to:   None,
            note: Some(format!(
                "new rule '{name}' with {} condition(s)",
                doc_after.conditions.len()
            )),
        }];
    }

    let doc_before = RuleDoc::parse(before);
    let params_before = doc_before.params();
    let params_after = doc_after.params();

    let keys_before: BTreeSet<&String> = params_before.keys().collect();
    let keys_after: BTreeSet<&String> = params_after.keys().collect();

    if keys_before == keys_after {
        // Substitution: one entry per changed value, in path order.
        return params_before
            .iter()
            .filter_map(|(path, from)| {
                let to = &params_after[path];
                (from != to).then(|| StructuredChange {
                    path: path.clone(),
                    from: Some(from.clone()),
                    to:   Some(to.clone()),
                    note: None,
                })
            })
            .collect();
    }

    // Structural: a single descriptive entry.
    let mut notes = Vec::new();
    for path in keys_after.difference(&keys_before) {
        notes.push(format!("added {}", describe(&doc_after, path, &params_after[*path])));
    }
    for path in keys_before.difference(&keys_after) {
        notes.push(format!("removed {}", describe(&doc_before, path, &params_before[*path])));
    }
    for path in keys_before.intersection(&keys_after) {
        let (from, to) = (&params_before[*path], &params_after[*path]);
        if from != to {
            notes.push(format!("changed {path} from {from} to {to}"));
        }
    }

    let touched: Vec<&String> = keys_after.symmetric_difference(&keys_before).copied().collect();
    let section = if touched.iter().all(|p| p.starts_with("when.")) {
        "when"
    } else if touched.iter().all(|p| p.starts_with("then.")) {
        "then"
    } else {
        "rule"
    };

    vec![StructuredChange {
        path: section.into(),
        from: None,
        to:   None,
        note: Some(notes.join("; ")),
    }]
}

fn describe(doc: &RuleDoc, path: &str, value: &str) -> String {
    doc.conditions
        .iter()
        .find(|c| c.path() == path)
        .map(|c| format!("filter `{}`", c.render()))
        .unwrap_or_else(|| format!("{path}={value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE: &str = "rule \"Large cash deposits\"\n\
                          when amount >= 10000\n\
                          and channel == \"cash\"\n\
                          then alert severity=high\n";

    #[test]
    fn substitution_yields_one_entry_per_changed_parameter() {
        let after = BEFORE.replace("10000", "3000").replace("severity=high", "severity=critical");
        let d = diff(BEFORE, &after);
        assert_eq!(d.structured.len(), 2);
        assert_eq!(d.structured[0].path, "then.severity");
        assert_eq!(d.structured[1].path, "when.amount.gte");
        assert_eq!(d.structured[1].from.as_deref(), Some("10000"));
        assert_eq!(d.structured[1].to.as_deref(), Some("3000"));
        assert_eq!(d.line_counts(), (2, 2));
    }

    #[test]
    fn filter_addition_yields_a_single_note() {
        let after = RuleDoc::parse(BEFORE).with_condition("pep == true").unwrap();
        let d = diff(BEFORE, &after);
        assert_eq!(d.structured.len(), 1);
        assert_eq!(d.structured[0].path, "when");
        assert_eq!(d.structured[0].note.as_deref(), Some("added filter `pep == true`"));
        assert_eq!(d.line_counts(), (1, 0));
    }

    #[test]
    fn removed_line_that_looks_like_a_header_is_counted() {
        let d = diff("rule \"x\"\n-- legacy note\n", "rule \"x\"\n");
        assert!(d.unified.contains("\n--- legacy note\n"));
        assert_eq!(d.line_counts(), (0, 1));

        let d = diff("rule \"x\"\n", "rule \"x\"\n++ extra\n");
        assert_eq!(d.line_counts(), (1, 0));
    }

    #[test]
    fn unified_format_has_headers_and_hunk() {
        let after = BEFORE.replace("10000", "3000");
        let d = diff(BEFORE, &after);
        let expected = "--- baseline\n\
                        +++ suggested\n\
                        @@ -1,4 +1,4 @@\n \
                        rule \"Large cash deposits\"\n\
                        -when amount >= 10000\n\
                        +when amount >= 3000\n \
                        and channel == \"cash\"\n \
                        then alert severity=high\n";
        assert_eq!(d.unified, expected);
    }

    #[test]
    fn empty_baseline_is_a_new_rule() {
        let d = diff("", BEFORE);
        assert!(d.unified.contains("@@ -0,0 +1,4 @@"));
        assert_eq!(d.line_counts(), (4, 0));
        assert_eq!(d.structured.len(), 1);
        assert_eq!(d.structured[0].path, "rule");
    }

    #[test]
    fn identical_inputs_have_no_changes() {
        let d = diff(BEFORE, BEFORE);
        assert_eq!(d.unified, "--- baseline\n+++ suggested\n");
        assert!(d.structured.is_empty());
    }

    #[test]
    fn distant_changes_split_into_two_hunks() {
        let before: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        let after = before.replace("line 2\n", "line two\n").replace("line 19\n", "line nineteen\n");
        let d = diff(&before, &after);
        assert_eq!(d.unified.matches("@@ -").count(), 2);
    }

    #[test]
    fn applying_substitutions_reproduces_recorded_parameters() {
        let after = BEFORE.replace("10000", "2500");
        let d = diff(BEFORE, &after);
        let rebuilt = apply_changes(BEFORE, &d.structured).unwrap();
        let params = RuleDoc::parse(&rebuilt).params();
        for change in &d.structured {
            assert_eq!(params.get(&change.path), change.to.as_ref());
        }
        assert_eq!(rebuilt, after);
    }
}

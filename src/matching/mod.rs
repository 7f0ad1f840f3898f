//! Exact-match record linkage between two registry tables.
//!
//! Two combination rules live here. [`cascade`] runs ordered passes where a
//! key consumed by an earlier pass is excluded from every later one;
//! [`union`] evaluates two kinds of evidence independently and treats a key
//! matched by either as matched.

pub mod cascade;
pub mod union;

use crate::error::ReconcileError;
use crate::models::{Record, Table};
use std::collections::HashMap;

/// One conjunctive exact-match condition set: every `(a_field, b_field)`
/// pair must hold at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPass {
    pub label: String,
    pub conditions: Vec<(String, String)>,
}

impl MatchPass {
    pub fn new(label: impl Into<String>, conditions: &[(&str, &str)]) -> Self {
        Self {
            label: label.into(),
            conditions: conditions
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }

    pub fn a_fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|(a, _)| a.as_str())
    }

    pub fn b_fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|(_, b)| b.as_str())
    }

    /// Fail when either table lacks a column the pass compares.
    pub fn check_columns(&self, a: &Table, b: &Table) -> Result<(), ReconcileError> {
        let missing = self
            .a_fields()
            .find(|c| !a.has_column(c))
            .map(|c| (a.name(), c))
            .or_else(|| self.b_fields().find(|c| !b.has_column(c)).map(|c| (b.name(), c)));
        match missing {
            Some((table, column)) => Err(ReconcileError::MissingColumn {
                pass: self.label.clone(),
                table: table.to_string(),
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Values of `fields` in `record`, or `None` when any of them is missing.
/// A missing value never equals anything, not even another missing value.
fn join_key<'r, 'f>(
    record: &'r Record,
    fields: impl Iterator<Item = &'f str>,
) -> Option<Vec<&'r str>> {
    fields.map(|f| record.get(f)).collect()
}

/// Inner hash equi-join of `a` and `b` on the pass conditions.
///
/// Output follows `a` order, then `b` order within one `a` row. Several
/// candidates on either side yield one pair per combination.
pub fn equi_join<'r>(
    a: &[&'r Record],
    b: &[&'r Record],
    pass: &MatchPass,
) -> Vec<(&'r Record, &'r Record)> {
    let mut index: HashMap<Vec<&'r str>, Vec<&'r Record>> = HashMap::new();
    let mut unkeyed_b = 0usize;
    for &rb in b {
        match join_key(rb, pass.b_fields()) {
            Some(k) => index.entry(k).or_default().push(rb),
            None => unkeyed_b += 1,
        }
    }

    let mut out = Vec::new();
    let mut unkeyed_a = 0usize;
    for &ra in a {
        let Some(k) = join_key(ra, pass.a_fields()) else {
            unkeyed_a += 1;
            continue;
        };
        if let Some(cands) = index.get(&k) {
            out.extend(cands.iter().map(|&rb| (ra, rb)));
        }
    }
    log::debug!(
        "{}: {} A rows and {} B rows lack a compared field",
        pass.label,
        unkeyed_a,
        unkeyed_b
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        Record::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn join_requires_every_condition() {
        let a = [rec(&[("addr", "10 RUE X"), ("cp", "75001")])];
        let b = [
            rec(&[("adresse", "10 RUE X"), ("code", "75001")]),
            rec(&[("adresse", "10 RUE X"), ("code", "75002")]),
        ];
        let pass = MatchPass::new("addr+cp", &[("addr", "adresse"), ("cp", "code")]);
        let a_refs: Vec<&Record> = a.iter().collect();
        let b_refs: Vec<&Record> = b.iter().collect();
        let out = equi_join(&a_refs, &b_refs, &pass);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.get("code"), Some("75001"));
    }

    #[test]
    fn missing_values_never_join() {
        let a = [rec(&[("addr", "10 RUE X"), ("cp", "")])];
        let b = [rec(&[("adresse", "10 RUE X")])];
        let pass = MatchPass::new("addr+cp", &[("addr", "adresse"), ("cp", "code")]);
        let a_refs: Vec<&Record> = a.iter().collect();
        let b_refs: Vec<&Record> = b.iter().collect();
        assert!(equi_join(&a_refs, &b_refs, &pass).is_empty());
    }

    #[test]
    fn one_to_many_yields_every_combination() {
        let a = [rec(&[("cp", "75001")])];
        let b = [rec(&[("code", "75001")]), rec(&[("code", "75001")])];
        let pass = MatchPass::new("cp", &[("cp", "code")]);
        let a_refs: Vec<&Record> = a.iter().collect();
        let b_refs: Vec<&Record> = b.iter().collect();
        assert_eq!(equi_join(&a_refs, &b_refs, &pass).len(), 2);
    }

    #[test]
    fn unknown_column_is_reported_with_its_table() {
        let a = Table::new("order", vec!["addr"]);
        let b = Table::new("finess", vec!["adresse"]);
        let pass = MatchPass::new("p", &[("addr", "adresse"), ("cp", "code_postal")]);
        match pass.check_columns(&a, &b) {
            Err(ReconcileError::MissingColumn { table, column, .. }) => {
                assert_eq!(table, "order");
                assert_eq!(column, "cp");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

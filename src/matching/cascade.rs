//! Exclusive cascade matching.
//!
//! Passes run in order of decreasing strictness. Before each pass both tables
//! are reduced to the rows whose key no earlier pass consumed, so every link
//! reflects the strictest pass that could produce it.

use super::{MatchPass, equi_join};
use crate::error::ReconcileError;
use crate::models::{LinkedPair, Linkage, PassOutcome, Record, Table};
use std::collections::HashSet;
use std::time::Instant;

/// Key columns and ordered passes for one cascade run.
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub a_key: String,
    pub b_key: String,
    pub passes: Vec<MatchPass>,
}

/// Order-directory establishments (A) against FINESS pharmacies (B).
pub fn pharmacy_cascade() -> CascadeConfig {
    CascadeConfig {
        a_key: "numero_establishment".to_string(),
        b_key: "numero_finess".to_string(),
        passes: vec![
            MatchPass::new(
                "address+name+phone+postal",
                &[
                    ("address", "adresse"),
                    ("raison_sociale", "raison_sociale"),
                    ("phone", "telephone"),
                    ("code_postal", "code_postal"),
                ],
            ),
            MatchPass::new(
                "address+name+postal",
                &[
                    ("address", "adresse"),
                    ("raison_sociale", "raison_sociale"),
                    ("code_postal", "code_postal"),
                ],
            ),
            MatchPass::new(
                "address+commercial_name+postal",
                &[
                    ("address", "adresse"),
                    ("denomination_commerciale", "raison_sociale"),
                    ("code_postal", "code_postal"),
                ],
            ),
            MatchPass::new(
                "postal+address",
                &[("code_postal", "code_postal"), ("address", "adresse")],
            ),
            MatchPass::new(
                "postal+name",
                &[
                    ("code_postal", "code_postal"),
                    ("raison_sociale", "raison_sociale"),
                ],
            ),
            MatchPass::new(
                "postal+commercial_name",
                &[
                    ("code_postal", "code_postal"),
                    ("denomination_commerciale", "raison_sociale"),
                ],
            ),
        ],
    }
}

fn remainder<'t>(table: &'t Table, key: &str, consumed: &HashSet<String>) -> Vec<&'t Record> {
    table
        .rows()
        .iter()
        .filter(|r| r.get(key).is_some_and(|k| !consumed.contains(k)))
        .collect()
}

/// Link rows of `a` to rows of `b`, pass by pass.
///
/// Fails when either table is empty or when a pass names a column one of
/// the tables does not declare. Rows without a primary key can never be
/// linked and are left out of every remainder.
pub fn run_cascade(a: &Table, b: &Table, cfg: &CascadeConfig) -> Result<Linkage, ReconcileError> {
    for t in [a, b] {
        if t.is_empty() {
            return Err(ReconcileError::MissingSourceTable {
                table: t.name().to_string(),
            });
        }
    }
    let key_pass = MatchPass::new("primary key", &[(cfg.a_key.as_str(), cfg.b_key.as_str())]);
    key_pass.check_columns(a, b)?;
    for pass in &cfg.passes {
        pass.check_columns(a, b)?;
    }

    let start = Instant::now();
    let mut consumed_a: HashSet<String> = HashSet::new();
    let mut consumed_b: HashSet<String> = HashSet::new();
    let mut pairs: Vec<LinkedPair> = Vec::new();
    let mut passes = Vec::with_capacity(cfg.passes.len());

    log::info!(
        "Cascade start: {} rows in {}, {} rows in {}, {} passes",
        a.len(),
        a.name(),
        b.len(),
        b.name(),
        cfg.passes.len()
    );

    for (idx, pass) in cfg.passes.iter().enumerate() {
        let rem_a = remainder(a, &cfg.a_key, &consumed_a);
        let rem_b = remainder(b, &cfg.b_key, &consumed_b);
        let joined = equi_join(&rem_a, &rem_b, pass);

        for (ra, rb) in &joined {
            // both keys are present: remainders only hold keyed rows
            let a_key = ra.get_or_empty(&cfg.a_key).to_string();
            let b_key = rb.get_or_empty(&cfg.b_key).to_string();
            consumed_a.insert(a_key.clone());
            consumed_b.insert(b_key.clone());
            pairs.push(LinkedPair {
                a_key,
                b_key,
                pass_index: idx,
                pass_label: pass.label.clone(),
            });
        }

        log::info!(
            "Pass {} ({}): {} matches; {} of {} remain in {}, {} of {} in {}",
            idx + 1,
            pass.label,
            joined.len(),
            rem_a.len(),
            a.len(),
            a.name(),
            rem_b.len(),
            b.len(),
            b.name()
        );
        passes.push(PassOutcome {
            label: pass.label.clone(),
            matched_pairs: joined.len(),
            remainder_a: rem_a.len(),
            remainder_b: rem_b.len(),
        });
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    pairs.retain(|p| seen.insert((p.a_key.clone(), p.b_key.clone())));
    let linkage = Linkage { pairs, passes };

    let (ambiguous_a, ambiguous_b) = linkage.ambiguous_keys();
    if !ambiguous_a.is_empty() || !ambiguous_b.is_empty() {
        log::warn!(
            "Ambiguous links kept: {} {} key(s) and {} {} key(s) occur in several pairs",
            ambiguous_a.len(),
            a.name(),
            ambiguous_b.len(),
            b.name()
        );
    }
    log::info!(
        "Cascade complete: {} links in {:.2}s",
        linkage.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(linkage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(rows: Vec<Record>) -> Table {
        Table::from_records(
            "order",
            vec![
                "numero_establishment",
                "address",
                "raison_sociale",
                "denomination_commerciale",
                "phone",
                "code_postal",
            ],
            rows,
        )
    }

    fn finess(rows: Vec<Record>) -> Table {
        Table::from_records(
            "finess",
            vec![
                "numero_finess",
                "adresse",
                "raison_sociale",
                "telephone",
                "code_postal",
            ],
            rows,
        )
    }

    fn p1() -> Record {
        Record::from_pairs([
            ("numero_establishment", "P1"),
            ("address", "10 RUE X"),
            ("raison_sociale", "ALPHA"),
            ("phone", "+33100000000"),
            ("code_postal", "75001"),
        ])
    }

    fn f(key: &str, address: &str, name: &str, phone: &str, postal: &str) -> Record {
        Record::from_pairs([
            ("numero_finess", key),
            ("adresse", address),
            ("raison_sociale", name),
            ("telephone", phone),
            ("code_postal", postal),
        ])
    }

    #[test]
    fn full_agreement_links_on_first_pass() {
        let a = order(vec![p1()]);
        let b = finess(vec![f("F1", "10 RUE X", "ALPHA", "+33100000000", "75001")]);
        let l = run_cascade(&a, &b, &pharmacy_cascade()).unwrap();
        assert_eq!(l.len(), 1);
        assert_eq!(l.pairs[0].a_key, "P1");
        assert_eq!(l.pairs[0].b_key, "F1");
        assert_eq!(l.pairs[0].pass_index, 0);
        assert_eq!(l.passes.len(), 6);
        assert!(l.passes[1..].iter().all(|p| p.matched_pairs == 0));
    }

    #[test]
    fn address_mismatch_breaks_every_address_pass() {
        let a = order(vec![p1()]);
        let b = finess(vec![f("F1", "12 RUE X", "ALPHA", "+33100000000", "75001")]);
        let l = run_cascade(&a, &b, &pharmacy_cascade()).unwrap();
        // only postal+name can hold
        assert_eq!(l.len(), 1);
        assert_eq!(l.pairs[0].pass_label, "postal+name");
        for outcome in &l.passes[..4] {
            assert_eq!(outcome.matched_pairs, 0, "{}", outcome.label);
        }
    }

    #[test]
    fn earlier_pass_takes_precedence() {
        // P1 would also satisfy postal+address with F2, but F1 wins on pass 1
        let a = order(vec![p1()]);
        let b = finess(vec![
            f("F1", "10 RUE X", "ALPHA", "+33100000000", "75001"),
            f("F2", "10 RUE X", "OTHER", "", "75001"),
        ]);
        let l = run_cascade(&a, &b, &pharmacy_cascade()).unwrap();
        assert_eq!(l.len(), 1);
        assert_eq!(l.pairs[0].b_key, "F1");
        assert_eq!(l.passes[3].remainder_a, 0);
    }

    #[test]
    fn no_key_is_linked_twice_across_passes() {
        let a = order(vec![
            p1(),
            Record::from_pairs([
                ("numero_establishment", "P2"),
                ("address", "3 AVENUE Y"),
                ("raison_sociale", "BETA"),
                ("code_postal", "75001"),
            ]),
            Record::from_pairs([
                ("numero_establishment", "P3"),
                ("address", "10 RUE X"),
                ("raison_sociale", "GAMMA"),
                ("code_postal", "75001"),
            ]),
        ]);
        let b = finess(vec![
            f("F1", "10 RUE X", "ALPHA", "+33100000000", "75001"),
            f("F2", "3 AVENUE Y", "BETA", "", "75001"),
        ]);
        let l = run_cascade(&a, &b, &pharmacy_cascade()).unwrap();
        let (amb_a, amb_b) = l.ambiguous_keys();
        assert!(amb_a.is_empty() && amb_b.is_empty());
        assert_eq!(l.len(), 2);
        // P3 shares F1's address but F1 was consumed by pass 1
        assert!(!l.matched_a().contains("P3"));
    }

    #[test]
    fn one_to_many_within_a_pass_is_kept_and_flagged() {
        let a = order(vec![p1()]);
        let b = finess(vec![
            f("F1", "10 RUE X", "ALPHA", "+33100000000", "75001"),
            f("F2", "10 RUE X", "ALPHA", "+33100000000", "75001"),
        ]);
        let l = run_cascade(&a, &b, &pharmacy_cascade()).unwrap();
        assert_eq!(l.len(), 2);
        let (amb_a, _) = l.ambiguous_keys();
        assert_eq!(amb_a, vec!["P1".to_string()]);
    }

    #[test]
    fn duplicate_source_rows_collapse_to_one_link() {
        let a = order(vec![p1(), p1()]);
        let b = finess(vec![f("F1", "10 RUE X", "ALPHA", "+33100000000", "75001")]);
        let l = run_cascade(&a, &b, &pharmacy_cascade()).unwrap();
        assert_eq!(l.len(), 1);
        assert_eq!(l.passes[0].matched_pairs, 2);
    }

    #[test]
    fn empty_source_table_is_fatal() {
        let a = order(vec![p1()]);
        let b = finess(vec![]);
        match run_cascade(&a, &b, &pharmacy_cascade()) {
            Err(ReconcileError::MissingSourceTable { table }) => assert_eq!(table, "finess"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_pass_column_is_fatal() {
        let a = Table::from_records("order", vec!["numero_establishment"], vec![p1()]);
        let b = finess(vec![f("F1", "10 RUE X", "ALPHA", "", "75001")]);
        assert!(matches!(
            run_cascade(&a, &b, &pharmacy_cascade()),
            Err(ReconcileError::MissingColumn { .. })
        ));
    }
}

//! Union matching: identifier evidence OR address evidence.
//!
//! Both checks run over the full tables. Nothing consumed by one check is
//! withheld from the other, and a row counts as matched when either holds.

use crate::error::ReconcileError;
use crate::models::{Record, Table};
use crate::normalize::address_match_key;
use serde::Serialize;
use std::collections::HashSet;

/// Columns compared by a union match.
#[derive(Debug, Clone)]
pub struct UnionConfig {
    pub a_key: String,
    pub a_identifier: String,
    pub b_identifier: String,
    /// `(street, postal code)` columns on each side.
    pub a_address: (String, String),
    pub b_address: (String, String),
}

/// FINESS laboratories (A) against the CRM laboratory export (B).
pub fn lab_union() -> UnionConfig {
    UnionConfig {
        a_key: "numero_finess".to_string(),
        a_identifier: "numero_finess".to_string(),
        b_identifier: "numero_finess".to_string(),
        a_address: ("adresse".to_string(), "code_postal".to_string()),
        b_address: ("street".to_string(), "zipcode".to_string()),
    }
}

/// Which A keys each kind of evidence matched.
#[derive(Debug, Clone, Default)]
pub struct UnionMatch {
    pub by_identifier: HashSet<String>,
    pub by_address: HashSet<String>,
    /// Keyed A rows, matched or not.
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnionMetrics {
    pub total: usize,
    pub by_identifier: usize,
    pub by_address: usize,
    pub both: usize,
    pub only_identifier: usize,
    pub only_address: usize,
    pub matched: usize,
    pub unmatched: usize,
}

impl UnionMatch {
    pub fn is_matched(&self, key: &str) -> bool {
        self.by_identifier.contains(key) || self.by_address.contains(key)
    }

    pub fn all_matched(&self) -> HashSet<&str> {
        self.by_identifier
            .union(&self.by_address)
            .map(String::as_str)
            .collect()
    }

    pub fn metrics(&self) -> UnionMetrics {
        let both = self.by_identifier.intersection(&self.by_address).count();
        let matched = self.by_identifier.len() + self.by_address.len() - both;
        UnionMetrics {
            total: self.total,
            by_identifier: self.by_identifier.len(),
            by_address: self.by_address.len(),
            both,
            only_identifier: self.by_identifier.len() - both,
            only_address: self.by_address.len() - both,
            matched,
            unmatched: self.total.saturating_sub(matched),
        }
    }

    /// A rows matched by neither check.
    pub fn unmatched(&self, a: &Table, a_key: &str) -> Table {
        a.filter(|r| r.get(a_key).is_some_and(|k| !self.is_matched(k)))
    }
}

fn address_key(r: &Record, cols: &(String, String)) -> Option<String> {
    address_match_key(r.get(&cols.0), r.get(&cols.1))
}

pub fn union_match(a: &Table, b: &Table, cfg: &UnionConfig) -> Result<UnionMatch, ReconcileError> {
    for t in [a, b] {
        if t.is_empty() {
            return Err(ReconcileError::MissingSourceTable {
                table: t.name().to_string(),
            });
        }
    }
    let required = [
        (a, cfg.a_key.as_str()),
        (a, cfg.a_identifier.as_str()),
        (a, cfg.a_address.0.as_str()),
        (a, cfg.a_address.1.as_str()),
        (b, cfg.b_identifier.as_str()),
        (b, cfg.b_address.0.as_str()),
        (b, cfg.b_address.1.as_str()),
    ];
    if let Some((t, c)) = required.iter().find(|(t, c)| !t.has_column(c)) {
        return Err(ReconcileError::MissingColumn {
            pass: "union".to_string(),
            table: t.name().to_string(),
            column: c.to_string(),
        });
    }

    let b_identifiers = b.key_set(&cfg.b_identifier);
    let b_addresses: HashSet<String> = b
        .rows()
        .iter()
        .filter_map(|r| address_key(r, &cfg.b_address))
        .collect();

    let mut out = UnionMatch::default();
    for r in a.rows() {
        let Some(key) = r.get(&cfg.a_key) else {
            continue;
        };
        out.total += 1;
        if r
            .get(&cfg.a_identifier)
            .is_some_and(|id| b_identifiers.contains(id))
        {
            out.by_identifier.insert(key.to_string());
        }
        if address_key(r, &cfg.a_address).is_some_and(|k| b_addresses.contains(&k)) {
            out.by_address.insert(key.to_string());
        }
    }

    let m = out.metrics();
    log::info!(
        "Union match {} vs {}: {} by identifier, {} by address, {} both, {} only identifier, {} only address, {} of {} unmatched",
        a.name(),
        b.name(),
        m.by_identifier,
        m.by_address,
        m.both,
        m.only_identifier,
        m.only_address,
        m.unmatched,
        m.total
    );
    Ok(out)
}

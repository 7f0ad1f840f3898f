//! Classification of freshly computed registry state against CRM exports.

pub mod activities;
pub mod health_centers;
pub mod hierarchy;
pub mod labs;
pub mod pharmacies;
pub mod substitutes;

use crate::error::ReconcileError;
use crate::models::Table;
use std::collections::HashMap;

/// Fail with `SnapshotSchema` when a CRM export lacks an expected column.
pub fn require_snapshot_columns(snapshot: &Table, required: &[&str]) -> Result<(), ReconcileError> {
    let missing = snapshot.missing_columns(required);
    if missing.is_empty() {
        return Ok(());
    }
    Err(ReconcileError::SnapshotSchema {
        snapshot: snapshot.name().to_string(),
        missing,
    })
}

/// `key → value` over rows where both are present. The first row wins.
pub fn lookup(table: &Table, key: &str, value: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for r in table.rows() {
        if let (Some(k), Some(v)) = (r.get(key), r.get(value)) {
            out.entry(k.to_string()).or_insert_with(|| v.to_string());
        }
    }
    out
}

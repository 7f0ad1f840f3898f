//! Pharmacy current state and its classification against the CRM
//! pharmacy export.

use super::{lookup, require_snapshot_columns};
use crate::error::ReconcileError;
use crate::models::{Classified, DeltaStatus, Linkage, Record, Table};
use std::collections::{HashMap, HashSet};

/// Columns the pharmacy classification reads from the CRM export.
pub const SNAPSHOT_COLUMNS: [&str; 4] = ["id", "external_id", "numero_finess", "street"];

pub const CURRENT_STATE_COLUMNS: [&str; 12] = [
    "numero_establishment",
    "numero_finess",
    "type",
    "denomination_commerciale",
    "raison_sociale",
    "address",
    "code_postal",
    "commune",
    "department",
    "region",
    "phone",
    "fax",
];

/// Order pharmacies left-joined with their FINESS links. Unlinked pharmacies
/// keep one row with an empty `numero_finess`; an ambiguous link yields one
/// row per linked FINESS number.
pub fn current_state(pharmacies: &Table, linkage: &Linkage) -> Table {
    let mut links: HashMap<&str, Vec<&str>> = HashMap::new();
    for p in &linkage.pairs {
        links.entry(p.a_key.as_str()).or_default().push(p.b_key.as_str());
    }
    let mut out = Table::new("pharmacy_current_state", CURRENT_STATE_COLUMNS.to_vec());
    for r in pharmacies.rows() {
        let base = Record::from_pairs(
            CURRENT_STATE_COLUMNS
                .iter()
                .map(|c| (*c, r.get_or_empty(c))),
        );
        match r.get("numero_establishment").and_then(|k| links.get(k)) {
            Some(finess) => {
                for f in finess {
                    out.push(base.clone().with("numero_finess", *f));
                }
            }
            None => out.push(base),
        }
    }
    let out = out.distinct();
    log::info!(
        "Pharmacy current state: {} rows, {} linked to FINESS",
        out.len(),
        out.rows().iter().filter(|r| r.get("numero_finess").is_some()).count()
    );
    out
}

/// Split the current state into new / unchanged / needs-update pharmacies.
///
/// A row is new only when its order id, its FINESS number and its
/// lower-cased address are all unknown to the CRM export. A row whose order
/// id is known but whose FINESS number is not recorded for that account
/// needs an update. Rows lacking an order id, a FINESS number or an address
/// are excluded from every bucket.
pub fn classify_pharmacies(current: &Table, snapshot: &Table) -> Result<Classified, ReconcileError> {
    require_snapshot_columns(snapshot, &SNAPSHOT_COLUMNS)?;

    let known_ids = snapshot.key_set("external_id");
    let known_finess = snapshot.key_set("numero_finess");
    let known_streets: HashSet<String> = snapshot
        .rows()
        .iter()
        .filter_map(|r| r.get("street"))
        .map(str::to_lowercase)
        .collect();
    let mut finess_by_id: HashMap<&str, HashSet<&str>> = HashMap::new();
    for r in snapshot.rows() {
        if let Some(id) = r.get("external_id") {
            let entry = finess_by_id.entry(id).or_default();
            if let Some(f) = r.get("numero_finess") {
                entry.insert(f);
            }
        }
    }
    let crm_ids = lookup(snapshot, "external_id", "id");

    let mut columns: Vec<&str> = CURRENT_STATE_COLUMNS.to_vec();
    columns.push("crm_id");
    let mut out = Classified {
        new: Table::new("pharmacies_to_create", columns.clone()),
        unchanged: Table::new("pharmacies_unchanged", columns.clone()),
        needs_update: Table::new("pharmacy_finess_updates", columns),
        excluded: 0,
    };

    for r in current.rows() {
        let (Some(id), Some(finess), Some(address)) = (
            r.get("numero_establishment"),
            r.get("numero_finess"),
            r.get("address"),
        ) else {
            out.excluded += 1;
            continue;
        };
        let status = if !known_ids.contains(id)
            && !known_finess.contains(finess)
            && !known_streets.contains(&address.to_lowercase())
        {
            DeltaStatus::New
        } else if finess_by_id.get(id).is_some_and(|fs| !fs.contains(finess)) {
            DeltaStatus::NeedsUpdate
        } else {
            DeltaStatus::Unchanged
        };
        let row = r.clone().with("crm_id", crm_ids.get(id).cloned().unwrap_or_default());
        match status {
            DeltaStatus::New => out.new.push(row),
            DeltaStatus::Unchanged => out.unchanged.push(row),
            DeltaStatus::NeedsUpdate => out.needs_update.push(row),
        }
    }
    out.new = out.new.distinct();
    out.unchanged = out.unchanged.distinct();
    out.needs_update = out.needs_update.distinct();

    log::info!(
        "Pharmacies: {} new, {} unchanged, {} need a FINESS update, {} excluded without order id, FINESS number or address",
        out.new.len(),
        out.unchanged.len(),
        out.needs_update.len(),
        out.excluded
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinkedPair;

    fn snapshot(rows: Vec<Record>) -> Table {
        Table::from_records(
            "crm_pharmacies",
            vec!["id", "external_id", "numero_finess", "street"],
            rows,
        )
    }

    fn fresh(id: &str, finess: &str, address: &str) -> Record {
        Record::from_pairs([
            ("numero_establishment", id),
            ("numero_finess", finess),
            ("address", address),
        ])
    }

    fn current(rows: Vec<Record>) -> Table {
        Table::from_records("current", CURRENT_STATE_COLUMNS.to_vec(), rows)
    }

    #[test]
    fn known_order_id_is_never_new() {
        let snap = snapshot(vec![Record::from_pairs([
            ("id", "SF1"),
            ("external_id", "X1"),
            ("numero_finess", ""),
            ("street", "10 RUE X"),
        ])]);
        let c = classify_pharmacies(&current(vec![fresh("X1", "F9", "10 RUE X")]), &snap).unwrap();
        assert!(c.new.is_empty());
        assert_eq!(c.needs_update.len(), 1);
        assert_eq!(c.needs_update.rows()[0].get("crm_id"), Some("SF1"));
    }

    #[test]
    fn known_finess_under_another_id_is_not_new() {
        let snap = snapshot(vec![Record::from_pairs([
            ("id", "SF1"),
            ("external_id", "X0"),
            ("numero_finess", "F1"),
            ("street", "1 PLACE Z"),
        ])]);
        let c = classify_pharmacies(&current(vec![fresh("X1", "F1", "10 RUE X")]), &snap).unwrap();
        assert!(c.new.is_empty());
        assert_eq!(c.unchanged.len(), 1);
    }

    #[test]
    fn address_comparison_ignores_case() {
        let snap = snapshot(vec![Record::from_pairs([
            ("id", "SF1"),
            ("external_id", "X0"),
            ("street", "10 rue x"),
        ])]);
        let c = classify_pharmacies(&current(vec![fresh("X1", "F1", "10 RUE X")]), &snap).unwrap();
        assert!(c.new.is_empty());
    }

    #[test]
    fn novel_on_every_dimension_is_new() {
        let snap = snapshot(vec![Record::from_pairs([
            ("id", "SF1"),
            ("external_id", "X0"),
            ("numero_finess", "F0"),
            ("street", "1 PLACE Z"),
        ])]);
        let c = classify_pharmacies(&current(vec![fresh("X1", "F1", "10 RUE X")]), &snap).unwrap();
        assert_eq!(c.bucket(DeltaStatus::New).len(), 1);
        assert_eq!(c.new.rows()[0].get("crm_id"), None);
    }

    #[test]
    fn rows_without_linking_identifier_are_excluded() {
        let snap = snapshot(vec![]);
        let c = classify_pharmacies(
            &current(vec![fresh("X1", "", "10 RUE X"), fresh("", "F2", "3 RUE Y")]),
            &snap,
        )
        .unwrap();
        assert_eq!(c.excluded, 2);
        assert!(c.new.is_empty() && c.unchanged.is_empty() && c.needs_update.is_empty());
    }

    #[test]
    fn schema_drift_aborts_classification() {
        let snap = Table::new("crm_pharmacies", vec!["id", "external_id"]);
        assert!(matches!(
            classify_pharmacies(&current(vec![]), &snap),
            Err(ReconcileError::SnapshotSchema { .. })
        ));
    }

    #[test]
    fn current_state_left_joins_links() {
        let pharmacies = Table::from_records(
            "pharmacies",
            vec!["numero_establishment", "address"],
            vec![
                Record::from_pairs([("numero_establishment", "P1"), ("address", "10 RUE X")]),
                Record::from_pairs([("numero_establishment", "P2"), ("address", "3 RUE Y")]),
            ],
        );
        let linkage = Linkage {
            pairs: vec![LinkedPair {
                a_key: "P1".into(),
                b_key: "F1".into(),
                pass_index: 0,
                pass_label: "p".into(),
            }],
            passes: vec![],
        };
        let t = current_state(&pharmacies, &linkage);
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[0].get("numero_finess"), Some("F1"));
        assert_eq!(t.rows()[1].get("numero_finess"), None);
        assert_eq!(t.columns().len(), CURRENT_STATE_COLUMNS.len());
    }
}

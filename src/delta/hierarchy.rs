//! Lab → SELAS parent links: FINESS legal-entity number against the parent
//! recorded in the CRM.

use super::{lookup, require_snapshot_columns};
use crate::error::ReconcileError;
use crate::models::{Record, Table};

pub const LAB_SNAPSHOT_COLUMNS: [&str; 3] = ["id", "numero_finess", "selas_id"];
pub const SELAS_SNAPSHOT_COLUMNS: [&str; 2] = ["id", "numero_finess"];

pub const PENDING_COLUMNS: [&str; 4] = [
    "id",
    "numero_finess",
    "selas_finess_crm",
    "numero_finess_juridique",
];

/// Parent changes, split by whether the new parent already exists in the CRM.
#[derive(Debug, Clone)]
pub struct HierarchyDelta {
    /// `id` (CRM lab id), `parent_id` (CRM id of the new SELAS).
    pub updates: Table,
    /// Changes whose new SELAS must be created first; never applied here.
    pub pending: Table,
    /// Labs compared: present with a parent on both sides.
    pub compared: usize,
}

impl HierarchyDelta {
    pub fn changes(&self) -> usize {
        self.updates.len() + self.pending.len()
    }
}

pub fn hierarchy_updates(
    labs: &Table,
    lab_snapshot: &Table,
    selas_snapshot: &Table,
) -> Result<HierarchyDelta, ReconcileError> {
    require_snapshot_columns(lab_snapshot, &LAB_SNAPSHOT_COLUMNS)?;
    require_snapshot_columns(selas_snapshot, &SELAS_SNAPSHOT_COLUMNS)?;

    let fresh_parent = lookup(labs, "numero_finess", "numero_finess_juridique");
    let selas_finess_by_id = lookup(selas_snapshot, "id", "numero_finess");
    let selas_id_by_finess = lookup(selas_snapshot, "numero_finess", "id");

    let mut updates = Table::new("hierarchy_updates", vec!["id", "parent_id"]);
    let mut pending = Table::new("hierarchy_pending", PENDING_COLUMNS.to_vec());
    let mut compared = 0usize;

    for r in lab_snapshot.rows() {
        let (Some(lab_id), Some(finess), Some(selas_id)) =
            (r.get("id"), r.get("numero_finess"), r.get("selas_id"))
        else {
            continue;
        };
        let Some(new_parent) = fresh_parent.get(finess) else {
            continue;
        };
        compared += 1;
        let current_parent = selas_finess_by_id
            .get(selas_id)
            .map(String::as_str)
            .unwrap_or("");
        if current_parent == new_parent {
            continue;
        }
        match selas_id_by_finess.get(new_parent) {
            Some(parent_id) => updates.push(Record::from_pairs([
                ("id", lab_id),
                ("parent_id", parent_id.as_str()),
            ])),
            None => pending.push(Record::from_pairs([
                ("id", lab_id),
                ("numero_finess", finess),
                ("selas_finess_crm", current_parent),
                ("numero_finess_juridique", new_parent.as_str()),
            ])),
        }
    }

    let delta = HierarchyDelta {
        updates: updates.distinct(),
        pending: pending.distinct(),
        compared,
    };
    log::info!(
        "Hierarchy: {} labs compared, {} parent changes ({} with existing SELAS, {} awaiting SELAS creation)",
        delta.compared,
        delta.changes(),
        delta.updates.len(),
        delta.pending.len()
    );
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labs() -> Table {
        Table::from_records(
            "finess_labs",
            vec!["numero_finess", "numero_finess_juridique"],
            vec![
                Record::from_pairs([("numero_finess", "L1"), ("numero_finess_juridique", "J2")]),
                Record::from_pairs([("numero_finess", "L2"), ("numero_finess_juridique", "J1")]),
                Record::from_pairs([("numero_finess", "L3"), ("numero_finess_juridique", "J7")]),
            ],
        )
    }

    fn lab_snapshot() -> Table {
        Table::from_records(
            "crm_labs",
            vec!["id", "numero_finess", "selas_id"],
            vec![
                Record::from_pairs([("id", "SFL1"), ("numero_finess", "L1"), ("selas_id", "SF1")]),
                Record::from_pairs([("id", "SFL2"), ("numero_finess", "L2"), ("selas_id", "SF1")]),
                Record::from_pairs([("id", "SFL3"), ("numero_finess", "L3"), ("selas_id", "SF1")]),
                Record::from_pairs([("id", "SFL4"), ("numero_finess", "L4"), ("selas_id", "")]),
            ],
        )
    }

    fn selas_snapshot() -> Table {
        Table::from_records(
            "crm_selas",
            vec!["id", "numero_finess"],
            vec![
                Record::from_pairs([("id", "SF1"), ("numero_finess", "J1")]),
                Record::from_pairs([("id", "SF9"), ("numero_finess", "J2")]),
            ],
        )
    }

    #[test]
    fn parent_change_to_existing_selas_emits_update() {
        let d = hierarchy_updates(&labs(), &lab_snapshot(), &selas_snapshot()).unwrap();
        assert_eq!(d.updates.len(), 1);
        let r = &d.updates.rows()[0];
        assert_eq!(r.get("id"), Some("SFL1"));
        assert_eq!(r.get("parent_id"), Some("SF9"));
    }

    #[test]
    fn parent_change_to_unknown_selas_is_pending() {
        let d = hierarchy_updates(&labs(), &lab_snapshot(), &selas_snapshot()).unwrap();
        assert_eq!(d.pending.len(), 1);
        let r = &d.pending.rows()[0];
        assert_eq!(r.get("id"), Some("SFL3"));
        assert_eq!(r.get("selas_finess_crm"), Some("J1"));
        assert_eq!(r.get("numero_finess_juridique"), Some("J7"));
        assert_eq!(d.compared, 3);
        assert_eq!(d.changes(), 2);
    }
}

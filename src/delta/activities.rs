//! Pharmacist activities (one practitioner role at one pharmacy) against the
//! CRM pharmacy export, which carries one row per recorded activity.

use super::{lookup, require_snapshot_columns};
use crate::error::ReconcileError;
use crate::models::{Record, Table};
use crate::normalize::clean_numeric_artifact;
use std::collections::{HashMap, HashSet};

pub const STATUS_ACTIVE: &str = "Active";
pub const STATUS_INACTIVE: &str = "Inactive";

pub const STATUS_SNAPSHOT_COLUMNS: [&str; 4] = ["external_id", "pa_rpps", "pac_id", "pac_status"];
pub const ACTIVITY_SNAPSHOT_COLUMNS: [&str; 3] = ["id", "external_id", "pa_rpps"];
pub const PHARMACIST_SNAPSHOT_COLUMNS: [&str; 2] = ["id", "rppsnumber__c"];

pub const MISSING_ACTIVITY_COLUMNS: [&str; 5] = [
    "numero_establishment",
    "rpps",
    "fonction",
    "personaccount_id",
    "businessaccount_id",
];

/// `(pharmacy, practitioner)` pairs recorded in the CRM export.
fn recorded_pairs(snapshot: &Table) -> HashSet<(String, String)> {
    snapshot
        .rows()
        .iter()
        .filter_map(|r| Some((r.get("external_id")?.to_string(), r.get("pa_rpps")?.to_string())))
        .collect()
}

/// Recorded activities whose status disagrees with the order directory.
///
/// An activity is `Active` when its practitioner is among those the order
/// directory lists at that pharmacy, `Inactive` otherwise. Only pharmacies
/// the directory still lists are considered. Output: `pac_id` and the new
/// status in `obsoleteprofessionalactivity__c`.
pub fn status_updates(activities: &Table, snapshot: &Table) -> Result<Table, ReconcileError> {
    require_snapshot_columns(snapshot, &STATUS_SNAPSHOT_COLUMNS)?;

    let mut active_at: HashMap<&str, HashSet<&str>> = HashMap::new();
    for a in activities.rows() {
        if let (Some(est), Some(rpps)) = (a.get("numero_establishment"), a.get("rpps")) {
            active_at.entry(est).or_default().insert(rpps);
        }
    }

    let mut out = Table::new(
        "activity_status_updates",
        vec!["pac_id", "obsoleteprofessionalactivity__c"],
    );
    let mut skipped = 0usize;
    for r in snapshot.rows() {
        let (Some(est), Some(rpps), Some(pac_id)) =
            (r.get("external_id"), r.get("pa_rpps"), r.get("pac_id"))
        else {
            skipped += 1;
            continue;
        };
        let Some(present) = active_at.get(est) else {
            continue;
        };
        let expected = if present.contains(rpps) {
            STATUS_ACTIVE
        } else {
            STATUS_INACTIVE
        };
        if r.get("pac_status") != Some(expected) {
            out.push(Record::from_pairs([
                ("pac_id", pac_id),
                ("obsoleteprofessionalactivity__c", expected),
            ]));
        }
    }
    let out = out.distinct();
    log::info!(
        "Activity status: {} updates, {} CRM rows without pharmacy, practitioner or activity id",
        out.len(),
        skipped
    );
    Ok(out)
}

/// Order activities the CRM does not record yet.
///
/// Covers activities at pharmacies already in the CRM whose
/// `(pharmacy, practitioner)` pair is unrecorded, plus every activity of a
/// pharmacy about to be created. Each row carries the CRM person id (from
/// the pharmacist export) and the CRM pharmacy id when known.
pub fn missing_activities(
    activities: &Table,
    pharmacies_to_create: &Table,
    snapshot: &Table,
    pharmacist_snapshot: &Table,
) -> Result<Table, ReconcileError> {
    require_snapshot_columns(snapshot, &ACTIVITY_SNAPSHOT_COLUMNS)?;
    require_snapshot_columns(pharmacist_snapshot, &PHARMACIST_SNAPSHOT_COLUMNS)?;

    let known_pharmacies = snapshot.key_set("external_id");
    let created = pharmacies_to_create.key_set("numero_establishment");
    let recorded = recorded_pairs(snapshot);
    let person_ids: HashMap<String, String> = pharmacist_snapshot
        .rows()
        .iter()
        .filter_map(|r| {
            let rpps = clean_numeric_artifact(r.get("rppsnumber__c"));
            let id = r.get("id")?;
            (!rpps.is_empty()).then(|| (rpps, id.to_string()))
        })
        .collect();
    let account_ids = lookup(snapshot, "external_id", "id");

    let mut out = Table::new("missing_activities", MISSING_ACTIVITY_COLUMNS.to_vec());
    for a in activities.rows() {
        let (Some(est), Some(rpps)) = (a.get("numero_establishment"), a.get("rpps")) else {
            continue;
        };
        if !known_pharmacies.contains(est) && !created.contains(est) {
            continue;
        }
        if recorded.contains(&(est.to_string(), rpps.to_string())) {
            continue;
        }
        out.push(Record::from_pairs([
            ("numero_establishment", est),
            ("rpps", rpps),
            ("fonction", a.get_or_empty("fonction")),
            (
                "personaccount_id",
                person_ids.get(rpps).map(String::as_str).unwrap_or(""),
            ),
            (
                "businessaccount_id",
                account_ids.get(est).map(String::as_str).unwrap_or(""),
            ),
        ]));
    }
    let out = out.distinct();
    log::info!(
        "Missing activities: {} ({} at pharmacies to create)",
        out.len(),
        out.rows()
            .iter()
            .filter(|r| created.contains(r.get_or_empty("numero_establishment")))
            .count()
    );
    Ok(out)
}

/// Practitioners of missing activities with no CRM person account, named
/// from the order directory and tagged with `specialty_id`.
pub fn pharmacists_to_create(
    missing_activities: &Table,
    pharmacists: &Table,
    specialty_id: &str,
) -> Table {
    let unknown: HashSet<&str> = missing_activities
        .rows()
        .iter()
        .filter(|r| r.get("personaccount_id").is_none())
        .filter_map(|r| r.get("rpps"))
        .collect();
    let out = pharmacists
        .filter(|r| r.get("rpps").is_some_and(|id| unknown.contains(id)))
        .map_rows(
            vec!["rpps", "first_name", "last_name", "specialty__c"],
            |r| {
                Record::from_pairs([
                    ("rpps", r.get_or_empty("rpps")),
                    ("first_name", r.get_or_empty("first_name")),
                    ("last_name", r.get_or_empty("last_name")),
                    ("specialty__c", specialty_id),
                ])
            },
        )
        .distinct()
        .renamed("pharmacists_to_create");
    log::info!("Pharmacists to create: {}", out.len());
    out
}

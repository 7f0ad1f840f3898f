//! Practitioner substitutes: link the substitutes sheet to unowned
//! practitioner agendas, then keep the links the recurring events confirm.

use super::require_snapshot_columns;
use crate::error::ReconcileError;
use crate::matching::{MatchPass, equi_join};
use crate::models::{Record, Table};
use crate::normalize::substitute_phone;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const SHEET_COLUMNS: [&str; 7] = [
    "first_name",
    "last_name",
    "phone_number",
    "id",
    "organization_id",
    "email",
    "status",
];

pub const AGENDA_COLUMNS: [&str; 14] = [
    "phone",
    "full_name",
    "organization_id",
    "email",
    "job",
    "agenda_owner",
    "sf_status",
    "account_id",
    "agenda_id",
    "sf_id",
    "owner_name",
    "agenda_specialty",
    "agenda_specialty_sub_group",
    "sf_account_specialty.1",
];

pub const EVENT_COLUMNS: [&str; 2] = ["agenda_id", "practitioner_substitute_id"];

/// Columns of one confirmed substitute, before the export renames them.
pub const SUBSTITUTE_COLUMNS: [&str; 17] = [
    "account_id",
    "name_metabase",
    "sf_id",
    "sf_account_specialty.1",
    "sf_status",
    "phone_metabase",
    "phone_sheet",
    "agenda_owner",
    "owner_name",
    "agenda_specialty",
    "agenda_specialty_sub_group",
    "email_sheet",
    "email_metabase",
    "status",
    "practitioner_substitute_id",
    "agenda_id",
    "organization_id_sheet",
];

const GROUP_KEY: [&str; 3] = ["account_id", "organization_id_sheet", "agenda_id"];

/// Row counts after each step of the substitute matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstituteDiagnostics {
    pub agendas_before_merge: usize,
    pub merged_name: usize,
    pub merged_email: usize,
    pub merged_phone: usize,
    pub before_groupby: usize,
    pub after_groupby: usize,
    pub after_merge: usize,
    pub with_practitioner_id: usize,
    pub final_rows: usize,
    pub recurring_events: usize,
}

#[derive(Debug, Clone)]
pub struct SubstituteOutcome {
    pub substitutes: Table,
    pub diagnostics: SubstituteDiagnostics,
}

/// Name, phone and email passes, each a single exact condition. The three
/// are unioned, not cascaded.
pub fn substitute_passes() -> [MatchPass; 3] {
    [
        MatchPass::new("name", &[("name_metabase", "name_sheet")]),
        MatchPass::new("phone", &[("phone_metabase", "phone_sheet")]),
        MatchPass::new("email", &[("email_metabase", "email_sheet")]),
    ]
}

fn lowercase(v: Option<&str>) -> String {
    v.map(str::to_lowercase).unwrap_or_default()
}

/// Sheet rows keyed the way the passes compare them. A name needs both
/// parts.
fn prepare_sheet(sheet: &Table) -> Table {
    let columns = [
        "substitute_id_sheet",
        "name_sheet",
        "email_sheet",
        "phone_sheet",
        "organization_id_sheet",
        "status",
    ];
    sheet.map_rows(columns.to_vec(), |r| {
        let name = match (r.get("first_name"), r.get("last_name")) {
            (Some(first), Some(last)) => format!("{first} {last}").to_lowercase(),
            _ => String::new(),
        };
        Record::from_pairs([
            ("substitute_id_sheet", r.get_or_empty("id").to_string()),
            ("name_sheet", name),
            ("email_sheet", r.get_or_empty("email").to_string()),
            ("phone_sheet", substitute_phone(r.get("phone_number")).unwrap_or_default()),
            ("organization_id_sheet", r.get_or_empty("organization_id").to_string()),
            ("status", r.get_or_empty("status").to_string()),
        ])
    })
}

/// Practitioner agendas without an owner whose account is not a customer.
fn prepare_agendas(agendas: &Table) -> Table {
    let passthrough = [
        "agenda_owner",
        "sf_status",
        "account_id",
        "agenda_id",
        "job",
        "sf_id",
        "owner_name",
        "agenda_specialty",
        "agenda_specialty_sub_group",
        "sf_account_specialty.1",
    ];
    let mut columns = vec![
        "name_metabase",
        "email_metabase",
        "phone_metabase",
        "organization_id_metabase",
    ];
    columns.extend(passthrough);
    agendas
        .filter(|r| {
            r.get("job") == Some("practitioner")
                && r.get("agenda_owner").is_none()
                && r.get("sf_status") != Some("Customer")
        })
        .map_rows(columns, |r| {
            let mut out = Record::from_pairs([
                ("name_metabase", lowercase(r.get("full_name"))),
                ("email_metabase", r.get_or_empty("email").to_string()),
                ("phone_metabase", substitute_phone(r.get("phone")).unwrap_or_default()),
                ("organization_id_metabase", r.get_or_empty("organization_id").to_string()),
            ]);
            for c in passthrough {
                out.set(c, r.get_or_empty(c));
            }
            out
        })
}

fn merge(a: &Record, b: &Record) -> Record {
    Record::from_pairs(a.fields().chain(b.fields()))
}

/// Collapse rows sharing (account, organisation, agenda), taking each
/// column's first non-empty value. Rows missing a key part are dropped;
/// groups come out in key order.
fn first_per_group(rows: &Table) -> Table {
    let mut groups: BTreeMap<Vec<&str>, Record> = BTreeMap::new();
    for r in rows.rows() {
        let Some(key) = GROUP_KEY.iter().map(|c| r.get(c)).collect::<Option<Vec<_>>>() else {
            continue;
        };
        let slot = groups.entry(key).or_default();
        for (k, v) in r.fields() {
            if slot.get(k).is_none() && !v.is_empty() {
                slot.set(k, v);
            }
        }
    }
    Table::from_records(rows.name(), rows.columns().to_vec(), groups.into_values().collect())
}

/// Match the substitutes sheet against practitioner agendas by name, phone
/// or email, then keep each agenda link the recurring events name the
/// substitute in.
pub fn match_substitutes(
    sheet: &Table,
    agendas: &Table,
    events: &Table,
) -> Result<SubstituteOutcome, ReconcileError> {
    require_snapshot_columns(sheet, &SHEET_COLUMNS)?;
    require_snapshot_columns(agendas, &AGENDA_COLUMNS)?;
    require_snapshot_columns(events, &EVENT_COLUMNS)?;

    let sheet = prepare_sheet(sheet);
    let agendas = prepare_agendas(agendas);
    let mut diag = SubstituteDiagnostics {
        agendas_before_merge: agendas.len(),
        recurring_events: events.len(),
        ..Default::default()
    };

    let a: Vec<&Record> = agendas.rows().iter().collect();
    let b: Vec<&Record> = sheet.rows().iter().collect();
    let mut columns = agendas.columns().to_vec();
    columns.extend(sheet.columns().iter().cloned());
    let mut merged = Table::new("substitute_candidates", columns);
    let mut counts = [0usize; 3];
    for (i, pass) in substitute_passes().iter().enumerate() {
        pass.check_columns(&agendas, &sheet)?;
        let pairs = equi_join(&a, &b, pass);
        counts[i] = pairs.len();
        for (ra, rb) in pairs {
            merged.push(merge(ra, rb));
        }
    }
    [diag.merged_name, diag.merged_phone, diag.merged_email] = counts;
    let merged = merged.distinct();
    diag.before_groupby = merged.len();

    let grouped = first_per_group(&merged);
    diag.after_groupby = grouped.len();

    let confirm = MatchPass::new(
        "recurring events",
        &[
            ("agenda_id", "agenda_id"),
            ("substitute_id_sheet", "practitioner_substitute_id"),
        ],
    );
    confirm.check_columns(&grouped, events)?;
    let g: Vec<&Record> = grouped.rows().iter().collect();
    let e: Vec<&Record> = events.rows().iter().collect();
    let confirmed = equi_join(&g, &e, &confirm);
    let linked_groups = confirmed.iter().map(|(rg, _)| *rg).collect::<HashSet<_>>().len();
    diag.with_practitioner_id = confirmed.len();
    diag.after_merge = confirmed.len() + (grouped.len() - linked_groups);

    let rows = confirmed
        .into_iter()
        .map(|(rg, re)| {
            let mut out = Record::from_pairs(
                SUBSTITUTE_COLUMNS
                    .iter()
                    .map(|c| (*c, rg.get_or_empty(c))),
            );
            out.set(
                "practitioner_substitute_id",
                re.get_or_empty("practitioner_substitute_id"),
            );
            out
        })
        .collect();
    let substitutes = Table::from_records("substitutes", SUBSTITUTE_COLUMNS.to_vec(), rows);
    diag.final_rows = substitutes.len();
    log::info!(
        "Substitutes: {} by name, {} by phone, {} by email; {} groups, {} confirmed by recurring events",
        diag.merged_name,
        diag.merged_phone,
        diag.merged_email,
        diag.after_groupby,
        diag.final_rows
    );
    Ok(SubstituteOutcome {
        substitutes,
        diagnostics: diag,
    })
}

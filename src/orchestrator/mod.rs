//! Reconciliation runs: load inputs, reconcile, then write every output.
//!
//! Each run computes all of its tables before the first file is written, so
//! a fatal error leaves the output directory untouched.

pub mod summary;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::{AppConfig, CrmConfig};
use crate::delta::activities::{missing_activities, pharmacists_to_create, status_updates};
use crate::delta::health_centers::{health_center_scope, new_health_centers};
use crate::delta::hierarchy::hierarchy_updates;
use crate::delta::labs::{labs_to_create, refresh_lab_directory, selas_to_create};
use crate::delta::pharmacies::{classify_pharmacies, current_state};
use crate::delta::substitutes::match_substitutes;
use crate::error::{ConfigError, ReconcileError};
use crate::export::{templates, write_tables};
use crate::export::csv_export::export_summary_csv;
use crate::export::xlsx_export::export_summary_xlsx;
use crate::matching::cascade::{pharmacy_cascade, run_cascade};
use crate::models::Table;
use crate::registry::finess::{lab_scope, load_establishments, load_legal_entities, pharmacy_scope};
use crate::registry::order::{OrderPaths, OrderRegistry, load_order_registry};
use crate::registry::{read_snapshot, read_table};
use summary::RunSummary;

/// Mandatory inputs must carry rows.
fn require_rows(table: &Table) -> Result<(), ReconcileError> {
    if table.is_empty() {
        return Err(ReconcileError::MissingSourceTable {
            table: table.name().to_string(),
        });
    }
    Ok(())
}

fn required_path<'a>(p: &'a Option<PathBuf>, field: &'static str) -> Result<&'a Path, ConfigError> {
    p.as_deref().ok_or(ConfigError::MissingField { field })
}

/// CRM exports feeding the pharmacy classification.
#[derive(Debug, Clone)]
pub struct PharmacySnapshots {
    /// One row per recorded activity: account, FINESS, street, activity.
    pub pharmacies: Table,
    /// Person accounts; without it activities and pharmacists are skipped.
    pub pharmacists: Option<Table>,
}

/// Link the order registry to FINESS and, given CRM exports, derive what to
/// create or update. Returns export-ready tables.
pub fn reconcile_pharmacies(
    order: &OrderRegistry,
    finess_pharmacies: &Table,
    snapshots: Option<&PharmacySnapshots>,
    crm: &CrmConfig,
    summary: &mut RunSummary,
) -> Result<Vec<Table>, ReconcileError> {
    summary.table_input(&order.pharmacies);
    summary.table_input(&order.pharmacists);
    summary.table_input(&order.activities);
    summary.table_input(finess_pharmacies);

    let linkage = run_cascade(&order.pharmacies, finess_pharmacies, &pharmacy_cascade())?;
    summary.linkage(&linkage);
    let (ambiguous_a, ambiguous_b) = linkage.ambiguous_keys();
    summary.counter("Ambiguous order ids", ambiguous_a.len());
    summary.counter("Ambiguous FINESS numbers", ambiguous_b.len());

    let current = current_state(&order.pharmacies, &linkage);
    let mut out = vec![
        templates::linkage().apply(&linkage.to_table("numero_establishment", "numero_finess")),
        templates::current_state().apply(&current),
    ];

    let Some(snap) = snapshots else {
        info!("No CRM pharmacy export given; linkage and current state only");
        return Ok(out);
    };
    summary.table_input(&snap.pharmacies);

    let classified = classify_pharmacies(&current, &snap.pharmacies)?;
    summary.counter("Pharmacies new", classified.new.len());
    summary.counter("Pharmacies unchanged", classified.unchanged.len());
    summary.counter("Pharmacies needing FINESS update", classified.needs_update.len());
    summary.counter("Pharmacies excluded", classified.excluded);
    let status = status_updates(&order.activities, &snap.pharmacies)?;

    out.push(templates::pharmacies(crm).apply(&classified.new));
    out.push(templates::pharmacy_finess_updates().apply(&classified.needs_update));
    out.push(templates::activity_status().apply(&status));

    match &snap.pharmacists {
        Some(pharmacists) => {
            summary.table_input(pharmacists);
            let missing = missing_activities(
                &order.activities,
                &classified.new,
                &snap.pharmacies,
                pharmacists,
            )?;
            let new_people =
                pharmacists_to_create(&missing, &order.pharmacists, &crm.pharmacist_specialty_id);
            out.push(templates::pharmacists().apply(&new_people));
            out.push(templates::activities().apply(&missing));
        }
        None => warn!("No CRM pharmacist export given; missing activities and pharmacists skipped"),
    }
    Ok(out)
}

/// FINESS labs and SELAS against the CRM: accounts to create, parent
/// changes, and optionally the refreshed lab directory.
pub fn reconcile_labs(
    establishments: &Table,
    legal_entities: &Table,
    lab_snapshot: &Table,
    selas_snapshot: &Table,
    directory: Option<&Table>,
    crm: &CrmConfig,
    summary: &mut RunSummary,
) -> Result<Vec<Table>, ReconcileError> {
    require_rows(establishments)?;
    require_rows(legal_entities)?;
    let labs = lab_scope(establishments);
    require_rows(&labs)?;
    for t in [&labs, legal_entities, lab_snapshot, selas_snapshot] {
        summary.table_input(t);
    }

    let selas = selas_to_create(&labs, legal_entities, selas_snapshot)?;
    let creation = labs_to_create(&labs, lab_snapshot, selas_snapshot)?;
    let hierarchy = hierarchy_updates(&labs, lab_snapshot, selas_snapshot)?;

    let m = creation.metrics;
    summary.counter("SELAS excluded without street", selas.excluded_no_street);
    summary.counter("Labs with address", m.labs_with_address);
    summary.counter("Labs matched by identifier", m.matching.by_identifier);
    summary.counter("Labs matched by address", m.matching.by_address);
    summary.counter("Labs matched by both", m.matching.both);
    summary.counter("Labs matched by identifier only", m.matching.only_identifier);
    summary.counter("Labs matched by address only", m.matching.only_address);
    summary.counter("Labs excluded without street", m.excluded_no_street);
    summary.counter("Hierarchy labs compared", hierarchy.compared);

    let mut out = vec![
        templates::selas(crm).apply(&selas.to_create),
        templates::labs(crm).apply(&creation.to_create),
        templates::hierarchy_update().apply(&hierarchy.updates),
        templates::hierarchy_pending().apply(&hierarchy.pending),
    ];

    if let Some(directory) = directory {
        summary.table_input(directory);
        let (refreshed, stats) = refresh_lab_directory(directory, &labs, legal_entities)?;
        summary.counter("Directory SELAS names filled", stats.selas_filled);
        summary.counter("Directory raison_sociale updates", stats.raison_sociale);
        summary.counter("Directory raison_sociale_longue updates", stats.raison_sociale_longue);
        summary.counter("Directory legal entity updates", stats.numero_finess_juridique);
        summary.counter("Directory SELAS resets", stats.selas_updates);
        summary.counter("Directory labs appended", stats.new_labs);
        out.push(templates::lab_directory().apply(&refreshed));
    }
    Ok(out)
}

/// Health-center scope, flagged against the CRM export when one is given.
pub fn reconcile_health_centers(
    establishments: &Table,
    snapshot: Option<&Table>,
    summary: &mut RunSummary,
) -> Result<Vec<Table>, ReconcileError> {
    require_rows(establishments)?;
    summary.table_input(establishments);
    let scope = health_center_scope(establishments);
    summary.counter("Health centers in scope", scope.len());
    let Some(snapshot) = snapshot else {
        return Ok(vec![scope]);
    };
    summary.table_input(snapshot);
    let (flagged, new_accounts) = new_health_centers(&scope, snapshot)?;
    Ok(vec![flagged, templates::health_centers().apply(&new_accounts)])
}

/// Every practitioner substitute link the recurring events confirm.
pub fn reconcile_substitutes(
    sheet: &Table,
    agendas: &Table,
    events: &Table,
    summary: &mut RunSummary,
) -> Result<Vec<Table>, ReconcileError> {
    require_rows(sheet)?;
    require_rows(agendas)?;
    for t in [sheet, agendas, events] {
        summary.table_input(t);
    }
    let outcome = match_substitutes(sheet, agendas, events)?;
    let d = outcome.diagnostics;
    summary.counter("Agendas before merge", d.agendas_before_merge);
    summary.counter("Merged by name", d.merged_name);
    summary.counter("Merged by email", d.merged_email);
    summary.counter("Merged by phone", d.merged_phone);
    summary.counter("Before grouping", d.before_groupby);
    summary.counter("After grouping", d.after_groupby);
    summary.counter("After merge with agendas", d.after_merge);
    summary.counter("With practitioner id", d.with_practitioner_id);
    summary.counter("Substitutes confirmed", d.final_rows);
    Ok(vec![templates::substitutes().apply(&outcome.substitutes)])
}

/// The FINESS laboratories alone, as a reference extract.
pub fn reconcile_finess_labs(
    establishments: &Table,
    summary: &mut RunSummary,
) -> Result<Vec<Table>, ReconcileError> {
    require_rows(establishments)?;
    summary.table_input(establishments);
    let labs = lab_scope(establishments);
    let addressed = labs
        .rows()
        .iter()
        .filter(|r| r.get("voie_label").is_some_and(|v| !v.trim().is_empty()))
        .count();
    summary.counter("FINESS labs", labs.len());
    summary.counter("Labs with complete address", addressed);
    Ok(vec![labs.renamed("finess_labs_database")])
}

/// Staged files of one run, written next to their final location.
fn staging_dir(out_dir: &Path, run: &str) -> PathBuf {
    out_dir.join(format!(".{run}.partial"))
}

fn write_outputs(
    cfg: &AppConfig,
    dir: &Path,
    run: &str,
    tables: &[Table],
    summary: &mut RunSummary,
) -> Result<Vec<PathBuf>> {
    summary.outputs(tables);
    let mut written = write_tables(dir, run, tables, cfg.export.format, cfg.export.delimiter)?;
    summary.finish();

    let txt = dir.join("summary.txt");
    summary
        .write_summary(&txt)
        .with_context(|| format!("writing {}", txt.display()))?;
    let csv = dir.join("summary.csv");
    export_summary_csv(&csv, summary)?;
    written.extend([txt, csv]);
    if cfg.export.format.writes_xlsx() {
        let xlsx = dir.join("summary.xlsx");
        export_summary_xlsx(&xlsx, summary)?;
        written.push(xlsx);
    }
    Ok(written)
}

/// Move staged files into `out_dir`. Renames stay on one filesystem.
fn publish(staged: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut published = Vec::with_capacity(staged.len());
    for from in staged {
        let Some(name) = from.file_name() else {
            continue;
        };
        let to = out_dir.join(name);
        std::fs::rename(from, &to)
            .with_context(|| format!("moving {} to {}", from.display(), to.display()))?;
        published.push(to);
    }
    Ok(published)
}

/// Write a run into a staging directory, then move it into place. A failed
/// write removes the staging directory and leaves `out_dir` as it was.
fn write_run(cfg: &AppConfig, run: &str, tables: &[Table], mut summary: RunSummary) -> Result<Vec<PathBuf>> {
    let out_dir = &cfg.export.out_dir;
    let created = !out_dir.exists();
    let staging = staging_dir(out_dir, run);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)
            .with_context(|| format!("clearing {}", staging.display()))?;
    }
    std::fs::create_dir_all(&staging).with_context(|| format!("creating {}", staging.display()))?;

    let staged = match write_outputs(cfg, &staging, run, tables, &mut summary) {
        Ok(staged) => staged,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                warn!("could not remove {}: {cleanup}", staging.display());
            }
            if created {
                let _ = std::fs::remove_dir(out_dir);
            }
            return Err(e);
        }
    };
    let written = publish(&staged, out_dir)?;
    std::fs::remove_dir(&staging).with_context(|| format!("removing {}", staging.display()))?;
    info!(
        "Run '{}' finished in {}: {} file(s) in {}",
        run,
        summary.duration_display(),
        written.len(),
        out_dir.display()
    );
    Ok(written)
}

pub fn run_pharmacies(cfg: &AppConfig) -> Result<Vec<PathBuf>> {
    let mut summary = RunSummary::start("pharmacies");
    cfg.require_order_registry()?;
    let i = &cfg.input;
    let paths = OrderPaths {
        establishments: required_path(&i.order_establishments, "input.order_establishments")?,
        pharmacists: required_path(&i.order_pharmacists, "input.order_pharmacists")?,
        activities: required_path(&i.order_activities, "input.order_activities")?,
    };
    let order = load_order_registry(&paths).context("loading the pharmacy order registry")?;
    let finess = load_establishments(required_path(
        &i.finess_establishments,
        "input.finess_establishments",
    )?)
    .context("loading FINESS establishments")?;
    let finess_pharmacies = pharmacy_scope(&finess);

    let d = cfg.snapshots.delimiter;
    let snapshots = match &cfg.snapshots.pharmacies {
        Some(p) => Some(PharmacySnapshots {
            pharmacies: read_snapshot(
                p,
                "crm_pharmacies",
                d,
                &["external_id", "numero_finess", "pa_rpps"],
            )?,
            pharmacists: cfg
                .snapshots
                .pharmacists
                .as_deref()
                .map(|p| read_snapshot(p, "crm_pharmacists", d, &["rppsnumber__c"]))
                .transpose()?,
        }),
        None => None,
    };

    let tables = reconcile_pharmacies(
        &order,
        &finess_pharmacies,
        snapshots.as_ref(),
        &cfg.crm,
        &mut summary,
    )?;
    write_run(cfg, "pharmacies", &tables, summary)
}

pub fn run_labs(cfg: &AppConfig) -> Result<Vec<PathBuf>> {
    let mut summary = RunSummary::start("labs");
    let i = &cfg.input;
    let s = &cfg.snapshots;
    let establishments = load_establishments(required_path(
        &i.finess_establishments,
        "input.finess_establishments",
    )?)
    .context("loading FINESS establishments")?;
    let legal_entities = load_legal_entities(required_path(
        &i.finess_legal_entities,
        "input.finess_legal_entities",
    )?)
    .context("loading FINESS legal entities")?;
    let lab_snapshot = read_snapshot(
        required_path(&s.labs, "snapshots.labs")?,
        "crm_labs",
        s.delimiter,
        &["numero_finess"],
    )?;
    let selas_snapshot = read_snapshot(
        required_path(&s.selas, "snapshots.selas")?,
        "crm_selas",
        s.delimiter,
        &["numero_finess"],
    )?;
    let directory = i
        .lab_directory
        .as_deref()
        .map(|p| read_table(p, "lab_directory", s.delimiter))
        .transpose()?;

    let tables = reconcile_labs(
        &establishments,
        &legal_entities,
        &lab_snapshot,
        &selas_snapshot,
        directory.as_ref(),
        &cfg.crm,
        &mut summary,
    )?;
    write_run(cfg, "labs", &tables, summary)
}

pub fn run_health_centers(cfg: &AppConfig) -> Result<Vec<PathBuf>> {
    let mut summary = RunSummary::start("health_centers");
    let establishments = load_establishments(required_path(
        &cfg.input.finess_establishments,
        "input.finess_establishments",
    )?)
    .context("loading FINESS establishments")?;
    let snapshot = cfg
        .snapshots
        .health_centers
        .as_deref()
        .map(|p| read_snapshot(p, "crm_health_centers", cfg.snapshots.delimiter, &["numero_finess"]))
        .transpose()?;
    let tables = reconcile_health_centers(&establishments, snapshot.as_ref(), &mut summary)?;
    write_run(cfg, "health_centers", &tables, summary)
}

pub fn run_substitutes(cfg: &AppConfig) -> Result<Vec<PathBuf>> {
    let mut summary = RunSummary::start("substitutes");
    let i = &cfg.input;
    let d = cfg.snapshots.delimiter;
    let sheet = read_snapshot(
        required_path(&i.substitutes_sheet, "input.substitutes_sheet")?,
        "substitutes_sheet",
        d,
        &["id"],
    )?;
    let agendas = read_snapshot(
        required_path(&i.practitioner_agendas, "input.practitioner_agendas")?,
        "practitioner_agendas",
        d,
        &["account_id", "agenda_id"],
    )?;
    let events = read_snapshot(
        required_path(&i.recurring_events, "input.recurring_events")?,
        "recurring_events",
        d,
        &["agenda_id", "practitioner_substitute_id"],
    )?;
    let tables = reconcile_substitutes(&sheet, &agendas, &events, &mut summary)?;
    write_run(cfg, "substitutes", &tables, summary)
}

pub fn run_finess_labs(cfg: &AppConfig) -> Result<Vec<PathBuf>> {
    let mut summary = RunSummary::start("finess_labs");
    let establishments = load_establishments(required_path(
        &cfg.input.finess_establishments,
        "input.finess_establishments",
    )?)
    .context("loading FINESS establishments")?;
    let tables = reconcile_finess_labs(&establishments, &mut summary)?;
    write_run(cfg, "finess_labs", &tables, summary)
}

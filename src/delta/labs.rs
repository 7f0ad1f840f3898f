//! Laboratories and their SELAS legal entities: what to create in the CRM,
//! and the refresh of the team's lab directory sheet.

use super::{lookup, require_snapshot_columns};
use crate::error::ReconcileError;
use crate::matching::union::{UnionMetrics, lab_union, union_match};
use crate::models::{Record, Table};
use crate::normalize::{assemble_address, clean_numeric_artifact, split_routing_line};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const LAB_SNAPSHOT_COLUMNS: [&str; 4] = ["id", "numero_finess", "street", "zipcode"];

/// Legal entities to create, and how many were dropped for lack of a street.
#[derive(Debug, Clone)]
pub struct SelasCreation {
    pub to_create: Table,
    pub excluded_no_street: usize,
}

/// SELAS referenced by in-scope labs but absent from the CRM SELAS export.
pub fn selas_to_create(
    labs: &Table,
    legal_entities: &Table,
    selas_snapshot: &Table,
) -> Result<SelasCreation, ReconcileError> {
    require_snapshot_columns(selas_snapshot, &["numero_finess"])?;
    let known: HashSet<String> = selas_snapshot
        .rows()
        .iter()
        .map(|r| clean_numeric_artifact(r.get("numero_finess")))
        .filter(|f| !f.is_empty())
        .collect();
    let wanted: HashSet<&str> = labs
        .rows()
        .iter()
        .filter_map(|r| r.get("numero_finess_juridique"))
        .filter(|f| !known.contains(*f))
        .collect();

    let candidates = legal_entities
        .filter(|r| r.get("numero_finess").is_some_and(|f| wanted.contains(f)))
        .distinct();
    let to_create = candidates
        .filter(|r| r.get("adresse").is_some_and(|a| !a.trim().is_empty()))
        .renamed("selas_to_create");
    let excluded_no_street = candidates.len() - to_create.len();
    log::info!(
        "SELAS: {} referenced by labs and unknown to the CRM, {} to create, {} dropped without street",
        wanted.len(),
        to_create.len(),
        excluded_no_street
    );
    Ok(SelasCreation {
        to_create,
        excluded_no_street,
    })
}

/// Counters of a lab creation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabMetrics {
    pub labs_total: usize,
    pub labs_with_address: usize,
    pub matching: UnionMetrics,
    pub labs_to_create: usize,
    pub excluded_no_street: usize,
}

#[derive(Debug, Clone)]
pub struct LabCreation {
    pub to_create: Table,
    pub metrics: LabMetrics,
}

/// FINESS labs unknown to the CRM by identifier and by address.
///
/// Labs without a street label are out of scope. Each lab to create carries
/// `billingstreet` and the CRM id of its SELAS in `parent_id` when that SELAS
/// already exists.
pub fn labs_to_create(
    labs: &Table,
    lab_snapshot: &Table,
    selas_snapshot: &Table,
) -> Result<LabCreation, ReconcileError> {
    require_snapshot_columns(lab_snapshot, &LAB_SNAPSHOT_COLUMNS)?;
    require_snapshot_columns(selas_snapshot, &["id", "numero_finess"])?;

    let with_address = labs.filter(|r| r.get("voie_label").is_some_and(|l| !l.trim().is_empty()));
    let cfg = lab_union();
    let matched = union_match(&with_address, lab_snapshot, &cfg)?;
    let selas_ids = lookup(selas_snapshot, "numero_finess", "id");

    let mut columns: Vec<String> = labs.columns().to_vec();
    columns.extend(["billingstreet".to_string(), "parent_id".to_string()]);
    let unmatched = matched.unmatched(&with_address, &cfg.a_key);
    let candidates = unmatched.map_rows(columns, |r| {
        let street = assemble_address(
            r.get("voie_numero"),
            None,
            r.get("voie_type"),
            r.get("voie_label"),
        );
        let parent = r
            .get("numero_finess_juridique")
            .and_then(|j| selas_ids.get(j))
            .cloned()
            .unwrap_or_default();
        r.clone()
            .with("billingstreet", street)
            .with("parent_id", parent)
    });
    let to_create = candidates
        .filter(|r| r.get("billingstreet").is_some())
        .renamed("labs_to_create");

    let metrics = LabMetrics {
        labs_total: labs.len(),
        labs_with_address: with_address.len(),
        matching: matched.metrics(),
        labs_to_create: to_create.len(),
        excluded_no_street: candidates.len() - to_create.len(),
    };
    log::info!(
        "Labs: {} in scope, {} with address, {} to create",
        metrics.labs_total,
        metrics.labs_with_address,
        metrics.labs_to_create
    );
    Ok(LabCreation { to_create, metrics })
}

/// Columns of the lab directory sheet, in sheet order.
pub const DIRECTORY_COLUMNS: [&str; 35] = [
    "numero_finess",
    "numero_finess_juridique",
    "raison_sociale",
    "raison_sociale_longue",
    "selas",
    "labo_group",
    "complement_raison_sociale",
    "complement_de_distribution",
    "numer_de_voie",
    "type_de_voie",
    "libelle_de_voie",
    "complement_de_voie",
    "lieu",
    "code_commune",
    "departement",
    "libelle_departement",
    "ligne_acheminement",
    "adress",
    "code_postal",
    "city",
    "telephone",
    "fax",
    "code_categorie",
    "libelle_categorie",
    "categorie_agregat_etablissement",
    "libelle_categorie_agregat_etablissement",
    "siret",
    "code_ape",
    "code_mft",
    "libelle_mft",
    "code_sph",
    "libelle_sph",
    "date_ouverture",
    "date_autorisation",
    "date_mise_jour",
];

const DIRECTORY_REQUIRED: [&str; 5] = [
    "numero_finess",
    "numero_finess_juridique",
    "raison_sociale",
    "raison_sociale_longue",
    "selas",
];

/// Per-field change counters of a directory refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    pub selas_filled: usize,
    pub raison_sociale: usize,
    pub raison_sociale_longue: usize,
    pub numero_finess_juridique: usize,
    pub selas_updates: usize,
    pub new_labs: usize,
}

fn directory_row(lab: &Record, selas_name: &str) -> Record {
    let (postal_code, city) = split_routing_line(lab.get("libelle_routage"));
    let v = |c: &str| clean_numeric_artifact(lab.get(c));
    Record::from_pairs([
        ("numero_finess", v("numero_finess")),
        ("numero_finess_juridique", v("numero_finess_juridique")),
        ("raison_sociale", v("raison_sociale")),
        ("raison_sociale_longue", v("raison_sociale_long")),
        ("selas", selas_name.to_string()),
        ("labo_group", String::new()),
        ("complement_raison_sociale", v("raison_sociale_complement")),
        ("complement_de_distribution", v("distribution_complement")),
        ("numer_de_voie", v("voie_numero")),
        ("type_de_voie", v("voie_type")),
        ("libelle_de_voie", v("voie_label")),
        ("complement_de_voie", v("voie_complement")),
        ("lieu", v("lieu_dit_bp")),
        ("code_commune", v("code_commune")),
        ("departement", v("departement")),
        ("libelle_departement", v("departement_label")),
        ("ligne_acheminement", v("libelle_routage")),
        ("adress", v("adresse")),
        ("code_postal", postal_code),
        ("city", city),
        ("telephone", v("telephone")),
        ("fax", v("fax")),
        ("code_categorie", v("code_categorie")),
        ("libelle_categorie", v("label_categorie")),
        ("siret", v("siret")),
        ("code_ape", v("ape")),
        ("code_sph", v("code_psph")),
        ("libelle_sph", v("label_psph")),
        ("date_ouverture", v("date_ouverture")),
        ("date_autorisation", v("date_autor")),
        ("date_mise_jour", v("date_update")),
    ])
}

/// Bring the lab directory in line with FINESS.
///
/// Empty SELAS names are filled from the legal-entity registry; names and
/// the legal-entity number follow FINESS, and a new legal-entity number also
/// resets `selas` and clears `labo_group`. Labs missing from the directory
/// are appended.
pub fn refresh_lab_directory(
    directory: &Table,
    labs: &Table,
    legal_entities: &Table,
) -> Result<(Table, DirectoryStats), ReconcileError> {
    require_snapshot_columns(directory, &DIRECTORY_REQUIRED)?;
    let selas_names = lookup(legal_entities, "numero_finess", "raison_sociale");
    let selas_name = |juridique: &str| selas_names.get(juridique).cloned().unwrap_or_default();
    let mut by_finess: HashMap<&str, &Record> = HashMap::new();
    for lab in labs.rows() {
        if let Some(f) = lab.get("numero_finess") {
            by_finess.entry(f).or_insert(lab);
        }
    }

    let mut stats = DirectoryStats::default();
    let mut columns: Vec<String> = directory.columns().to_vec();
    for c in DIRECTORY_COLUMNS {
        if !columns.iter().any(|x| x == c) {
            columns.push(c.to_string());
        }
    }

    let mut refreshed = directory.map_rows(columns, |row| {
        let mut out = row.clone();
        for c in DIRECTORY_REQUIRED {
            out.set(c, clean_numeric_artifact(row.get(c)));
        }
        if out.get("selas").is_none() {
            if let Some(j) = out.get("numero_finess_juridique") {
                let name = selas_name(j);
                if !name.is_empty() {
                    out.set("selas", name);
                    stats.selas_filled += 1;
                }
            }
        }
        let Some(lab) = out.get("numero_finess").and_then(|f| by_finess.get(f)).copied() else {
            return out;
        };
        let fresh_name = clean_numeric_artifact(lab.get("raison_sociale"));
        if out.get_or_empty("raison_sociale") != fresh_name {
            out.set("raison_sociale", fresh_name);
            stats.raison_sociale += 1;
        }
        let fresh_long = clean_numeric_artifact(lab.get("raison_sociale_long"));
        if out.get_or_empty("raison_sociale_longue") != fresh_long {
            out.set("raison_sociale_longue", fresh_long);
            stats.raison_sociale_longue += 1;
        }
        let fresh_parent = clean_numeric_artifact(lab.get("numero_finess_juridique"));
        if out.get_or_empty("numero_finess_juridique") != fresh_parent {
            out.set("selas", selas_name(&fresh_parent));
            out.set("numero_finess_juridique", fresh_parent);
            out.set("labo_group", "");
            stats.numero_finess_juridique += 1;
            stats.selas_updates += 1;
        }
        out
    });

    let listed = refreshed.key_set("numero_finess");
    for lab in labs.rows() {
        let Some(f) = lab.get("numero_finess") else {
            continue;
        };
        if listed.contains(f) {
            continue;
        }
        let name = selas_name(&clean_numeric_artifact(lab.get("numero_finess_juridique")));
        refreshed.push(directory_row(lab, &name));
        stats.new_labs += 1;
    }
    let refreshed = refreshed.renamed("lab_directory");
    log::info!(
        "Lab directory: {} SELAS names filled, {} names, {} long names, {} parent changes, {} labs added",
        stats.selas_filled,
        stats.raison_sociale,
        stats.raison_sociale_longue,
        stats.numero_finess_juridique,
        stats.new_labs
    );
    Ok((refreshed, stats))
}

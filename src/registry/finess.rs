//! FINESS national facility directory: establishments (with their
//! geolocation section) and legal entities.

use super::{positional_record, read_records};
use crate::error::LoadError;
use crate::models::{Record, Table};
use crate::normalize::{
    assemble_address, canonical_phone, clean_numeric_artifact, expand_street_type,
    split_routing_line,
};
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;

const SECTION_ESTABLISHMENT: &str = "structureet";
const SECTION_GEOLOCATION: &str = "geolocalisation";

/// Positional layout of a `structureet` row.
pub const ESTABLISHMENT_LAYOUT: [&str; 32] = [
    "section",
    "numero_finess",
    "numero_finess_juridique",
    "raison_sociale",
    "raison_sociale_long",
    "raison_sociale_complement",
    "distribution_complement",
    "voie_numero",
    "voie_type",
    "voie_label",
    "voie_complement",
    "lieu_dit_bp",
    "code_commune",
    "departement",
    "departement_label",
    "ligne_acheminement",
    "telephone",
    "fax",
    "code_categorie",
    "label_categorie",
    "code_status",
    "label_status",
    "siret",
    "ape",
    "code_tarif",
    "label_tarif",
    "code_psph",
    "label_psph",
    "date_ouverture",
    "date_autor",
    "date_update",
    "num_uai",
];

/// Positional layout of a `geolocalisation` row.
pub const GEOLOCATION_LAYOUT: [&str; 6] = [
    "section",
    "numero_finess",
    "coord_x",
    "coord_y",
    "source_coord",
    "date_update_coord",
];

/// Positional layout of a legal-entity row.
pub const LEGAL_ENTITY_LAYOUT: [&str; 23] = [
    "section",
    "numero_finess",
    "raison_sociale",
    "raison_sociale_long",
    "raison_sociale_complement",
    "voie_numero",
    "voie_type",
    "voie_label",
    "voie_complement",
    "distribution_complement",
    "lieu_dit_bp",
    "commune",
    "ligne_acheminement",
    "departement",
    "departement_label",
    "telephone",
    "statut_juridique",
    "statut_juridique_libel",
    "categorie_etablissement",
    "libelle_categorie_etablissement",
    "numero_de_siren",
    "code_ape",
    "date_de_creation",
];

pub const ESTABLISHMENT_COLUMNS: [&str; 34] = [
    "numero_finess",
    "numero_finess_juridique",
    "siret",
    "ape",
    "raison_sociale",
    "raison_sociale_long",
    "raison_sociale_complement",
    "distribution_complement",
    "voie_numero",
    "voie_type",
    "voie_label",
    "voie_complement",
    "adresse",
    "lieu_dit_bp",
    "code_postal",
    "ville",
    "code_commune",
    "departement",
    "departement_label",
    "libelle_routage",
    "telephone",
    "fax",
    "code_categorie",
    "label_categorie",
    "code_status",
    "label_status",
    "code_psph",
    "label_psph",
    "date_ouverture",
    "date_autor",
    "date_update",
    "num_uai",
    "coord_x",
    "coord_y",
];

pub const LEGAL_ENTITY_COLUMNS: [&str; 18] = [
    "numero_finess",
    "numero_de_siren",
    "code_ape",
    "raison_sociale",
    "raison_sociale_long",
    "raison_sociale_complement",
    "distribution_complement",
    "adresse",
    "lieu_dit_bp",
    "code_postal",
    "ville",
    "commune",
    "telephone",
    "statut_juridique",
    "statut_juridique_libel",
    "categorie_etablissement",
    "libelle_categorie_etablissement",
    "date_de_creation",
];

/// Laboratory categories (`code_categorie`).
pub const LAB_CATEGORIES: [&str; 2] = ["611", "612"];

/// FINESS phones lose their trunk zero when a tool coerced them to numbers;
/// a bare 9-digit value is treated as such.
fn finess_phone(raw: Option<&str>) -> String {
    let cleaned = clean_numeric_artifact(raw);
    if cleaned.len() == 9 && cleaned.chars().all(|c| c.is_ascii_digit()) {
        return format!("+33{}", cleaned);
    }
    canonical_phone(Some(cleaned.as_str())).unwrap_or_default()
}

/// Split raw FINESS records by section and attach coordinates to each
/// establishment. Records of any other section (the file banner) are skipped.
pub fn parse_establishments(records: &[StringRecord]) -> Table {
    let mut establishments = Vec::new();
    let mut geolocation: HashMap<String, Record> = HashMap::new();
    let mut skipped = 0usize;
    for rec in records {
        match rec.get(0).map(str::trim) {
            Some(SECTION_ESTABLISHMENT) => {
                establishments.push(positional_record(&ESTABLISHMENT_LAYOUT, rec))
            }
            Some(SECTION_GEOLOCATION) => {
                let g = positional_record(&GEOLOCATION_LAYOUT, rec);
                if let Some(id) = g.get("numero_finess") {
                    geolocation.insert(id.trim().to_string(), g);
                }
            }
            _ => skipped += 1,
        }
    }
    log::debug!(
        "FINESS sections: {} establishments, {} geolocations, {} other rows skipped",
        establishments.len(),
        geolocation.len(),
        skipped
    );
    let rows = establishments
        .into_iter()
        .map(|mut e| {
            e.remove("section");
            let id = e.get_or_empty("numero_finess").trim().to_string();
            if let Some(g) = geolocation.get(&id) {
                for c in &GEOLOCATION_LAYOUT[2..] {
                    e.set(*c, g.get_or_empty(c));
                }
            }
            e
        })
        .collect();
    let mut columns: Vec<&str> = ESTABLISHMENT_LAYOUT[1..].to_vec();
    columns.extend_from_slice(&GEOLOCATION_LAYOUT[2..]);
    Table::from_records("finess_establishments", columns, rows)
}

/// Derive the comparable establishment fields.
pub fn canonicalize_establishments(raw: &Table) -> Table {
    raw.map_rows(ESTABLISHMENT_COLUMNS.to_vec(), |r| {
        let mut out = Record::new();
        for c in ESTABLISHMENT_COLUMNS {
            if let Some(v) = r.get(c) {
                out.set(c, v);
            }
        }
        let street_type = r.get("voie_type").map(expand_street_type);
        out.set("numero_finess", r.get_or_empty("numero_finess").trim());
        out.set(
            "numero_finess_juridique",
            clean_numeric_artifact(r.get("numero_finess_juridique")),
        );
        out.set("voie_type", street_type.clone().unwrap_or_default());
        out.set(
            "raison_sociale",
            clean_numeric_artifact(r.get("raison_sociale")),
        );
        out.set(
            "adresse",
            assemble_address(
                r.get("voie_numero"),
                r.get("voie_complement"),
                street_type.as_deref(),
                r.get("voie_label"),
            ),
        );
        let (postal_code, city) = split_routing_line(r.get("ligne_acheminement"));
        out.set("code_postal", postal_code);
        out.set("ville", city);
        out.set("libelle_routage", r.get_or_empty("ligne_acheminement"));
        out.set("telephone", finess_phone(r.get("telephone")));
        out.set("fax", finess_phone(r.get("fax")));
        for c in ["siret", "code_categorie", "code_status", "code_psph"] {
            out.set(c, clean_numeric_artifact(r.get(c)));
        }
        out.set("ape", r.get_or_empty("ape").replace(' ', ""));
        out
    })
}

pub fn load_establishments(path: &Path) -> Result<Table, LoadError> {
    let records = read_records(path, b';')?;
    let table = canonicalize_establishments(&parse_establishments(&records));
    log::info!(
        "FINESS establishments: {} rows from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Name legal-entity records; the first record is the file banner.
pub fn parse_legal_entities(records: &[StringRecord]) -> Table {
    let rows = records
        .iter()
        .skip(1)
        .filter(|rec| rec.len() > 2)
        .map(|rec| {
            let mut r = positional_record(&LEGAL_ENTITY_LAYOUT, rec);
            r.remove("section");
            r
        })
        .collect();
    Table::from_records(
        "finess_legal_entities",
        LEGAL_ENTITY_LAYOUT[1..].to_vec(),
        rows,
    )
}

pub fn canonicalize_legal_entities(raw: &Table) -> Table {
    raw.map_rows(LEGAL_ENTITY_COLUMNS.to_vec(), |r| {
        let mut out = Record::new();
        for c in LEGAL_ENTITY_COLUMNS {
            if let Some(v) = r.get(c) {
                out.set(c, v);
            }
        }
        out.set(
            "numero_finess",
            clean_numeric_artifact(r.get("numero_finess")),
        );
        out.set(
            "raison_sociale",
            clean_numeric_artifact(r.get("raison_sociale")),
        );
        out.set(
            "adresse",
            assemble_address(
                r.get("voie_numero"),
                r.get("voie_complement"),
                r.get("voie_type"),
                r.get("voie_label"),
            ),
        );
        let (postal_code, city) = split_routing_line(r.get("ligne_acheminement"));
        out.set("code_postal", postal_code);
        out.set("ville", city);
        out.set("telephone", finess_phone(r.get("telephone")));
        out.set(
            "numero_de_siren",
            clean_numeric_artifact(r.get("numero_de_siren")),
        );
        out.set("code_ape", r.get_or_empty("code_ape").replace(' ', ""));
        out.set(
            "statut_juridique",
            clean_numeric_artifact(r.get("statut_juridique")),
        );
        out
    })
}

pub fn load_legal_entities(path: &Path) -> Result<Table, LoadError> {
    let records = read_records(path, b';')?;
    let table = canonicalize_legal_entities(&parse_legal_entities(&records));
    log::info!(
        "FINESS legal entities: {} rows from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

/// FINESS pharmacies, reduced to the fields the pharmacy cascade compares.
pub fn pharmacy_scope(establishments: &Table) -> Table {
    establishments
        .filter(|r| {
            r.get("label_categorie")
                .is_some_and(|l| l.to_lowercase().contains("pharma"))
        })
        .select(&[
            "numero_finess",
            "raison_sociale",
            "adresse",
            "code_postal",
            "telephone",
        ])
        .map_rows(
            vec![
                "numero_finess",
                "raison_sociale",
                "adresse",
                "code_postal",
                "telephone",
            ],
            |r| {
                let trimmed = r.get_or_empty("raison_sociale").trim().to_string();
                r.clone().with("raison_sociale", trimmed)
            },
        )
        .renamed("finess_pharmacies")
}

/// FINESS laboratories.
pub fn lab_scope(establishments: &Table) -> Table {
    establishments
        .filter(|r| {
            r.get("code_categorie")
                .is_some_and(|c| LAB_CATEGORIES.contains(&c))
        })
        .renamed("finess_labs")
}

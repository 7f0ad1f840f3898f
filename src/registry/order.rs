//! Pharmacy-order directory: establishments, pharmacists and their
//! activities (one row per pharmacist role at an establishment).

use super::{read_table, require_columns};
use crate::error::LoadError;
use crate::models::{Record, Table};
use crate::normalize::{canonical_phone, canonical_postal_code, collapse_spaces};
use std::collections::HashSet;
use std::path::Path;

/// Establishment types kept as pharmacies.
pub const PHARMACY_TYPES: [&str; 9] = [
    "OFFICINE",
    "SIEGE SOCIAL PHARMACEUTIQUE",
    "ETS C PHARMACEU. NON SIEGE SOCIAL",
    "ETS B PHARMACEUT.NON SIEGE SOCIAL",
    "PHARMACIEN MULTI - EMPLOYEURS",
    "ETS BC PHARMACEU. NON SIEGE SOCIAL",
    "PHARMACIE MUTUALISTE",
    "PHARMACIE DE SECOURS MINIER",
    "ANTENNE D'OFFICINE",
];

/// Pharmacist roles (`Fonction`) that count as an activity at a pharmacy.
pub const PHARMACIST_ROLES: [&str; 19] = [
    "PHARMACIEN TITULAIRE D'OFFICINE",
    "ADJOINT INTERMITTENT EN OFFICINE",
    "ADJOINT D'OFFICINE TEMPS PARTIEL",
    "ADJOINT  INDUSTRIE",
    "ADJOINT INDUSTRIE TEMPS PARTIEL",
    "PHARMACIEN ADJOINT D'OFFICINE",
    "PHARMACIEN RESPONSABLE",
    "PRATICIEN ADJOINT CONTRACTUEL",
    "PHARMACIEN ADJOINT ES PRIVÉ T.PLEIN",
    "GERANT APRES DECES DU TITULAIRE",
    "PHARMACIEN SP ADJOINT VOLONTAIRE",
    "PHARMACIEN ADJOINT ES PRIVÉ T.PARTI",
    "ADJOINT CARMI",
    "ADJOINT PHARMACIE MUTUALISTE",
    "PHARMACIEN ADJOINT BPDO",
    "PHARMACIEN SP ADJOINT PROFESSIONNEL",
    "ADJOINT DISTRIBUTION",
    "PHARMACIEN SAPEUR-POMPIER ADJOINT",
    "RESPONSABLE",
];

const RAW_ESTABLISHMENT_ID: &str = "Numéro d'établissement";
const RAW_PHARMACIST_RPPS: &str = "n° RPPS";
const RAW_ACTIVITY_RPPS: &str = "n° RPPS pharmacien";

/// Raw header → canonical column for the establishments file.
const ESTABLISHMENT_RENAMES: [(&str, &str); 10] = [
    (RAW_ESTABLISHMENT_ID, "numero_establishment"),
    ("Type établissement", "type"),
    ("Dénomination commerciale", "denomination_commerciale"),
    ("Raison sociale", "raison_sociale"),
    ("Adresse", "address"),
    ("Code postal", "code_postal"),
    ("Commune", "commune"),
    ("Département", "department"),
    ("Région", "region"),
    ("Fax", "fax"),
];

pub const PHARMACY_COLUMNS: [&str; 11] = [
    "numero_establishment",
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

pub const ACTIVITY_COLUMNS: [&str; 3] = ["numero_establishment", "rpps", "fonction"];
pub const PHARMACIST_COLUMNS: [&str; 3] = ["rpps", "first_name", "last_name"];

#[derive(Debug, Clone)]
pub struct OrderPaths<'a> {
    pub establishments: &'a Path,
    pub pharmacists: &'a Path,
    pub activities: &'a Path,
}

#[derive(Debug, Clone)]
pub struct OrderRegistry {
    pub pharmacies: Table,
    pub pharmacists: Table,
    pub activities: Table,
}

pub fn load_order_registry(paths: &OrderPaths<'_>) -> Result<OrderRegistry, LoadError> {
    let raw_establishments = read_table(paths.establishments, "order_establishments", b';')?;
    let raw_pharmacists = read_table(paths.pharmacists, "order_pharmacists", b';')?;
    let raw_activities = read_table(paths.activities, "order_activities", b';')?;

    let pharmacies = prepare_pharmacies(&raw_establishments)?;
    let activities = prepare_activities(&raw_activities, &pharmacies)?;
    let pharmacists = prepare_pharmacists(&raw_pharmacists, &activities)?;
    log::info!(
        "Pharmacy order: {} pharmacies, {} pharmacists, {} activities",
        pharmacies.len(),
        pharmacists.len(),
        activities.len()
    );
    Ok(OrderRegistry {
        pharmacies,
        pharmacists,
        activities,
    })
}

/// Canonicalise order establishments and keep pharmacy types only.
pub fn prepare_pharmacies(raw: &Table) -> Result<Table, LoadError> {
    require_columns(
        raw,
        &[RAW_ESTABLISHMENT_ID, "Type établissement", "Adresse", "Code postal"],
    )?;
    let kept = raw.filter(|r| r.get("Adresse").is_some());
    let renamed = kept.rename_columns(&ESTABLISHMENT_RENAMES);
    let out = renamed
        .map_rows(PHARMACY_COLUMNS.to_vec(), |r| {
            let mut rec = Record::new();
            for c in PHARMACY_COLUMNS {
                rec.set(c, r.get_or_empty(c));
            }
            rec.set(
                "phone",
                canonical_phone(r.get("Téléphone")).unwrap_or_default(),
            );
            rec.set("address", collapse_spaces(r.get_or_empty("address")));
            rec.set(
                "code_postal",
                canonical_postal_code(r.get("code_postal")).unwrap_or_default(),
            );
            rec.set("raison_sociale", r.get_or_empty("raison_sociale").trim());
            rec
        })
        .filter(|r| {
            r.get("type")
                .map(|t| PHARMACY_TYPES.contains(&t))
                .unwrap_or(false)
        })
        .renamed("pharmacies");
    log::debug!(
        "Order establishments: {} raw, {} with address, {} pharmacies",
        raw.len(),
        kept.len(),
        out.len()
    );
    Ok(out)
}

/// Keep activities at kept pharmacies with a pharmacist role.
pub fn prepare_activities(raw: &Table, pharmacies: &Table) -> Result<Table, LoadError> {
    require_columns(raw, &[RAW_ESTABLISHMENT_ID, RAW_ACTIVITY_RPPS, "Fonction"])?;
    let establishments = pharmacies.key_set("numero_establishment");
    let out = raw
        .filter(|r| {
            r.get(RAW_ESTABLISHMENT_ID)
                .is_some_and(|e| establishments.contains(e))
                && r.get("Fonction").is_some_and(|f| PHARMACIST_ROLES.contains(&f))
        })
        .rename_columns(&[
            (RAW_ESTABLISHMENT_ID, "numero_establishment"),
            (RAW_ACTIVITY_RPPS, "rpps"),
            ("Fonction", "fonction"),
        ])
        .select(&ACTIVITY_COLUMNS)
        .renamed("activities");
    Ok(out)
}

/// Keep pharmacists referenced by at least one kept activity.
pub fn prepare_pharmacists(raw: &Table, activities: &Table) -> Result<Table, LoadError> {
    require_columns(raw, &[RAW_PHARMACIST_RPPS])?;
    let active: HashSet<String> = activities.key_set("rpps");
    let out = raw
        .filter(|r| r.get(RAW_PHARMACIST_RPPS).is_some_and(|id| active.contains(id)))
        .rename_columns(&[
            (RAW_PHARMACIST_RPPS, "rpps"),
            ("Prénom", "first_name"),
            ("Nom de naissance", "last_name"),
        ])
        .select(&PHARMACIST_COLUMNS)
        .renamed("pharmacists");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_establishments() -> Table {
        Table::from_records(
            "raw",
            vec![
                RAW_ESTABLISHMENT_ID,
                "Type établissement",
                "Dénomination commerciale",
                "Raison sociale",
                "Adresse",
                "Code postal",
                "Commune",
                "Téléphone",
            ],
            vec![
                Record::from_pairs([
                    (RAW_ESTABLISHMENT_ID, "P1"),
                    ("Type établissement", "OFFICINE"),
                    ("Raison sociale", " PHARMACIE ALPHA "),
                    ("Adresse", "10  RUE  X"),
                    ("Code postal", "1000"),
                    ("Téléphone", "0100000000"),
                ]),
                Record::from_pairs([
                    (RAW_ESTABLISHMENT_ID, "P2"),
                    ("Type établissement", "OFFICINE"),
                    ("Adresse", ""),
                ]),
                Record::from_pairs([
                    (RAW_ESTABLISHMENT_ID, "P3"),
                    ("Type établissement", "GROSSISTE"),
                    ("Adresse", "1 RUE Z"),
                ]),
            ],
        )
    }

    #[test]
    fn pharmacies_are_canonicalised_and_scoped() {
        let t = prepare_pharmacies(&raw_establishments()).unwrap();
        assert_eq!(t.len(), 1);
        let r = &t.rows()[0];
        assert_eq!(r.get("numero_establishment"), Some("P1"));
        assert_eq!(r.get("address"), Some("10 RUE X"));
        assert_eq!(r.get("code_postal"), Some("01000"));
        assert_eq!(r.get("phone"), Some("+33100000000"));
        assert_eq!(r.get("raison_sociale"), Some("PHARMACIE ALPHA"));
        assert_eq!(t.columns().len(), PHARMACY_COLUMNS.len());
    }

    #[test]
    fn activities_follow_kept_pharmacies_and_roles() {
        let pharmacies = prepare_pharmacies(&raw_establishments()).unwrap();
        let raw = Table::from_records(
            "raw_act",
            vec![RAW_ESTABLISHMENT_ID, RAW_ACTIVITY_RPPS, "Fonction"],
            vec![
                Record::from_pairs([
                    (RAW_ESTABLISHMENT_ID, "P1"),
                    (RAW_ACTIVITY_RPPS, "100"),
                    ("Fonction", "PHARMACIEN TITULAIRE D'OFFICINE"),
                ]),
                Record::from_pairs([
                    (RAW_ESTABLISHMENT_ID, "P1"),
                    (RAW_ACTIVITY_RPPS, "101"),
                    ("Fonction", "PREPARATEUR"),
                ]),
                Record::from_pairs([
                    (RAW_ESTABLISHMENT_ID, "P3"),
                    (RAW_ACTIVITY_RPPS, "102"),
                    ("Fonction", "RESPONSABLE"),
                ]),
            ],
        );
        let acts = prepare_activities(&raw, &pharmacies).unwrap();
        assert_eq!(acts.len(), 1);
        assert_eq!(acts.rows()[0].get("rpps"), Some("100"));

        let raw_ph = Table::from_records(
            "raw_ph",
            vec![RAW_PHARMACIST_RPPS, "Prénom", "Nom de naissance"],
            vec![
                Record::from_pairs([
                    (RAW_PHARMACIST_RPPS, "100"),
                    ("Prénom", "ANNE"),
                    ("Nom de naissance", "MARTIN"),
                ]),
                Record::from_pairs([(RAW_PHARMACIST_RPPS, "102"), ("Prénom", "LUC")]),
            ],
        );
        let ph = prepare_pharmacists(&raw_ph, &acts).unwrap();
        assert_eq!(ph.len(), 1);
        assert_eq!(ph.rows()[0].get("last_name"), Some("MARTIN"));
    }

    #[test]
    fn missing_establishment_columns_fail_loudly() {
        let raw = Table::new("raw", vec!["Adresse"]);
        assert!(matches!(
            prepare_pharmacies(&raw),
            Err(LoadError::Schema { .. })
        ));
    }
}

//! Health-center scope of the FINESS establishments and the accounts it adds
//! relative to the CRM.

use super::require_snapshot_columns;
use crate::error::ReconcileError;
use crate::models::{Record, Table};

/// Category code, care type, organisation type.
pub const HEALTH_CENTER_CATEGORIES: [(&str, &str, &str); 26] = [
    ("124", "CURATIVE", "HEALTH_CENTER_MVZ"),
    ("125", "CURATIVE", "DENTAL_CENTER"),
    ("130", "CURATIVE", "NURSING_CENTER"),
    ("142", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("143", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("197", "PREVENTION", "CSAPA"),
    ("223", "PREVENTION", "PMI"),
    ("224", "PREVENTION", "CPEF"),
    ("228", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("230", "PREVENTION", "PMI"),
    ("266", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("267", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("268", "PREVENTION", "CMS"),
    ("269", "PREVENTION", "SIUMPPS"),
    ("270", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("289", "CURATIVE", "NURSING_CENTER"),
    ("294", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("347", "PREVENTION", "CES_CENTRE_DEXAMENS_DE_SANTE"),
    ("438", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("439", "CURATIVE", "HEALTH_CENTER_MVZ"),
    ("616", "PREVENTION", "WORKMEDICINE"),
    ("630", "CURATIVE", "HEALTH_CENTER_MVZ"),
    ("636", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("637", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("638", "PREVENTION", "HEALTH_CENTER_MVZ"),
    ("645", "PREVENTION", "HEALTH_CENTER_MVZ"),
];

pub const SCOPE_COLUMNS: [&str; 30] = [
    "numero_finess",
    "numero_finess_juridique",
    "siret",
    "ape",
    "raison_sociale",
    "raison_sociale_long",
    "distribution_complement",
    "adresse",
    "lieu_dit_bp",
    "code_postal",
    "ville",
    "telephone",
    "fax",
    "code_categorie",
    "label_categorie",
    "code_status",
    "label_status",
    "code_psph",
    "date_ouverture",
    "date_update",
    "num_uai",
    "coord_x",
    "coord_y",
    "healthcareservicetype",
    "organization_type",
    "status",
    "closed_at",
    "new_establishment_this_month",
    "libelle_routage",
    "departement",
];

fn category(code: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    HEALTH_CENTER_CATEGORIES.iter().find(|(c, _, _)| *c == code)
}

/// Establishments in one of the health-center categories, tagged with their
/// care and organisation type. Every row starts as open and not new.
pub fn health_center_scope(establishments: &Table) -> Table {
    establishments
        .filter(|r| r.get("code_categorie").and_then(category).is_some())
        .map_rows(SCOPE_COLUMNS.to_vec(), |r| {
            let mut out =
                Record::from_pairs(SCOPE_COLUMNS.iter().map(|c| (*c, r.get_or_empty(c))));
            if let Some((_, care, org)) = r.get("code_categorie").and_then(category) {
                out.set("healthcareservicetype", *care);
                out.set("organization_type", *org);
            }
            out.set("status", "open");
            out.set("closed_at", "");
            out.set("new_establishment_this_month", "false");
            out
        })
        .renamed("health_centers")
}

/// Flag scope rows whose FINESS number the CRM export does not list. Returns
/// the flagged scope and the new accounts alone.
pub fn new_health_centers(scope: &Table, snapshot: &Table) -> Result<(Table, Table), ReconcileError> {
    require_snapshot_columns(snapshot, &["numero_finess"])?;
    let known = snapshot.key_set("numero_finess");
    let flagged = scope.map_rows(scope.columns().to_vec(), |r| {
        let is_new = r.get("numero_finess").is_some_and(|f| !known.contains(f));
        r.clone()
            .with("new_establishment_this_month", if is_new { "true" } else { "false" })
    });
    let new_accounts = flagged
        .filter(|r| r.get("new_establishment_this_month") == Some("true"))
        .renamed("health_centers_new");
    log::info!(
        "Health centers: {} in scope, {} new accounts",
        flagged.len(),
        new_accounts.len()
    );
    Ok((flagged, new_accounts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn establishments() -> Table {
        Table::from_records(
            "finess_establishments",
            vec!["numero_finess", "code_categorie", "raison_sociale"],
            vec![
                Record::from_pairs([("numero_finess", "H1"), ("code_categorie", "124"), ("raison_sociale", "CDS A")]),
                Record::from_pairs([("numero_finess", "H2"), ("code_categorie", "223"), ("raison_sociale", "PMI B")]),
                Record::from_pairs([("numero_finess", "X1"), ("code_categorie", "620"), ("raison_sociale", "PHARMA")]),
            ],
        )
    }

    #[test]
    fn categories_are_split_into_care_types() {
        let curative = HEALTH_CENTER_CATEGORIES.iter().filter(|c| c.1 == "CURATIVE").count();
        assert_eq!(curative, 6);
        assert_eq!(HEALTH_CENTER_CATEGORIES.len() - curative, 20);
    }

    #[test]
    fn scope_is_tagged() {
        let s = health_center_scope(&establishments());
        assert_eq!(s.len(), 2);
        assert_eq!(s.rows()[0].get("healthcareservicetype"), Some("CURATIVE"));
        assert_eq!(s.rows()[0].get("organization_type"), Some("HEALTH_CENTER_MVZ"));
        assert_eq!(s.rows()[1].get("healthcareservicetype"), Some("PREVENTION"));
        assert_eq!(s.rows()[1].get("organization_type"), Some("PMI"));
        assert_eq!(s.rows()[1].get("status"), Some("open"));
    }

    #[test]
    fn accounts_absent_from_crm_are_new() {
        let s = health_center_scope(&establishments());
        let snap = Table::from_records(
            "crm_health_centers",
            vec!["numero_finess"],
            vec![Record::from_pairs([("numero_finess", "H1")])],
        );
        let (flagged, new) = new_health_centers(&s, &snap).unwrap();
        assert_eq!(flagged.rows()[0].get("new_establishment_this_month"), Some("false"));
        assert_eq!(new.len(), 1);
        assert_eq!(new.rows()[0].get("numero_finess"), Some("H2"));
    }
}

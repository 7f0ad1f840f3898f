//! Built-in CRM import templates. Names double as output file stems.

use super::ExportTemplate;
use crate::config::CrmConfig;
use crate::delta::health_centers::SCOPE_COLUMNS;
use crate::delta::labs::DIRECTORY_COLUMNS;
use crate::delta::pharmacies::CURRENT_STATE_COLUMNS;

pub fn pharmacies(crm: &CrmConfig) -> ExportTemplate {
    ExportTemplate::new(
        "new_pharma_ba",
        &[
            ("numero_establishment", "external_id"),
            ("numero_finess", "finessnumber__c"),
            ("raison_sociale", "name"),
            ("address", "billingstreet"),
            ("code_postal", "billingpostalcode"),
            ("commune", "billingcity"),
            ("phone", "phone"),
        ],
    )
    .with_constant("recordtype", crm.account_record_type.as_str())
    .with_constant("organisationtype__c", "Pharmacy")
    .with_constant("billingcountrycode", crm.country_code.as_str())
}

/// Known pharmacies whose FINESS number the CRM does not carry yet.
pub fn pharmacy_finess_updates() -> ExportTemplate {
    ExportTemplate::new(
        "pharmacy_finess_updates",
        &[
            ("crm_id", "id"),
            ("numero_establishment", "external_id"),
            ("numero_finess", "finessnumber__c"),
        ],
    )
}

pub fn pharmacists() -> ExportTemplate {
    ExportTemplate::new(
        "new_pharmacists_pa",
        &[
            ("rpps", "rppsnumber__c"),
            ("first_name", "firstname"),
            ("last_name", "lastname"),
            ("specialty__c", "specialty__c"),
        ],
    )
}

pub fn activities() -> ExportTemplate {
    ExportTemplate::new(
        "new_activities_to_create_pac",
        &[
            ("numero_establishment", "external_id"),
            ("rpps", "rppsnumber__c"),
            ("fonction", "roleintheworkplace__c"),
            ("personaccount_id", "personaccount_id"),
            ("businessaccount_id", "businessaccount_id"),
        ],
    )
}

pub fn activity_status() -> ExportTemplate {
    ExportTemplate::passthrough(
        "pac_status_update",
        &["pac_id", "obsoleteprofessionalactivity__c"],
    )
}

pub fn labs(crm: &CrmConfig) -> ExportTemplate {
    ExportTemplate::new(
        "labs_to_create",
        &[
            ("raison_sociale", "account name"),
            ("numero_finess", "finessnumber__c"),
            ("siret", "siret"),
            ("date_ouverture", "createddate"),
            ("billingstreet", "billingstreet"),
            ("code_postal", "billingpostalcode"),
            ("ville", "billingcity"),
            ("telephone", "phone"),
            ("parent_id", "Parent_id"),
        ],
    )
    .with_constant("recordtypeid", crm.account_record_type.as_str())
    .with_constant("organisationtype__c", "Laboratory")
    .with_constant("billingcountrycode", crm.country_code.as_str())
}

pub fn selas(crm: &CrmConfig) -> ExportTemplate {
    ExportTemplate::new(
        "selas_to_create",
        &[
            ("raison_sociale", "account name"),
            ("numero_finess", "finessnumber__c"),
            ("adresse", "billingstreet"),
            ("code_postal", "billingpostalcode"),
            ("ville", "billingcity"),
            ("telephone", "phone"),
            ("numero_de_siren", "numero_de_siren"),
            ("date_de_creation", "createddate"),
        ],
    )
    .with_constant("recordtypeid", crm.selas_record_type.as_str())
    .with_constant("organisationtype__c", "Laboratory")
    .with_constant("billingcountrycode", crm.country_code.as_str())
}

pub fn hierarchy_update() -> ExportTemplate {
    ExportTemplate::passthrough("labs_hierarchy_update", &["id", "parent_id"])
}

/// Parent changes waiting for their SELAS to be created.
pub fn hierarchy_pending() -> ExportTemplate {
    ExportTemplate::new(
        "labs_hierarchy_pending",
        &[
            ("id", "id"),
            ("numero_finess", "finessnumber__c"),
            ("selas_finess_crm", "selas_finess_crm"),
            ("numero_finess_juridique", "selas_finess_new"),
        ],
    )
}

pub fn health_centers() -> ExportTemplate {
    let mut t = ExportTemplate::passthrough("new_finess_accounts", &SCOPE_COLUMNS);
    for (source, target) in t.columns.iter_mut() {
        match source.as_str() {
            "numero_finess" => *target = "finessnumber__c".into(),
            "raison_sociale" => *target = "name".into(),
            "telephone" => *target = "phone".into(),
            _ => {}
        }
    }
    t
}

pub fn linkage() -> ExportTemplate {
    ExportTemplate::passthrough(
        "pharmacy_linkage",
        &["numero_establishment", "numero_finess", "match_pass"],
    )
}

pub fn current_state() -> ExportTemplate {
    ExportTemplate::passthrough("pharmacy_current_state", &CURRENT_STATE_COLUMNS)
}

pub fn lab_directory() -> ExportTemplate {
    ExportTemplate::passthrough("lab_directory", &DIRECTORY_COLUMNS)
}

/// The substitute sheet handed back to the scheduling team.
pub fn substitutes() -> ExportTemplate {
    ExportTemplate::new(
        "sub_sheet",
        &[
            ("account_id", "doctolib_account_id"),
            ("name_metabase", "name"),
            ("sf_id", "sf_id"),
            ("sf_account_specialty.1", "sf_specialty"),
            ("sf_status", "sf_status"),
            ("phone_metabase", "phone_metabase"),
            ("phone_sheet", "phone_rak_file"),
            ("agenda_owner", "agenda_owner"),
            ("owner_name", "owner_name"),
            ("agenda_specialty", "agenda_specialty"),
            ("agenda_specialty_sub_group", "agenda_specialty_sub_group"),
            ("email_sheet", "email_rak_file"),
            ("email_metabase", "email_sf"),
            ("status", "status_rak_file"),
            ("practitioner_substitute_id", "practitioner_substitute_id"),
            ("agenda_id", "agenda_id"),
            ("organization_id_sheet", "organization_id"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, Table};

    #[test]
    fn pharmacy_template_follows_import_layout() {
        let t = pharmacies(&CrmConfig::default());
        assert_eq!(
            t.headers(),
            [
                "external_id",
                "finessnumber__c",
                "name",
                "billingstreet",
                "billingpostalcode",
                "billingcity",
                "phone",
                "recordtype",
                "organisationtype__c",
                "billingcountrycode",
            ]
        );
    }

    #[test]
    fn lab_without_parent_exports_empty_parent_id() {
        let labs_table = Table::from_records(
            "labs_to_create",
            vec!["numero_finess", "raison_sociale", "billingstreet", "parent_id"],
            vec![Record::from_pairs([
                ("numero_finess", "130000002"),
                ("raison_sociale", "LABO BETA"),
                ("billingstreet", "3 AVENUE DU PORT"),
                ("parent_id", ""),
            ])],
        );
        let out = labs(&CrmConfig::default()).apply(&labs_table);
        let r = &out.rows()[0];
        assert_eq!(r.get("account name"), Some("LABO BETA"));
        assert_eq!(r.get("Parent_id"), None);
        assert_eq!(r.get("recordtypeid"), Some("0121i000000kJpkAAE"));
        assert_eq!(r.get("organisationtype__c"), Some("Laboratory"));
    }

    #[test]
    fn substitute_sheet_uses_team_headers() {
        let sheet = substitutes();
        let h = sheet.headers();
        assert_eq!(h.len(), crate::delta::substitutes::SUBSTITUTE_COLUMNS.len());
        assert_eq!(h[0], "doctolib_account_id");
        assert_eq!(h[3], "sf_specialty");
        assert_eq!(h[16], "organization_id");
    }

    #[test]
    fn health_center_template_renames_identity_columns() {
        let t = health_centers();
        let h = t.headers();
        assert_eq!(h[0], "finessnumber__c");
        assert!(h.contains(&"name") && h.contains(&"phone"));
        assert!(h.contains(&"healthcareservicetype"));
        assert_eq!(h.len(), SCOPE_COLUMNS.len());
    }
}

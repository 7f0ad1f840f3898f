use crate::error::ConfigError;
use crate::export::ExportFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Registry files. Which ones are needed depends on the reconciliation run.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct InputConfig {
    /// Pharmacy-order establishments (`;`, UTF-16 or UTF-8).
    pub order_establishments: Option<PathBuf>,
    pub order_pharmacists: Option<PathBuf>,
    pub order_activities: Option<PathBuf>,
    /// FINESS establishments extract (`structureet` + `geolocalisation`).
    pub finess_establishments: Option<PathBuf>,
    /// FINESS legal entities extract (`structurej`).
    pub finess_legal_entities: Option<PathBuf>,
    /// The team's lab directory sheet, refreshed when given.
    pub lab_directory: Option<PathBuf>,
    /// Substitutes sheet filled in by practices.
    pub substitutes_sheet: Option<PathBuf>,
    /// Agendas and practitioners of the specialties being staffed.
    pub practitioner_agendas: Option<PathBuf>,
    /// Recurring events naming a practitioner substitute.
    pub recurring_events: Option<PathBuf>,
}

/// CRM exports. Without them a run only links and reports current state.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SnapshotConfig {
    pub pharmacies: Option<PathBuf>,
    pub pharmacists: Option<PathBuf>,
    pub labs: Option<PathBuf>,
    pub selas: Option<PathBuf>,
    pub health_centers: Option<PathBuf>,
    /// Delimiter of the CRM exports.
    pub delimiter: u8,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            pharmacies: None,
            pharmacists: None,
            labs: None,
            selas: None,
            health_centers: None,
            delimiter: b',',
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ExportConfig {
    pub out_dir: PathBuf,
    pub format: ExportFormat,
    pub delimiter: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            format: ExportFormat::Csv,
            delimiter: b',',
        }
    }
}

/// Identifiers the CRM import templates carry as constants.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CrmConfig {
    /// Record type of pharmacy and laboratory business accounts.
    pub account_record_type: String,
    pub selas_record_type: String,
    pub pharmacist_specialty_id: String,
    pub country_code: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            account_record_type: "0121i000000kJpkAAE".into(),
            selas_record_type: "0121i000000kJplAAE".into(),
            pharmacist_specialty_id: "a0h1i000000niyxAAA".into(),
            country_code: "FR".into(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub crm: CrmConfig,
}

fn check_delimiter(field: &'static str, d: u8) -> Result<(), ConfigError> {
    if d == 0 || d == b'"' || d == b'\n' || d == b'\r' || !d.is_ascii() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{:?} cannot separate fields", d as char),
        });
    }
    Ok(())
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export.out_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "export.out_dir",
            });
        }
        check_delimiter("export.delimiter", self.export.delimiter)?;
        check_delimiter("snapshots.delimiter", self.snapshots.delimiter)?;
        let crm = [
            ("crm.account_record_type", &self.crm.account_record_type),
            ("crm.selas_record_type", &self.crm.selas_record_type),
            ("crm.pharmacist_specialty_id", &self.crm.pharmacist_specialty_id),
        ];
        for (field, v) in crm {
            if v.trim().is_empty() {
                return Err(ConfigError::MissingField { field });
            }
        }
        if self.crm.country_code.len() != 2
            || !self.crm.country_code.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(ConfigError::InvalidValue {
                field: "crm.country_code",
                reason: format!("'{}' is not an ISO 3166 alpha-2 code", self.crm.country_code),
            });
        }
        Ok(())
    }

    /// The order registry needs all three of its files together.
    pub fn require_order_registry(&self) -> Result<(), ConfigError> {
        let i = &self.input;
        if i.order_establishments.is_none() {
            return Err(ConfigError::MissingField {
                field: "input.order_establishments",
            });
        }
        if i.order_pharmacists.is_none() {
            return Err(ConfigError::MissingField {
                field: "input.order_pharmacists",
            });
        }
        if i.order_activities.is_none() {
            return Err(ConfigError::MissingField {
                field: "input.order_activities",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn defaults_validate() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn quote_delimiter_is_rejected() {
        let mut cfg = valid();
        cfg.export.delimiter = b'"';
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue {
                field: "export.delimiter",
                ..
            })
        ));
    }

    #[test]
    fn blank_specialty_is_missing() {
        let mut cfg = valid();
        cfg.crm.pharmacist_specialty_id = "  ".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingField {
                field: "crm.pharmacist_specialty_id"
            })
        ));
    }

    #[test]
    fn lowercase_country_code_is_invalid() {
        let mut cfg = valid();
        cfg.crm.country_code = "fr".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn order_registry_requires_every_file() {
        let mut cfg = valid();
        cfg.input.order_establishments = Some("etab.csv".into());
        cfg.input.order_activities = Some("act.csv".into());
        assert!(matches!(
            cfg.require_order_registry(),
            Err(ConfigError::MissingField {
                field: "input.order_pharmacists"
            })
        ));
    }
}

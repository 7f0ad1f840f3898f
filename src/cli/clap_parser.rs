use crate::config::{AppConfig, CrmConfig, ExportConfig, InputConfig, SnapshotConfig};
use crate::error::ConfigError;
use crate::export::ExportFormat;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, ValueEnum, Debug)]
pub enum FormatOpt {
    Csv,
    Xlsx,
    Both,
}

impl From<FormatOpt> for ExportFormat {
    fn from(f: FormatOpt) -> Self {
        match f {
            FormatOpt::Csv => ExportFormat::Csv,
            FormatOpt::Xlsx => ExportFormat::Xlsx,
            FormatOpt::Both => ExportFormat::Both,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "finess_matcher",
    version,
    about = "Reconcile the pharmacy order and FINESS registries against CRM exports",
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Link order pharmacies to FINESS and derive pharmacy, pharmacist and activity changes
    Pharmacies(PharmacyArgs),
    /// Derive SELAS, lab and hierarchy changes; optionally refresh the lab directory
    Labs(LabArgs),
    /// Health-center scope and the accounts it adds
    HealthCenters(HealthCenterArgs),
    /// Every FINESS laboratory (categories 611 and 612) as one extract
    FinessLabs(FinessLabArgs),
    /// Match the substitutes sheet to practitioner agendas
    Substitutes(SubstituteArgs),
    /// Write a commented .env template
    EnvTemplate {
        #[arg(value_name = "PATH", default_value = ".env.template")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output directory (env: FINESS_MATCHER_OUT_DIR)
    #[arg(long = "out-dir", env = "FINESS_MATCHER_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,
    /// Output format (env: FINESS_MATCHER_FORMAT)
    #[arg(long, env = "FINESS_MATCHER_FORMAT", value_enum, default_value_t = FormatOpt::Csv)]
    pub format: FormatOpt,
    /// Field delimiter of exported CSV files (env: FINESS_MATCHER_DELIMITER)
    #[arg(long, env = "FINESS_MATCHER_DELIMITER", default_value_t = ',')]
    pub delimiter: char,
    /// Field delimiter of the CRM exports (env: FINESS_MATCHER_SNAPSHOT_DELIMITER)
    #[arg(
        long = "snapshot-delimiter",
        env = "FINESS_MATCHER_SNAPSHOT_DELIMITER",
        default_value_t = ','
    )]
    pub snapshot_delimiter: char,
}

/// CRM identifiers; unset values keep the built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct CrmArgs {
    #[arg(long = "account-record-type", env = "FINESS_MATCHER_ACCOUNT_RECORD_TYPE")]
    pub account_record_type: Option<String>,
    #[arg(long = "selas-record-type", env = "FINESS_MATCHER_SELAS_RECORD_TYPE")]
    pub selas_record_type: Option<String>,
    #[arg(long = "pharmacist-specialty", env = "FINESS_MATCHER_PHARMACIST_SPECIALTY")]
    pub pharmacist_specialty: Option<String>,
    #[arg(long = "country-code", env = "FINESS_MATCHER_COUNTRY_CODE")]
    pub country_code: Option<String>,
}

impl CrmArgs {
    fn to_crm_config(&self) -> CrmConfig {
        let d = CrmConfig::default();
        CrmConfig {
            account_record_type: self.account_record_type.clone().unwrap_or(d.account_record_type),
            selas_record_type: self.selas_record_type.clone().unwrap_or(d.selas_record_type),
            pharmacist_specialty_id: self
                .pharmacist_specialty
                .clone()
                .unwrap_or(d.pharmacist_specialty_id),
            country_code: self.country_code.clone().unwrap_or(d.country_code),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PharmacyArgs {
    /// Order establishments file (env: FINESS_MATCHER_ORDER_ESTABLISHMENTS)
    #[arg(long = "order-establishments", env = "FINESS_MATCHER_ORDER_ESTABLISHMENTS")]
    pub order_establishments: PathBuf,
    /// Order pharmacists file (env: FINESS_MATCHER_ORDER_PHARMACISTS)
    #[arg(long = "order-pharmacists", env = "FINESS_MATCHER_ORDER_PHARMACISTS")]
    pub order_pharmacists: PathBuf,
    /// Order activities file (env: FINESS_MATCHER_ORDER_ACTIVITIES)
    #[arg(long = "order-activities", env = "FINESS_MATCHER_ORDER_ACTIVITIES")]
    pub order_activities: PathBuf,
    /// FINESS establishments extract (env: FINESS_MATCHER_FINESS_ESTABLISHMENTS)
    #[arg(long = "finess-establishments", env = "FINESS_MATCHER_FINESS_ESTABLISHMENTS")]
    pub finess_establishments: PathBuf,
    /// CRM pharmacy export (env: FINESS_MATCHER_SNAPSHOT_PHARMACIES)
    #[arg(long = "crm-pharmacies", env = "FINESS_MATCHER_SNAPSHOT_PHARMACIES")]
    pub crm_pharmacies: Option<PathBuf>,
    /// CRM pharmacist export (env: FINESS_MATCHER_SNAPSHOT_PHARMACISTS)
    #[arg(long = "crm-pharmacists", env = "FINESS_MATCHER_SNAPSHOT_PHARMACISTS")]
    pub crm_pharmacists: Option<PathBuf>,
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(flatten)]
    pub crm: CrmArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LabArgs {
    /// FINESS establishments extract (env: FINESS_MATCHER_FINESS_ESTABLISHMENTS)
    #[arg(long = "finess-establishments", env = "FINESS_MATCHER_FINESS_ESTABLISHMENTS")]
    pub finess_establishments: PathBuf,
    /// FINESS legal entities extract (env: FINESS_MATCHER_FINESS_LEGAL_ENTITIES)
    #[arg(long = "finess-legal-entities", env = "FINESS_MATCHER_FINESS_LEGAL_ENTITIES")]
    pub finess_legal_entities: PathBuf,
    /// CRM laboratory export (env: FINESS_MATCHER_SNAPSHOT_LABS)
    #[arg(long = "crm-labs", env = "FINESS_MATCHER_SNAPSHOT_LABS")]
    pub crm_labs: PathBuf,
    /// CRM SELAS export (env: FINESS_MATCHER_SNAPSHOT_SELAS)
    #[arg(long = "crm-selas", env = "FINESS_MATCHER_SNAPSHOT_SELAS")]
    pub crm_selas: PathBuf,
    /// Lab directory sheet to refresh (env: FINESS_MATCHER_LAB_DIRECTORY)
    #[arg(long = "lab-directory", env = "FINESS_MATCHER_LAB_DIRECTORY")]
    pub lab_directory: Option<PathBuf>,
    #[command(flatten)]
    pub output: OutputArgs,
    #[command(flatten)]
    pub crm: CrmArgs,
}

#[derive(Args, Debug, Clone)]
pub struct HealthCenterArgs {
    /// FINESS establishments extract (env: FINESS_MATCHER_FINESS_ESTABLISHMENTS)
    #[arg(long = "finess-establishments", env = "FINESS_MATCHER_FINESS_ESTABLISHMENTS")]
    pub finess_establishments: PathBuf,
    /// CRM health-center export (env: FINESS_MATCHER_SNAPSHOT_HEALTH_CENTERS)
    #[arg(long = "crm-health-centers", env = "FINESS_MATCHER_SNAPSHOT_HEALTH_CENTERS")]
    pub crm_health_centers: Option<PathBuf>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FinessLabArgs {
    /// FINESS establishments extract (env: FINESS_MATCHER_FINESS_ESTABLISHMENTS)
    #[arg(long = "finess-establishments", env = "FINESS_MATCHER_FINESS_ESTABLISHMENTS")]
    pub finess_establishments: PathBuf,
    #[command(flatten)]
    pub output: OutputArgs,
}

/// The three files are CSV exports read with the snapshot delimiter.
#[derive(Args, Debug, Clone)]
pub struct SubstituteArgs {
    /// Substitutes sheet (env: FINESS_MATCHER_SUBSTITUTES_SHEET)
    #[arg(long = "sheet", env = "FINESS_MATCHER_SUBSTITUTES_SHEET")]
    pub sheet: PathBuf,
    /// Specialty agendas and practitioners (env: FINESS_MATCHER_PRACTITIONER_AGENDAS)
    #[arg(long = "agendas", env = "FINESS_MATCHER_PRACTITIONER_AGENDAS")]
    pub agendas: PathBuf,
    /// Substitutes from recurring events (env: FINESS_MATCHER_RECURRING_EVENTS)
    #[arg(long = "recurring-events", env = "FINESS_MATCHER_RECURRING_EVENTS")]
    pub recurring_events: PathBuf,
    #[command(flatten)]
    pub output: OutputArgs,
}

fn delimiter_byte(field: &'static str, c: char) -> Result<u8, ConfigError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| ConfigError::InvalidValue {
            field,
            reason: format!("{c:?} is not a single ASCII character"),
        })
}

impl OutputArgs {
    fn apply(&self, cfg: &mut AppConfig) -> Result<(), ConfigError> {
        cfg.export = ExportConfig {
            out_dir: self.out_dir.clone(),
            format: self.format.into(),
            delimiter: delimiter_byte("export.delimiter", self.delimiter)?,
        };
        cfg.snapshots.delimiter = delimiter_byte("snapshots.delimiter", self.snapshot_delimiter)?;
        Ok(())
    }
}

impl Command {
    /// Validated configuration of a reconciliation command; `None` for
    /// `env-template`.
    pub fn to_app_config(&self) -> Result<Option<AppConfig>, ConfigError> {
        let mut cfg = AppConfig::default();
        match self {
            Command::Pharmacies(a) => {
                cfg.input = InputConfig {
                    order_establishments: Some(a.order_establishments.clone()),
                    order_pharmacists: Some(a.order_pharmacists.clone()),
                    order_activities: Some(a.order_activities.clone()),
                    finess_establishments: Some(a.finess_establishments.clone()),
                    ..Default::default()
                };
                cfg.snapshots = SnapshotConfig {
                    pharmacies: a.crm_pharmacies.clone(),
                    pharmacists: a.crm_pharmacists.clone(),
                    ..Default::default()
                };
                cfg.crm = a.crm.to_crm_config();
                a.output.apply(&mut cfg)?;
            }
            Command::Labs(a) => {
                cfg.input = InputConfig {
                    finess_establishments: Some(a.finess_establishments.clone()),
                    finess_legal_entities: Some(a.finess_legal_entities.clone()),
                    lab_directory: a.lab_directory.clone(),
                    ..Default::default()
                };
                cfg.snapshots = SnapshotConfig {
                    labs: Some(a.crm_labs.clone()),
                    selas: Some(a.crm_selas.clone()),
                    ..Default::default()
                };
                cfg.crm = a.crm.to_crm_config();
                a.output.apply(&mut cfg)?;
            }
            Command::HealthCenters(a) => {
                cfg.input.finess_establishments = Some(a.finess_establishments.clone());
                cfg.snapshots.health_centers = a.crm_health_centers.clone();
                a.output.apply(&mut cfg)?;
            }
            Command::FinessLabs(a) => {
                cfg.input.finess_establishments = Some(a.finess_establishments.clone());
                a.output.apply(&mut cfg)?;
            }
            Command::Substitutes(a) => {
                cfg.input.substitutes_sheet = Some(a.sheet.clone());
                cfg.input.practitioner_agendas = Some(a.agendas.clone());
                cfg.input.recurring_events = Some(a.recurring_events.clone());
                a.output.apply(&mut cfg)?;
            }
            Command::EnvTemplate { .. } => return Ok(None),
        }
        cfg.validate()?;
        Ok(Some(cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pharmacies_command_builds_config() {
        let cli = Cli::try_parse_from([
            "finess_matcher",
            "pharmacies",
            "--order-establishments",
            "e.csv",
            "--order-pharmacists",
            "p.csv",
            "--order-activities",
            "a.csv",
            "--finess-establishments",
            "f.csv",
            "--crm-pharmacies",
            "crm.csv",
            "--format",
            "both",
            "--delimiter",
            ";",
            "--out-dir",
            "runs/today",
        ])
        .unwrap();
        let cfg = cli.command.to_app_config().unwrap().unwrap();
        assert_eq!(cfg.export.format, ExportFormat::Both);
        assert_eq!(cfg.export.delimiter, b';');
        assert_eq!(cfg.export.out_dir, PathBuf::from("runs/today"));
        assert_eq!(cfg.snapshots.pharmacies, Some(PathBuf::from("crm.csv")));
        assert!(cfg.snapshots.pharmacists.is_none());
        assert_eq!(cfg.crm.country_code, "FR");
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let cli = Cli::try_parse_from([
            "finess_matcher",
            "health-centers",
            "--finess-establishments",
            "f.csv",
            "--delimiter",
            "§",
        ])
        .unwrap();
        assert!(matches!(
            cli.command.to_app_config(),
            Err(ConfigError::InvalidValue {
                field: "export.delimiter",
                ..
            })
        ));
    }

    #[test]
    fn substitutes_command_reads_three_exports() {
        let cli = Cli::try_parse_from([
            "finess_matcher",
            "substitutes",
            "--sheet",
            "rak.csv",
            "--agendas",
            "specs.csv",
            "--recurring-events",
            "events.csv",
            "--snapshot-delimiter",
            ";",
        ])
        .unwrap();
        let cfg = cli.command.to_app_config().unwrap().unwrap();
        assert_eq!(cfg.input.substitutes_sheet, Some(PathBuf::from("rak.csv")));
        assert_eq!(cfg.input.recurring_events, Some(PathBuf::from("events.csv")));
        assert_eq!(cfg.snapshots.delimiter, b';');
    }

    #[test]
    fn env_template_needs_no_config() {
        let cli = Cli::try_parse_from(["finess_matcher", "env-template"]).unwrap();
        assert!(cli.command.to_app_config().unwrap().is_none());
    }
}

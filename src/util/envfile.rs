use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parse `KEY=value` lines. Blank lines and `#` comments are skipped,
/// surrounding quotes are stripped, malformed lines are logged and ignored.
pub fn parse_env(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (idx, line) in content.lines().enumerate() {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((key, val)) = s.split_once('=') else {
            log::warn!("ignoring .env line {} without '=': {}", idx + 1, line);
            continue;
        };
        let val = val.trim();
        let unquoted = if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            &val[1..val.len() - 1]
        } else {
            val
        };
        map.insert(key.trim().to_string(), unquoted.to_string());
    }
    map
}

/// Read `path` if it exists; an absent file yields an empty map.
pub fn parse_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_env(&content))
}

/// Load `.env` from the working directory into the process environment.
/// Variables already set are never overridden.
pub fn load_dotenv_if_present() -> Result<usize> {
    let map = parse_env_file(Path::new(".env"))?;
    let mut loaded = 0;
    for (k, v) in map {
        if std::env::var_os(&k).is_none() {
            // SAFETY: called from main before any other thread is spawned.
            unsafe {
                std::env::set_var(&k, &v);
            }
            loaded += 1;
        }
    }
    if loaded > 0 {
        log::debug!("loaded {} variable(s) from .env", loaded);
    }
    Ok(loaded)
}

const TEMPLATE: &str = r#"# finess_matcher environment configuration template
# Copy this file to .env and fill in the paths you need.
# Any of these variables can also be provided via the system environment.

# Registries
FINESS_MATCHER_ORDER_ESTABLISHMENTS=data/order/etablissements.csv
FINESS_MATCHER_ORDER_PHARMACISTS=data/order/pharmaciens.csv
FINESS_MATCHER_ORDER_ACTIVITIES=data/order/activites.csv
FINESS_MATCHER_FINESS_ESTABLISHMENTS=data/finess/etalab_cs1100507_stock.csv
FINESS_MATCHER_FINESS_LEGAL_ENTITIES=data/finess/etalab_cs1100501_stock.csv
#FINESS_MATCHER_LAB_DIRECTORY=data/lab_directory.csv

# Practitioner substitutes
#FINESS_MATCHER_SUBSTITUTES_SHEET=data/substitutes/rak.csv
#FINESS_MATCHER_PRACTITIONER_AGENDAS=crm/specialty_agendas.csv
#FINESS_MATCHER_RECURRING_EVENTS=crm/recurring_substitutes.csv

# CRM exports
#FINESS_MATCHER_SNAPSHOT_PHARMACIES=crm/pharmacies.csv
#FINESS_MATCHER_SNAPSHOT_PHARMACISTS=crm/pharmacists.csv
#FINESS_MATCHER_SNAPSHOT_LABS=crm/labs.csv
#FINESS_MATCHER_SNAPSHOT_SELAS=crm/selas.csv
#FINESS_MATCHER_SNAPSHOT_HEALTH_CENTERS=crm/health_centers.csv
#FINESS_MATCHER_SNAPSHOT_DELIMITER=,

# Output
FINESS_MATCHER_OUT_DIR=out
#FINESS_MATCHER_FORMAT=csv
#FINESS_MATCHER_DELIMITER=,

# CRM identifiers
#FINESS_MATCHER_ACCOUNT_RECORD_TYPE=0121i000000kJpkAAE
#FINESS_MATCHER_SELAS_RECORD_TYPE=0121i000000kJplAAE
#FINESS_MATCHER_PHARMACIST_SPECIALTY=a0h1i000000niyxAAA
#FINESS_MATCHER_COUNTRY_CODE=FR

# Logging
#RUST_LOG=info
#FINESS_MATCHER_TRACING=1
"#;

/// Write a commented `.env.template`.
pub fn write_env_template(path: &Path) -> Result<()> {
    fs::write(path, TEMPLATE).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

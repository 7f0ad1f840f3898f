use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed delimited text in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{path} is not valid {encoding} text")]
    Encoding { path: String, encoding: &'static str },
    #[error("registry table '{table}' lacks expected column(s): {}", missing.join(", "))]
    Schema { table: String, missing: Vec<String> },
}

/// Fatal reconciliation errors. Everything else degrades to smaller outputs.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("source table '{table}' is missing or empty; refusing to match against zero rows")]
    MissingSourceTable { table: String },
    #[error("snapshot '{snapshot}' lacks expected column(s): {}", missing.join(", "))]
    SnapshotSchema {
        snapshot: String,
        missing: Vec<String>,
    },
    #[error("match pass '{pass}' needs column '{column}' which table '{table}' does not have")]
    MissingColumn {
        pass: String,
        table: String,
        column: String,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv export error: {0}")]
    Csv(String),
    #[error("xlsx export error: {0}")]
    Xlsx(String),
}

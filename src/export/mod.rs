//! Export adapter: CRM import templates and the CSV / XLSX writers.
//!
//! The reconciliation core only produces [`Table`]s. Turning them into the
//! column layout a CRM import expects is the job of an [`ExportTemplate`].

pub mod csv_export;
pub mod templates;
pub mod xlsx_export;

use crate::models::{Record, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Column mapping from a core table to an import template.
///
/// Output columns are the `columns` targets in order, followed by the
/// `constants`. A source column the table does not carry yields empty cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTemplate {
    pub name: String,
    pub columns: Vec<(String, String)>,
    pub constants: Vec<(String, String)>,
}

impl ExportTemplate {
    pub fn new(name: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
            constants: Vec::new(),
        }
    }

    /// Same column under the same name.
    pub fn passthrough(name: impl Into<String>, columns: &[&str]) -> Self {
        let pairs: Vec<(&str, &str)> = columns.iter().map(|c| (*c, *c)).collect();
        Self::new(name, &pairs)
    }

    pub fn with_constant(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.constants.push((column.into(), value.into()));
        self
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|(_, t)| t.as_str())
            .chain(self.constants.iter().map(|(c, _)| c.as_str()))
            .collect()
    }

    /// Rename and reorder `table`, then drop exact duplicate rows.
    pub fn apply(&self, table: &Table) -> Table {
        let missing: Vec<&str> = self
            .columns
            .iter()
            .map(|(s, _)| s.as_str())
            .filter(|s| !table.has_column(s))
            .collect();
        if !missing.is_empty() {
            log::warn!(
                "Template '{}': table '{}' has no column(s) {}; exported empty",
                self.name,
                table.name(),
                missing.join(", ")
            );
        }
        table
            .map_rows(self.headers(), |r| {
                let mut out = Record::from_pairs(
                    self.columns
                        .iter()
                        .map(|(s, t)| (t.as_str(), r.get_or_empty(s))),
                );
                for (c, v) in &self.constants {
                    out.set(c.as_str(), v.as_str());
                }
                out
            })
            .distinct()
            .renamed(self.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
    Both,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Both => "both",
        }
    }

    pub fn writes_csv(&self) -> bool {
        matches!(self, Self::Csv | Self::Both)
    }

    pub fn writes_xlsx(&self) -> bool {
        matches!(self, Self::Xlsx | Self::Both)
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            "both" => Ok(Self::Both),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

/// Write every table of a run under `out_dir`: one CSV file per table and/or
/// one workbook named `{workbook}.xlsx` with a sheet per table. Returns the
/// written paths.
pub fn write_tables(
    out_dir: &Path,
    workbook: &str,
    tables: &[Table],
    format: ExportFormat,
    delimiter: u8,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if format.writes_csv() {
        for t in tables {
            let path = out_dir.join(format!("{}.csv", t.name()));
            csv_export::write_table_csv(&path, t, delimiter)?;
            written.push(path);
        }
    }
    if format.writes_xlsx() {
        let path = out_dir.join(format!("{workbook}.xlsx"));
        xlsx_export::write_tables_xlsx(&path, tables)?;
        written.push(path);
    }
    log::info!(
        "Exported {} table(s) as {} to {}",
        tables.len(),
        format,
        out_dir.display()
    );
    Ok(written)
}

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};

use crate::models::Table;
use crate::orchestrator::summary::RunSummary;

/// Excel caps sheet names at 31 characters.
const SHEET_NAME_MAX: usize = 31;

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn header_format() -> Format {
    Format::new().set_bold().set_align(FormatAlign::Center)
}

fn row_format_even() -> Format {
    Format::new().set_background_color(Color::RGB(0xF2F2F2))
}

/// Sheet name for `name`, unique among `used`.
fn sheet_name(name: &str, used: &mut Vec<String>) -> String {
    let base: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(SHEET_NAME_MAX)
        .collect();
    let mut candidate = base.clone();
    let mut n = 2;
    while used.iter().any(|u| u.eq_ignore_ascii_case(&candidate)) {
        let suffix = format!("_{n}");
        let keep = SHEET_NAME_MAX.saturating_sub(suffix.len());
        candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
        n += 1;
    }
    used.push(candidate.clone());
    candidate
}

fn write_table_sheet(ws: &mut Worksheet, table: &Table) -> Result<()> {
    let hfmt = header_format();
    for (col, name) in table.columns().iter().enumerate() {
        ws.write_string_with_format(0, col as u16, name, &hfmt)?;
    }
    let even = row_format_even();
    for (i, r) in table.rows().iter().enumerate() {
        let row = (i as u32) + 1;
        if i % 2 == 0 {
            ws.set_row_format(row, &even)?;
        }
        for (col, name) in table.columns().iter().enumerate() {
            ws.write_string(row, col as u16, r.get_or_empty(name))?;
        }
    }
    Ok(())
}

/// One workbook, one sheet per table, in the given order.
pub fn write_tables_xlsx(path: &Path, tables: &[Table]) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut workbook = Workbook::new();
    let mut used = Vec::new();
    for t in tables {
        let ws = workbook.add_worksheet();
        ws.set_name(sheet_name(t.name(), &mut used))?;
        write_table_sheet(ws, t)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("saving {}", path.display()))?;
    Ok(())
}

pub fn export_summary_xlsx(path: &Path, summary: &RunSummary) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("Summary")?;

    let hfmt = header_format();
    ws.write_string_with_format(0, 0, "Key", &hfmt)?;
    ws.write_string_with_format(0, 1, "Value", &hfmt)?;
    for (i, (k, v)) in summary.key_values().iter().enumerate() {
        let row = (i as u32) + 1;
        ws.write_string(row, 0, k)?;
        ws.write_string(row, 1, v)?;
    }
    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    #[test]
    fn sheet_names_are_truncated_and_unique() {
        let mut used = Vec::new();
        let a = sheet_name("new_activities_to_create_pac_and_more", &mut used);
        let b = sheet_name("new_activities_to_create_pac_and_more", &mut used);
        assert_eq!(a.chars().count(), 31);
        assert!(b.ends_with("_2"));
        assert_eq!(b.chars().count(), 31);
        assert_ne!(a, b);
        assert_eq!(sheet_name("a/b", &mut used), "a_b");
    }

    #[test]
    fn write_xlsx_basic() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run.xlsx");
        let t = Table::from_records(
            "labs_to_create",
            vec!["finessnumber__c", "account name"],
            vec![Record::from_pairs([
                ("finessnumber__c", "130000002"),
                ("account name", "LABO BETA"),
            ])],
        );
        let empty = Table::new("labs_hierarchy_update", vec!["id", "parent_id"]);
        write_tables_xlsx(&out, &[t, empty]).unwrap();
        let meta = std::fs::metadata(&out).unwrap();
        assert!(meta.len() > 0);
    }
}

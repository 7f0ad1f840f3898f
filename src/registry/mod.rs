//! Registry and snapshot ingestion.
//!
//! Every file is read as raw text: no cell is ever coerced to a number, so
//! identifiers such as postal codes, SIRET or FINESS numbers keep their
//! leading zeros.

pub mod finess;
pub mod order;

use crate::error::LoadError;
use crate::models::{Record, Table};
use crate::normalize::{clean_numeric_artifact, normalize_header};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;

const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Decode file bytes. UTF-16LE is taken when the UTF-16LE byte-order mark is
/// present or when the bytes look like BOM-less UTF-16LE text; anything else
/// is UTF-8 (BOM optional).
pub fn decode_text(bytes: &[u8], path: &str) -> Result<String, LoadError> {
    if let Some(body) = bytes.strip_prefix(&UTF16LE_BOM) {
        return decode_utf16le(body, path);
    }
    if looks_like_utf16le(bytes) {
        return decode_utf16le(bytes, path);
    }
    let body = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    String::from_utf8(body.to_vec()).map_err(|_| LoadError::Encoding {
        path: path.to_string(),
        encoding: "UTF-8",
    })
}

fn decode_utf16le(body: &[u8], path: &str) -> Result<String, LoadError> {
    if body.len() % 2 != 0 {
        return Err(LoadError::Encoding {
            path: path.to_string(),
            encoding: "UTF-16LE",
        });
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| LoadError::Encoding {
        path: path.to_string(),
        encoding: "UTF-16LE",
    })
}

/// Registry text is mostly Latin-1 range, so BOM-less UTF-16LE shows a NUL
/// in most odd positions and almost none in even ones. UTF-8 text never
/// carries NULs.
fn looks_like_utf16le(bytes: &[u8]) -> bool {
    const SAMPLE: usize = 4096;
    let sample = &bytes[..bytes.len().min(SAMPLE) & !1];
    if sample.len() < 4 {
        return false;
    }
    let pairs = sample.len() / 2;
    let (mut even_nul, mut odd_nul) = (0usize, 0usize);
    for pair in sample.chunks_exact(2) {
        if pair[0] == 0 {
            even_nul += 1;
        }
        if pair[1] == 0 {
            odd_nul += 1;
        }
    }
    odd_nul * 2 > pairs && even_nul * 10 < pairs
}

/// Split delimited text into raw records. Ragged rows are accepted.
pub fn parse_records(text: &str, delimiter: u8) -> Result<Vec<StringRecord>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    rdr.records().collect()
}

pub fn read_records(path: &Path, delimiter: u8) -> Result<Vec<StringRecord>, LoadError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: display.clone(),
        source,
    })?;
    let text = decode_text(&bytes, &display)?;
    parse_records(&text, delimiter).map_err(|source| LoadError::Csv {
        path: display,
        source,
    })
}

/// Build a table whose first record is the header row.
pub fn records_to_table(name: &str, records: Vec<StringRecord>) -> Table {
    let mut it = records.into_iter();
    let Some(header) = it.next() else {
        return Table::new(name, Vec::<String>::new());
    };
    let columns: Vec<String> = header.iter().map(normalize_header).collect();
    let rows = it
        .map(|rec| {
            Record::from_pairs(
                columns
                    .iter()
                    .zip(rec.iter())
                    .map(|(c, v)| (c.clone(), v.to_string())),
            )
        })
        .collect();
    Table::from_records(name, columns, rows)
}

/// Name the cells of a headerless record by position. Extra cells are
/// dropped; missing trailing cells stay absent.
pub fn positional_record(names: &[&str], rec: &StringRecord) -> Record {
    Record::from_pairs(names.iter().zip(rec.iter()).map(|(n, v)| (*n, v)))
}

/// Read a headed delimited file into a table.
pub fn read_table(path: &Path, name: &str, delimiter: u8) -> Result<Table, LoadError> {
    let records = read_records(path, delimiter)?;
    let table = records_to_table(name, records);
    log::info!(
        "Loaded {} rows ({} columns) from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    Ok(table)
}

/// Read a CRM snapshot export. Identifier cells may have been through a
/// spreadsheet tool, so `id_columns` get their numeric artifacts stripped.
pub fn read_snapshot(
    path: &Path,
    name: &str,
    delimiter: u8,
    id_columns: &[&str],
) -> Result<Table, LoadError> {
    let table = read_table(path, name, delimiter)?;
    Ok(clean_identifier_columns(&table, id_columns))
}

pub fn clean_identifier_columns(table: &Table, id_columns: &[&str]) -> Table {
    table.map_rows(table.columns().to_vec(), |r| {
        let mut out = r.clone();
        for c in id_columns {
            if let Some(v) = r.get(c) {
                out.set(*c, clean_numeric_artifact(Some(v)));
            }
        }
        out
    })
}

/// Fail with `LoadError::Schema` when `table` lacks any of `required`.
pub fn require_columns(table: &Table, required: &[&str]) -> Result<(), LoadError> {
    let missing = table.missing_columns(required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(LoadError::Schema {
            table: table.name().to_string(),
            missing,
        })
    }
}

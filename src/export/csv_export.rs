use crate::models::Table;
use crate::orchestrator::summary::RunSummary;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

fn create_buffered(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::with_capacity(512 * 1024, file))
}

/// Write `table` with its declared column order as header.
pub fn write_table_csv(path: &Path, table: &Table, delimiter: u8) -> Result<()> {
    let mut w = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(create_buffered(path)?);
    w.write_record(table.columns())?;
    for r in table.rows() {
        w.write_record(table.columns().iter().map(|c| r.get_or_empty(c)))?;
    }
    w.flush()?;
    log::debug!("{}: {} rows -> {}", table.name(), table.len(), path.display());
    Ok(())
}

pub fn export_summary_csv(path: &Path, summary: &RunSummary) -> Result<()> {
    let mut w = WriterBuilder::new().from_writer(create_buffered(path)?);
    w.write_record(["Key", "Value"])?;

    let mut write_kv = |k: &str, v: String| -> Result<()> {
        w.write_record([k, v.as_str()])?;
        Ok(())
    };

    write_kv("Run", summary.run.clone())?;
    write_kv("Started (UTC)", summary.started_display())?;
    write_kv("Ended (UTC)", summary.ended_display())?;
    write_kv("Duration", summary.duration_display())?;
    write_kv("Input rows per second", summary.throughput().to_string())?;
    write_kv("Process memory start (MB)", summary.rss_start_mb.to_string())?;
    write_kv("Process memory end (MB)", summary.rss_end_mb.to_string())?;
    write_kv("Memory available end (MB)", summary.available_end_mb.to_string())?;

    for (name, rows) in &summary.inputs {
        write_kv(&format!("Input rows ({name})"), rows.to_string())?;
    }
    for p in &summary.passes {
        write_kv(&format!("Pass {} matches", p.label), p.matched_pairs.to_string())?;
        write_kv(&format!("Pass {} remainder A", p.label), p.remainder_a.to_string())?;
        write_kv(&format!("Pass {} remainder B", p.label), p.remainder_b.to_string())?;
    }
    for (name, value) in &summary.counters {
        write_kv(name, value.to_string())?;
    }
    for (name, rows) in &summary.outputs {
        write_kv(&format!("Output rows ({name})"), rows.to_string())?;
    }

    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    #[test]
    fn table_is_written_in_column_order_with_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.csv");
        let t = Table::from_records(
            "t",
            vec!["b", "a"],
            vec![
                Record::from_pairs([("a", "1"), ("b", "x;y")]),
                Record::from_pairs([("a", "2")]),
            ],
        );
        write_table_csv(&path, &t, b';').unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "b;a\n\"x;y\";1\n;2\n");
    }

    #[test]
    fn summary_is_key_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let mut s = RunSummary::start("labs");
        s.input("finess_labs", 12);
        s.counter("Labs to create", 3);
        s.finish();
        export_summary_csv(&path, &s).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Key,Value\nRun,labs\n"));
        assert!(text.contains("Input rows (finess_labs),12\n"));
        assert!(text.contains("Labs to create,3\n"));
    }
}

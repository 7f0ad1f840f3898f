//! Run summary: what was read, how each match pass did, what was produced.

use crate::metrics::{rows_per_sec, sample};
use crate::models::{Linkage, PassOutcome, Table};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run: String,
    pub started_utc: DateTime<Utc>,
    pub ended_utc: DateTime<Utc>,
    /// Resident memory of the process, in MiB.
    pub rss_start_mb: u64,
    pub rss_end_mb: u64,
    pub available_end_mb: u64,
    /// Input table name and row count, in load order.
    pub inputs: Vec<(String, usize)>,
    pub passes: Vec<PassOutcome>,
    pub counters: Vec<(String, usize)>,
    pub outputs: Vec<(String, usize)>,
}

impl RunSummary {
    pub fn start(run: &str) -> Self {
        let now = Utc::now();
        Self {
            run: run.to_string(),
            started_utc: now,
            ended_utc: now,
            rss_start_mb: sample().rss_mb,
            rss_end_mb: 0,
            available_end_mb: 0,
            inputs: Vec::new(),
            passes: Vec::new(),
            counters: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(&mut self, name: &str, rows: usize) {
        self.inputs.push((name.to_string(), rows));
    }

    pub fn table_input(&mut self, table: &Table) {
        self.input(table.name(), table.len());
    }

    pub fn linkage(&mut self, linkage: &Linkage) {
        self.passes = linkage.passes.clone();
        self.counter("Linked pairs", linkage.len());
    }

    pub fn counter(&mut self, name: &str, value: usize) {
        self.counters.push((name.to_string(), value));
    }

    pub fn outputs(&mut self, tables: &[Table]) {
        self.outputs = tables
            .iter()
            .map(|t| (t.name().to_string(), t.len()))
            .collect();
    }

    pub fn finish(&mut self) {
        self.ended_utc = Utc::now();
        let end = sample();
        self.rss_end_mb = end.rss_mb;
        self.available_end_mb = end.available_mb;
    }

    pub fn duration_secs(&self) -> f64 {
        (self.ended_utc - self.started_utc).num_milliseconds() as f64 / 1000.0
    }

    pub fn input_rows(&self) -> usize {
        self.inputs.iter().map(|(_, rows)| rows).sum()
    }

    pub fn throughput(&self) -> u64 {
        rows_per_sec(self.input_rows(), self.duration_secs())
    }

    pub fn started_display(&self) -> String {
        self.started_utc.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn ended_display(&self) -> String {
        self.ended_utc.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// HH:MM:SS; hours may exceed 23.
    pub fn duration_display(&self) -> String {
        let total = self.duration_secs().max(0.0).floor() as u64;
        format!(
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }

    /// Flat view shared by the summary sheet.
    pub fn key_values(&self) -> Vec<(String, String)> {
        let mut kv = vec![
            ("Run".to_string(), self.run.clone()),
            ("Started (UTC)".to_string(), self.started_display()),
            ("Ended (UTC)".to_string(), self.ended_display()),
            ("Duration".to_string(), self.duration_display()),
            ("Input rows per second".to_string(), self.throughput().to_string()),
            ("Process memory start (MB)".to_string(), self.rss_start_mb.to_string()),
            ("Process memory end (MB)".to_string(), self.rss_end_mb.to_string()),
        ];
        kv.extend(
            self.inputs
                .iter()
                .map(|(n, c)| (format!("Input rows ({n})"), c.to_string())),
        );
        kv.extend(
            self.passes
                .iter()
                .map(|p| (format!("Pass {} matches", p.label), p.matched_pairs.to_string())),
        );
        kv.extend(self.counters.iter().map(|(n, c)| (n.clone(), c.to_string())));
        kv.extend(
            self.outputs
                .iter()
                .map(|(n, c)| (format!("Output rows ({n})"), c.to_string())),
        );
        kv
    }

    pub fn write_summary(&self, path: &Path) -> std::io::Result<()> {
        let mut f = std::fs::File::create(path)?;

        writeln!(f, "Reconciliation Summary: {}", self.run)?;
        writeln!(f, "==========================================")?;
        writeln!(f, "Started: {} UTC", self.started_display())?;
        writeln!(f, "Ended:   {} UTC", self.ended_display())?;
        writeln!(f, "Duration: {}", self.duration_display())?;
        writeln!(
            f,
            "Process memory: {} MB -> {} MB ({} MB still available)",
            self.rss_start_mb, self.rss_end_mb, self.available_end_mb
        )?;
        writeln!(
            f,
            "Input rows: {} ({} rows/s)\n",
            self.input_rows(),
            self.throughput()
        )?;

        writeln!(f, "{:<40} {:>12}", "Input", "Rows")?;
        writeln!(f, "{}", "-".repeat(53))?;
        for (name, rows) in &self.inputs {
            writeln!(f, "{:<40} {:>12}", name, rows)?;
        }

        if !self.passes.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{:<6} {:<36} {:>10} {:>14} {:>14}",
                "Pass", "Condition", "Matches", "Remainder A", "Remainder B"
            )?;
            writeln!(f, "{}", "-".repeat(84))?;
            for (i, p) in self.passes.iter().enumerate() {
                writeln!(
                    f,
                    "P{:<5} {:<36} {:>10} {:>14} {:>14}",
                    i + 1,
                    p.label,
                    p.matched_pairs,
                    p.remainder_a,
                    p.remainder_b
                )?;
            }
            writeln!(f, "{}", "-".repeat(84))?;
        }

        if !self.counters.is_empty() {
            writeln!(f)?;
            for (name, value) in &self.counters {
                writeln!(f, "{:<40} {:>12}", name, value)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "{:<40} {:>12}", "Output", "Rows")?;
        writeln!(f, "{}", "-".repeat(53))?;
        for (name, rows) in &self.outputs {
            writeln!(f, "{:<40} {:>12}", name, rows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_summary_lists_passes_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        let mut s = RunSummary::start("pharmacies");
        s.passes = vec![PassOutcome {
            label: "address+name+phone+postal".into(),
            matched_pairs: 7,
            remainder_a: 3,
            remainder_b: 40,
        }];
        s.outputs(&[Table::new("new_pharma_ba", vec!["external_id"])]);
        s.finish();
        s.write_summary(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("address+name+phone+postal"));
        assert!(text.contains("new_pharma_ba"));
    }

    #[test]
    fn throughput_counts_every_input() {
        let mut s = RunSummary::start("labs");
        s.input("finess_labs", 300);
        s.input("crm_labs", 100);
        s.ended_utc = s.started_utc + chrono::Duration::seconds(2);
        assert_eq!(s.input_rows(), 400);
        assert_eq!(s.throughput(), 200);
        assert!(s.key_values().contains(&("Input rows per second".to_string(), "200".to_string())));
    }

    #[test]
    fn duration_is_clock_formatted() {
        let mut s = RunSummary::start("x");
        s.ended_utc = s.started_utc + chrono::Duration::seconds(3725);
        assert_eq!(s.duration_display(), "01:02:05");
    }
}

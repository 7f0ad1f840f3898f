use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One registry or snapshot row. Every value is text; an absent field and an
/// empty cell both read back as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn get_or_empty(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.fields.remove(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A named, column-ordered table of records. Helpers never mutate `self`;
/// each returns a new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: Vec<S>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_records<S: Into<String>>(
        name: impl Into<String>,
        columns: Vec<S>,
        rows: Vec<Record>,
    ) -> Self {
        let mut t = Self::new(name, columns);
        t.rows = rows;
        t
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Columns from `required` that this table does not declare.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect()
    }

    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    /// Append a column name if not already declared.
    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Table {
        Table {
            name: name.into(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
        }
    }

    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Record) -> bool,
    {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Rebuild every row through `f`; `columns` becomes the new column order.
    pub fn map_rows<S, F>(&self, columns: Vec<S>, f: F) -> Table
    where
        S: Into<String>,
        F: FnMut(&Record) -> Record,
    {
        Table::from_records(
            self.name.clone(),
            columns,
            self.rows.iter().map(f).collect(),
        )
    }

    /// Keep only `columns`, in that order. Unknown columns are declared and
    /// stay empty.
    pub fn select(&self, columns: &[&str]) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                Record::from_pairs(
                    columns
                        .iter()
                        .map(|c| (c.to_string(), r.get_or_empty(c).to_string())),
                )
            })
            .collect();
        Table::from_records(self.name.clone(), columns.to_vec(), rows)
    }

    /// Rename columns (`from` → `to`); unmentioned columns are untouched.
    pub fn rename_columns(&self, renames: &[(&str, &str)]) -> Table {
        let lookup = |c: &str| -> String {
            renames
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| c.to_string())
        };
        let columns: Vec<String> = self.columns.iter().map(|c| lookup(c)).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| Record::from_pairs(r.fields().map(|(k, v)| (lookup(k), v.to_string()))))
            .collect();
        Table::from_records(self.name.clone(), columns, rows)
    }

    /// Drop exact duplicate rows, keeping first occurrences in order.
    pub fn distinct(&self) -> Table {
        let mut seen: HashSet<&Record> = HashSet::new();
        let rows = self
            .rows
            .iter()
            .filter(|r| seen.insert(*r))
            .cloned()
            .collect();
        Table::from_records(self.name.clone(), self.columns.clone(), rows)
    }

    /// Non-missing values of `column`.
    pub fn key_set(&self, column: &str) -> HashSet<String> {
        self.rows
            .iter()
            .filter_map(|r| r.get(column))
            .map(str::to_string)
            .collect()
    }

    /// Append the rows of `other`, extending the column list as needed.
    pub fn concat(&self, other: &Table) -> Table {
        let mut out = self.clone();
        for c in &other.columns {
            out.add_column(c.clone());
        }
        out.rows.extend(other.rows.iter().cloned());
        out
    }
}

/// One side-A key linked to one side-B key by a given match pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedPair {
    pub a_key: String,
    pub b_key: String,
    /// Zero-based position of the pass that produced the link.
    pub pass_index: usize,
    pub pass_label: String,
}

/// Per-pass diagnostics of a cascade run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub label: String,
    pub matched_pairs: usize,
    pub remainder_a: usize,
    pub remainder_b: usize,
}

/// Output of a cascading match: deduplicated linked pairs in pass order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Linkage {
    pub pairs: Vec<LinkedPair>,
    pub passes: Vec<PassOutcome>,
}

impl Linkage {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn matched_a(&self) -> HashSet<&str> {
        self.pairs.iter().map(|p| p.a_key.as_str()).collect()
    }

    pub fn matched_b(&self) -> HashSet<&str> {
        self.pairs.iter().map(|p| p.b_key.as_str()).collect()
    }

    /// Keys that occur in more than one pair on either side. A non-empty
    /// result means a pass produced a one-to-many join.
    pub fn ambiguous_keys(&self) -> (Vec<String>, Vec<String>) {
        fn repeated<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<String> {
            let mut seen = HashSet::new();
            let mut dup = Vec::new();
            for k in keys {
                if !seen.insert(k) && !dup.iter().any(|d: &String| d == k) {
                    dup.push(k.to_string());
                }
            }
            dup
        }
        (
            repeated(self.pairs.iter().map(|p| p.a_key.as_str())),
            repeated(self.pairs.iter().map(|p| p.b_key.as_str())),
        )
    }

    pub fn to_table(&self, a_column: &str, b_column: &str) -> Table {
        let rows = self
            .pairs
            .iter()
            .map(|p| {
                Record::from_pairs([
                    (a_column, p.a_key.as_str()),
                    (b_column, p.b_key.as_str()),
                    ("match_pass", p.pass_label.as_str()),
                ])
            })
            .collect();
        Table::from_records("linkage", vec![a_column, b_column, "match_pass"], rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaStatus {
    Unchanged,
    New,
    NeedsUpdate,
}

impl std::fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "UNCHANGED"),
            Self::New => write!(f, "NEW"),
            Self::NeedsUpdate => write!(f, "NEEDS_UPDATE"),
        }
    }
}

/// Current-state rows split by their status against a CRM snapshot. Rows
/// that could not be classified are only counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classified {
    pub new: Table,
    pub unchanged: Table,
    pub needs_update: Table,
    pub excluded: usize,
}

impl Classified {
    pub fn bucket(&self, status: DeltaStatus) -> &Table {
        match status {
            DeltaStatus::New => &self.new,
            DeltaStatus::Unchanged => &self.unchanged,
            DeltaStatus::NeedsUpdate => &self.needs_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Table {
        Table::from_records(
            "people",
            vec!["id", "name"],
            vec![
                Record::from_pairs([("id", "1"), ("name", "ALPHA")]),
                Record::from_pairs([("id", "2"), ("name", "")]),
                Record::from_pairs([("id", "1"), ("name", "ALPHA")]),
            ],
        )
    }

    #[test]
    fn empty_cell_reads_as_missing() {
        let t = people();
        assert_eq!(t.rows()[1].get("name"), None);
        assert_eq!(t.rows()[1].get_or_empty("name"), "");
        assert_eq!(t.rows()[0].get("unknown"), None);
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let t = people().distinct();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[0].get("id"), Some("1"));
    }

    #[test]
    fn rename_and_select_preserve_values() {
        let t = people().rename_columns(&[("name", "label")]);
        assert!(t.has_column("label"));
        assert!(!t.has_column("name"));
        assert_eq!(t.rows()[0].get("label"), Some("ALPHA"));
        let s = t.select(&["label", "extra"]);
        assert_eq!(s.columns(), &["label".to_string(), "extra".to_string()]);
        assert_eq!(s.rows()[0].get("extra"), None);
    }

    #[test]
    fn key_set_skips_missing_values() {
        let keys = people().key_set("name");
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("ALPHA"));
    }

    #[test]
    fn ambiguous_keys_reports_repeats() {
        let pair = |a: &str, b: &str| LinkedPair {
            a_key: a.into(),
            b_key: b.into(),
            pass_index: 0,
            pass_label: "p1".into(),
        };
        let l = Linkage {
            pairs: vec![pair("A1", "B1"), pair("A1", "B2"), pair("A2", "B3")],
            passes: vec![],
        };
        let (a, b) = l.ambiguous_keys();
        assert_eq!(a, vec!["A1".to_string()]);
        assert!(b.is_empty());
    }
}

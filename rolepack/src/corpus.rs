//! Ordered question/answer corpus and its source readers.
//!
//! A [`CorpusStore`] is append-only: records can be added, but never edited,
//! removed, or reordered, so a record's position is stable for the store's
//! lifetime. Sources are read from `.json` (an array of records), `.jsonl`
//! (one record per line), or `.csv` (a header row naming `question` and
//! `answer`; other columns are ignored).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RolePackError, Result};
use crate::record::QaRecord;

/// An ordered, position-addressed sequence of [`QaRecord`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CorpusStore {
    records: Vec<QaRecord>,
}

impl CorpusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning the position it now occupies.
    pub fn push(&mut self, record: QaRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record at `position`, if any.
    pub fn get(&self, position: usize) -> Option<&QaRecord> {
        self.records.get(position)
    }

    /// Iterate over records in position order.
    pub fn iter(&self) -> std::slice::Iter<'_, QaRecord> {
        self.records.iter()
    }

    /// Borrow the records as a slice.
    pub fn records(&self) -> &[QaRecord] {
        &self.records
    }

    /// Read a corpus source, choosing the format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns [`RolePackError::SourceReadError`] if the file is missing,
    /// unreadable, of an unknown format, or fails to parse.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension =
            path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);

        let store = match extension.as_deref() {
            Some("json") => {
                let content =
                    fs::read_to_string(path).map_err(|e| RolePackError::source_read(path, e))?;
                Self::from_json_str(&content).map_err(|e| RolePackError::source_read(path, e))?
            }
            Some("jsonl") => {
                let content =
                    fs::read_to_string(path).map_err(|e| RolePackError::source_read(path, e))?;
                Self::from_jsonl_str(&content).map_err(|e| RolePackError::source_read(path, e))?
            }
            Some("csv") => {
                let file = fs::File::open(path).map_err(|e| RolePackError::source_read(path, e))?;
                Self::from_csv_reader(file).map_err(|e| RolePackError::source_read(path, e))?
            }
            _ => {
                return Err(RolePackError::source_read(
                    path,
                    "unsupported corpus format (expected .json, .jsonl or .csv)",
                ));
            }
        };

        debug!(path = %path.display(), records = store.len(), "read corpus source");
        Ok(store)
    }

    /// Parse a JSON array of `{question, answer}` objects.
    pub fn from_json_str(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Parse newline-delimited `{question, answer}` objects. Blank lines are skipped.
    pub fn from_jsonl_str(content: &str) -> std::result::Result<Self, String> {
        let mut store = Self::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: QaRecord = serde_json::from_str(line)
                .map_err(|e| format!("line {}: {e}", line_no + 1))?;
            store.push(record);
        }
        Ok(store)
    }

    /// Parse CSV with a header row naming `question` and `answer` columns.
    pub fn from_csv_reader(reader: impl std::io::Read) -> std::result::Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut store = Self::new();
        for row in csv_reader.deserialize::<QaRecord>() {
            store.push(row?);
        }
        Ok(store)
    }

    /// Serialize the store as the pretty-printed JSON corpus member.
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl From<Vec<QaRecord>> for CorpusStore {
    fn from(records: Vec<QaRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<QaRecord> for CorpusStore {
    fn from_iter<I: IntoIterator<Item = QaRecord>>(iter: I) -> Self {
        Self { records: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a CorpusStore {
    type Item = &'a QaRecord;
    type IntoIter = std::slice::Iter<'a, QaRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

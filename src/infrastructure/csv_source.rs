//! Lazy reader for the `;`-delimited perfume export
//!
//! Yields one header→value map per data row. Values are trimmed, invalid
//! UTF-8 bytes are dropped rather than failing the file, and short rows are
//! tolerated (missing columns are simply absent from the map).

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::domain::catalog::columns;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Cannot open input file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input file {path:?} has no header row")]
    MissingHeader { path: PathBuf },

    #[error("Failed to read record at row {row}: {source}")]
    Record {
        row: usize,
        #[source]
        source: csv::Error,
    },
}

impl SourceError {
    /// Data row the error belongs to, when it belongs to one
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::Record { row, .. } if *row > 0 => Some(*row),
            _ => None,
        }
    }
}

/// One data row; `row_number` is 1-based and counts every data row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub row_number: usize,
    pub fields: HashMap<String, String>,
}

impl SourceRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Perfume name for log context, empty when absent
    pub fn name(&self) -> &str {
        self.get(columns::NAME).unwrap_or_default()
    }

    fn has_key_field(&self) -> bool {
        let present = |c| self.get(c).is_some_and(|v| !v.is_empty());
        present(columns::NAME) || present(columns::BRAND)
    }
}

fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\u{FFFD}', "")
}

/// Iterator over the rows of one input file
pub struct CsvSource {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    record: csv::ByteRecord,
    rows_read: usize,
    rejected: usize,
}

impl CsvSource {
    /// Open `path` and read its header row
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| SourceError::Open { path: path.clone(), source })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header_record = reader
            .byte_headers()
            .map_err(|e| SourceError::Record { row: 0, source: e })?
            .clone();
        let headers: Vec<String> = header_record
            .iter()
            .map(|h| decode_lossy(h).trim_start_matches('\u{FEFF}').trim().to_string())
            .collect();

        if headers.iter().all(String::is_empty) {
            return Err(SourceError::MissingHeader { path });
        }

        debug!("Opened {:?} with columns {:?}", path, headers);
        Ok(Self { path, reader, headers, record: csv::ByteRecord::new(), rows_read: 0, rejected: 0 })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows dropped because both name and brand were missing
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    fn to_row(&self) -> SourceRow {
        let fields = self
            .headers
            .iter()
            .zip(self.record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.clone(), decode_lossy(value).trim().to_string()))
            .collect();
        SourceRow { row_number: self.rows_read, fields }
    }
}

impl Iterator for CsvSource {
    type Item = Result<SourceRow, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) => {
                    self.rows_read += 1;
                    let row = self.to_row();
                    if row.has_key_field() {
                        return Some(Ok(row));
                    }
                    self.rejected += 1;
                    debug!("Skipping row {}: no name and no brand", row.row_number);
                }
                Err(source) => {
                    self.rows_read += 1;
                    return Some(Err(SourceError::Record { row: self.rows_read, source }));
                }
            }
        }
    }
}

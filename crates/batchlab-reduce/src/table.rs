//! Delimiter-separated numeric tables.
//!
//! Empty cells read as NaN and NaN is written back as an empty cell, so a
//! value missing from one input survives a read/write cycle unchanged.

use std::fs;
use std::path::Path;

use batchlab_core::{io_error, BatchError, ErrorInfo};
use csv::{ReaderBuilder, WriterBuilder};

/// Header row plus numeric rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Table {
    /// Empty table with the given header.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in file order.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<f64>) {
        row.resize(self.columns.len(), f64::NAN);
        self.rows.push(row);
    }

    /// Position of `name` in the header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of column `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    /// Reads a table with a header row.
    pub fn read(path: &Path, delimiter: u8) -> Result<Self, BatchError> {
        let bytes = fs::read(path).map_err(|err| io_error("reduce.read", path, err))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(bytes.as_slice());
        let columns: Vec<String> = reader
            .headers()
            .map_err(|err| wrap_csv("reduce.header", path, err))?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        let mut table = Table::new(columns);
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|err| wrap_csv("reduce.record", path, err))?;
            let mut values = Vec::with_capacity(record.len());
            for (index, cell) in record.iter().enumerate() {
                values.push(parse_cell(cell).ok_or_else(|| {
                    BatchError::Serde(
                        ErrorInfo::new("reduce.cell", "non-numeric cell")
                            .with_context("file", path.display().to_string())
                            .with_context("row", row.to_string())
                            .with_context(
                                "column",
                                table.columns.get(index).cloned().unwrap_or_else(|| index.to_string()),
                            )
                            .with_hint(format!("found `{cell}`")),
                    )
                })?);
            }
            table.rows.push(values);
        }
        Ok(table)
    }

    /// Writes the table atomically to `path`.
    pub fn write(&self, path: &Path, delimiter: u8) -> Result<(), BatchError> {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().copied().map(format_cell).collect::<Vec<_>>());
        write_records(path, &self.columns, rows, delimiter)
    }
}

/// Single-byte field delimiter for `delimiter`.
pub fn delimiter_byte(delimiter: char) -> Result<u8, BatchError> {
    u8::try_from(delimiter)
        .ok()
        .filter(|byte| byte.is_ascii() && *byte != b'"' && *byte != b'\n')
        .ok_or_else(|| {
            BatchError::Config(
                ErrorInfo::new("reduce.delimiter", "delimiter must be one ASCII byte")
                    .with_context("delimiter", delimiter.to_string()),
            )
        })
}

/// Writes text records under `header`, replacing `path` atomically.
pub(crate) fn write_records<I>(path: &Path, header: &[String], rows: I, delimiter: u8) -> Result<(), BatchError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|err| wrap_csv("reduce.write_header", path, err))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|err| wrap_csv("reduce.write_row", path, err))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| io_error("reduce.flush", path, err.error()))?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BatchError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| io_error("reduce.dir", parent, err))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = parent.join(format!(".{name}.tmp"));
    fs::write(&staging, bytes).map_err(|err| io_error("reduce.write", &staging, err))?;
    fs::rename(&staging, path).map_err(|err| io_error("reduce.commit", path, err))
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    cell.parse().ok()
}

/// Shortest text that parses back to `value`; NaN is empty.
pub(crate) fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn wrap_csv(code: &str, path: &Path, err: csv::Error) -> BatchError {
    BatchError::Serde(
        ErrorInfo::new(code, "table read/write failure")
            .with_context("file", path.display().to_string())
            .with_hint(err.to_string()),
    )
}

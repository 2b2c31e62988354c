//! Raw tables and validated prep/sales records

use crate::error::Result;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// One cell of an uploaded table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    /// Build a cell from raw text; blank strings become `Empty`
    pub fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::from_text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// Rectangular table as uploaded: a header row plus data rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    /// Build a table from string slices, mostly for tests and demos
    pub fn from_strings(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| Cell::from_text(c)).collect())
                .collect(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Position of a header, case-sensitive, ignoring surrounding whitespace
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Data loader for uploaded tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a table from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Load a table from any CSV source with a header row.
    ///
    /// Ragged rows are kept as-is; the validator reports them.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<RawTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(Cell::from_text).collect());
        }

        tracing::debug!(rows = rows.len(), "Loaded CSV table");
        Ok(RawTable { headers, rows })
    }

    /// Convert a polars DataFrame into a raw table.
    ///
    /// Numeric columns keep their numbers, everything else is rendered as
    /// text; nulls become empty cells.
    pub fn from_dataframe(df: &DataFrame) -> Result<RawTable> {
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut columns: Vec<Vec<Cell>> = Vec::with_capacity(headers.len());
        for series in df.get_columns() {
            let cells = if series.dtype().is_numeric() {
                let casted = series.cast(&DataType::Float64)?;
                casted
                    .f64()?
                    .into_iter()
                    .map(|value| value.map(Cell::Number).unwrap_or(Cell::Empty))
                    .collect()
            } else {
                let casted = series.cast(&DataType::Utf8)?;
                casted
                    .utf8()?
                    .into_iter()
                    .map(|value| value.map(Cell::from_text).unwrap_or(Cell::Empty))
                    .collect()
            };
            columns.push(cells);
        }

        let rows = (0..df.height())
            .map(|row| columns.iter().map(|col| col[row].clone()).collect())
            .collect();

        Ok(RawTable { headers, rows })
    }
}

/// One validated prep/sales observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub item: String,
    pub date: NaiveDate,
    pub quantity_prepped: f64,
    pub quantity_sold: f64,
    pub weather: Option<String>,
    pub menu_type: Option<String>,
    pub event: Option<String>,
    /// Zero-based data-row index in the uploaded table
    pub source_row: usize,
}

impl Record {
    pub fn new(item: &str, date: NaiveDate, quantity_prepped: f64, quantity_sold: f64) -> Self {
        Self {
            item: item.to_string(),
            date,
            quantity_prepped,
            quantity_sold,
            weather: None,
            menu_type: None,
            event: None,
            source_row: 0,
        }
    }

    pub fn with_weather(mut self, weather: &str) -> Self {
        self.weather = Some(weather.to_string());
        self
    }

    /// `(prepped - sold) / prepped`, undefined when nothing was prepped
    pub fn waste_ratio(&self) -> Option<f64> {
        prep_math::waste_ratio(self.quantity_prepped, self.quantity_sold)
    }

    /// Sold more than was prepped; kept but flagged
    pub fn oversold(&self) -> bool {
        self.quantity_sold > self.quantity_prepped
    }
}

/// Immutable, cheaply clonable sequence of validated records.
///
/// Stages share a dataset by cloning the handle; nothing mutates it after
/// construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Arc<Vec<Record>>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct item names, sorted
    pub fn items(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.item.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct dates, ascending
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Records whose date falls within `[start, end]`
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .collect()
    }

    /// True when both handles point at the same published records
    pub fn shares_records_with(&self, other: &Dataset) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }
}

impl From<Vec<Record>> for Dataset {
    fn from(records: Vec<Record>) -> Self {
        Dataset::new(records)
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

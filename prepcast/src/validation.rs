//! Schema validation of uploaded tables
//!
//! Validation is a pure function of the table. Missing required columns are
//! blocking and stop validation before any row is read. Rows that fail type
//! coercion are dropped and reported, and the remaining rows form the
//! dataset.

use crate::data::{Cell, Dataset, RawTable, Record};
use crate::error::{RowError, SchemaError};
use crate::utils::parse_date;
use serde::Serialize;

pub const COLUMN_ITEM: &str = "Item";
pub const COLUMN_QTY_PREPPED: &str = "Qty Prepped";
pub const COLUMN_QTY_SOLD: &str = "Qty Sold";
pub const COLUMN_DATE: &str = "Date";
pub const COLUMN_WEATHER: &str = "WeatherOpt";

/// Optional columns feeding the menu-type and event features
pub const COLUMN_MENU_TYPE: &str = "MenuType";
pub const COLUMN_EVENT: &str = "Event";

/// Required headers in contract order
pub const REQUIRED_COLUMNS: [&str; 5] = [
    COLUMN_ITEM,
    COLUMN_QTY_PREPPED,
    COLUMN_QTY_SOLD,
    COLUMN_DATE,
    COLUMN_WEATHER,
];

/// Outcome of validating one uploaded table
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    dataset: Dataset,
    column_errors: Vec<SchemaError>,
    row_errors: Vec<RowError>,
}

impl ValidationResult {
    /// Usable by downstream stages: no column errors and at least one row
    pub fn is_valid(&self) -> bool {
        self.column_errors.is_empty() && !self.dataset.is_empty()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn column_errors(&self) -> &[SchemaError] {
        &self.column_errors
    }

    pub fn row_errors(&self) -> &[RowError] {
        &self.row_errors
    }

    /// Condensed counts for logs and the presentation layer
    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            valid: self.is_valid(),
            usable_rows: self.dataset.len(),
            rejected_rows: self.row_errors.len(),
            oversold_rows: self.dataset.iter().filter(|r| r.oversold()).count(),
            column_errors: self.column_errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Serializable overview of a validation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub valid: bool,
    pub usable_rows: usize,
    pub rejected_rows: usize,
    pub oversold_rows: usize,
    pub column_errors: Vec<String>,
}

struct ColumnMap {
    item: usize,
    prepped: usize,
    sold: usize,
    date: usize,
    weather: usize,
    menu_type: Option<usize>,
    event: Option<usize>,
}

/// Validate a raw table against the column contract and coerce its rows
pub fn validate(table: &RawTable) -> ValidationResult {
    let missing: Vec<SchemaError> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| table.column_index(name).is_none())
        .map(|name| SchemaError::MissingColumn(name.to_string()))
        .collect();

    if !missing.is_empty() {
        tracing::warn!(missing = missing.len(), "Upload is missing required columns");
        return ValidationResult {
            column_errors: missing,
            ..ValidationResult::default()
        };
    }

    let columns = match resolve_columns(table) {
        Some(columns) => columns,
        None => return ValidationResult::default(),
    };

    let width = table.headers().len();
    let mut records = Vec::with_capacity(table.len());
    let mut row_errors = Vec::new();

    for (row_index, row) in table.rows().iter().enumerate() {
        if row.len() != width {
            row_errors.push(RowError::new(
                row_index,
                format!("expected {} cells, found {}", width, row.len()),
            ));
            continue;
        }
        match coerce_row(row_index, row, &columns) {
            Ok(record) => records.push(record),
            Err(err) => row_errors.push(err),
        }
    }

    let dataset = Dataset::new(records);
    let column_errors = if dataset.is_empty() {
        vec![SchemaError::EmptyDataset]
    } else {
        Vec::new()
    };

    tracing::info!(
        usable = dataset.len(),
        rejected = row_errors.len(),
        "Validated upload"
    );

    ValidationResult {
        dataset,
        column_errors,
        row_errors,
    }
}

fn resolve_columns(table: &RawTable) -> Option<ColumnMap> {
    Some(ColumnMap {
        item: table.column_index(COLUMN_ITEM)?,
        prepped: table.column_index(COLUMN_QTY_PREPPED)?,
        sold: table.column_index(COLUMN_QTY_SOLD)?,
        date: table.column_index(COLUMN_DATE)?,
        weather: table.column_index(COLUMN_WEATHER)?,
        menu_type: table.column_index(COLUMN_MENU_TYPE),
        event: table.column_index(COLUMN_EVENT),
    })
}

fn coerce_row(row_index: usize, row: &[Cell], columns: &ColumnMap) -> Result<Record, RowError> {
    let item = match &row[columns.item] {
        Cell::Text(text) if !text.trim().is_empty() => text.trim().to_string(),
        Cell::Number(value) => value.to_string(),
        _ => return Err(RowError::new(row_index, "Item is empty")),
    };

    let quantity_prepped = coerce_quantity(&row[columns.prepped], COLUMN_QTY_PREPPED)
        .map_err(|reason| RowError::new(row_index, reason))?;
    let quantity_sold = coerce_quantity(&row[columns.sold], COLUMN_QTY_SOLD)
        .map_err(|reason| RowError::new(row_index, reason))?;

    let date = match &row[columns.date] {
        Cell::Text(text) => parse_date(text)
            .ok_or_else(|| RowError::new(row_index, format!("Date '{}' is not a date", text)))?,
        Cell::Number(value) => {
            return Err(RowError::new(
                row_index,
                format!("Date '{}' is not a date", value),
            ))
        }
        Cell::Empty => return Err(RowError::new(row_index, "Date is empty")),
    };

    Ok(Record {
        item,
        date,
        quantity_prepped,
        quantity_sold,
        weather: optional_text(&row[columns.weather]),
        menu_type: columns.menu_type.and_then(|idx| optional_text(&row[idx])),
        event: columns.event.and_then(|idx| optional_text(&row[idx])),
        source_row: row_index,
    })
}

fn coerce_quantity(cell: &Cell, column: &str) -> Result<f64, String> {
    let value = match cell {
        Cell::Number(value) => *value,
        Cell::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("{} '{}' is not a number", column, text))?,
        Cell::Empty => return Err(format!("{} is empty", column)),
    };

    if !value.is_finite() {
        return Err(format!("{} must be finite", column));
    }
    if value < 0.0 {
        return Err(format!("{} must be non-negative, got {}", column, value));
    }
    Ok(value)
}

fn optional_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Cell::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

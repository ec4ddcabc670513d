//! Record Table ingestion
//!
//! A sheet arrives as a JSON 2-D array: row 0 is the header, every following
//! row is a positional tuple of cells. This module owns cell coercion and the
//! row normalizer that turns positional rows into typed records.

use serde_json::{Number, Value};
use std::io::Read;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("expected a JSON array of rows")]
    NotAnArray,
    #[error("expected at least one row")]
    Empty,
}

// ============================================================================
// Record Table
// ============================================================================

/// Raw sheet contents. Rows are kept as JSON values because the upstream
/// scripts occasionally emit `null` or scalars where a row should be.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    rows: Vec<Value>,
}

impl RecordTable {
    /// Validate a payload as a table: it must be a non-empty array.
    pub fn from_value(value: Value) -> Result<Self, TableError> {
        match value {
            Value::Array(rows) if rows.is_empty() => Err(TableError::Empty),
            Value::Array(rows) => Ok(Self { rows }),
            _ => Err(TableError::NotAnArray),
        }
    }

    pub fn from_rows(rows: Vec<Value>) -> Result<Self, TableError> {
        Self::from_value(Value::Array(rows))
    }

    /// Load a CSV export of a sheet. The first record is the header row.
    pub fn from_csv<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let cells: Vec<Value> = record.iter().map(csv_cell).collect();
            rows.push(Value::Array(cells));
        }

        Ok(Self::from_rows(rows)?)
    }

    pub fn header(&self) -> Option<&[Value]> {
        self.rows.first().and_then(|row| row.as_array()).map(Vec::as_slice)
    }

    /// Every row after the header, including malformed ones.
    pub fn data_rows(&self) -> impl Iterator<Item = &Value> {
        self.rows.iter().skip(1)
    }

    /// Number of data rows (header excluded).
    pub fn len(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_value(self) -> Value {
        Value::Array(self.rows)
    }
}

fn csv_cell(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(field.to_string())
}

// ============================================================================
// Cell coercion
// ============================================================================

/// Whether a cell counts as "present". Empty strings, zero, `false` and
/// `null` are all treated as a missing value by the sheets.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Render a cell the way the sheet displays it. `None` renders as
/// `"undefined"` so that string comparisons against a missing cell never match
/// real data.
pub fn display(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => format_number(n),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Trimmed text of a cell; falsy or missing cells become `""`.
pub fn text(row: &[Value], index: usize) -> String {
    match row.get(index) {
        Some(value) if is_truthy(value) => display(Some(value)).trim().to_string(),
        _ => String::new(),
    }
}

/// Leading integer of a cell (`"12 pers"` is 12, `3.7` is 3), otherwise 0.
pub fn integer(row: &[Value], index: usize) -> i64 {
    parse_int_prefix(&display(row.get(index))).unwrap_or(0)
}

/// Non-negative count cell.
pub fn count(row: &[Value], index: usize) -> u64 {
    integer(row, index).max(0) as u64
}

/// Leading decimal of a cell's text (`"7.5h"` is 7.5), otherwise 0.
pub fn decimal(row: &[Value], index: usize) -> f64 {
    parse_float_prefix(&text(row, index)).unwrap_or(0.0)
}

/// The cell as-is, `Null` when the row is too short.
pub fn raw(row: &[Value], index: usize) -> Value {
    row.get(index).cloned().unwrap_or(Value::Null)
}

pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digit_count = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digit_count += frac_end - frac_start;
        if digit_count > 0 {
            end = frac_end;
        }
    }
    if digit_count == 0 {
        return None;
    }

    // Exponent only counts when digits follow it.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-') | Some(b'+')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

// ============================================================================
// Row Normalizer
// ============================================================================

/// A typed record read from a fixed column layout.
pub trait SheetRecord: Sized {
    /// Source name used in logs.
    const SOURCE: &'static str;
    /// Rows narrower than this are dropped before `from_row` is called.
    const MIN_WIDTH: usize = 1;

    /// Read the record, or `None` when required key fields are missing.
    fn from_row(row: &[Value]) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    /// Rows dropped for being non-arrays, empty, too narrow or missing keys.
    pub skipped: usize,
}

pub fn normalize<T: SheetRecord>(table: &RecordTable) -> Normalized<T> {
    let mut records = Vec::with_capacity(table.len());
    let mut skipped = 0;

    for row in table.data_rows() {
        let cells = match row.as_array() {
            Some(cells) if !cells.is_empty() && cells.len() >= T::MIN_WIDTH => cells,
            _ => {
                skipped += 1;
                continue;
            }
        };
        match T::from_row(cells) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(source = T::SOURCE, kept = records.len(), skipped, "Dropped malformed rows");
    }

    Normalized { records, skipped }
}

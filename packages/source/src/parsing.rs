//! Shared cell and grid parsing for workbook sources.
//!
//! Both the CSV and the Google Sheets backends end up with a grid of cells
//! whose first row is the header. [`records_from_grid`] turns that grid into
//! header-keyed [`Row`]s the way a spreadsheet "get all records" call does.

use cadastre_map_cadastre_models::Row;
use serde_json::Value;

/// Converts a text cell into a JSON value, turning numeric-looking text into
/// numbers.
///
/// Blank cells become `""`. Text with a leading zero followed by more digits
/// (`"007"`) stays text so identifiers keep their padding.
#[must_use]
pub fn numericise(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() || has_padding_zero(trimmed) {
        return Value::String(trimmed.to_string());
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(float)
    {
        return Value::Number(number);
    }
    Value::String(trimmed.to_string())
}

fn has_padding_zero(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut chars = digits.chars();
    chars.next() == Some('0') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Builds header-keyed rows from a grid whose first row is the header.
///
/// Headers are trimmed and blank headers are skipped. Rows shorter than the
/// header are padded with `""`; extra trailing cells are ignored. Rows whose
/// cells are all blank are dropped.
#[must_use]
pub fn records_from_grid(grid: Vec<Vec<Value>>) -> Vec<Row> {
    let mut rows = grid.into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };

    let headers: Vec<Option<String>> = header
        .iter()
        .map(|cell| match cell {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect();

    rows.filter(|cells| cells.iter().any(|cell| !is_blank(cell)))
        .map(|cells| {
            let mut cells = cells.into_iter();
            let mut row = Row::new();
            for header in &headers {
                let cell = cells.next().unwrap_or_else(|| Value::String(String::new()));
                if let Some(header) = header {
                    row.insert(header.clone(), cell);
                }
            }
            row
        })
        .collect()
}

fn is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

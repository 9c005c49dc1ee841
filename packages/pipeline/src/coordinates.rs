//! Coordinate extraction and numeric normalization.
//!
//! Sheets either carry dedicated latitude/longitude columns or a single
//! `"lat, lon"` text column. [`extract_coordinates`] splits the latter into
//! the former, and [`normalize_numeric`] coerces both columns to numbers and
//! drops every row that cannot be placed on a map.

use cadastre_map_cadastre_models::{ColumnMap, Row, RowTable, value_as_f64};
use serde_json::Value;

/// Parses a `"lat, lon"` string.
///
/// Returns `None` for malformed input (no comma, non-numeric parts, blank)
/// and for coordinates outside `[-90, 90]` × `[-180, 180]`. Parts after the
/// second comma are ignored.
#[must_use]
pub fn extract_lat_lon(raw: &str) -> Option<(f64, f64)> {
    let mut parts = raw.split(',');
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    let lon = parts.next()?.trim().parse::<f64>().ok()?;

    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
}

/// [`extract_lat_lon`] over a cell value. Non-string cells yield `None`.
#[must_use]
pub fn extract_lat_lon_value(value: &Value) -> Option<(f64, f64)> {
    value.as_str().and_then(extract_lat_lon)
}

/// Fills the latitude/longitude columns from a combined coordinate column.
///
/// Only applies when the table lacks either dedicated column and does carry
/// `raw_column`; otherwise the table is returned unchanged. Unparseable
/// cells become JSON `null`.
#[must_use]
pub fn extract_coordinates(mut table: RowTable, raw_column: &str, columns: &ColumnMap) -> RowTable {
    let has_dedicated = table.has_column(&columns.latitude) && table.has_column(&columns.longitude);
    if has_dedicated || !table.has_column(raw_column) {
        return table;
    }

    let mut unparsed = 0_usize;
    for row in &mut table.rows {
        let coords = row.get(raw_column).and_then(extract_lat_lon_value);
        if coords.is_none() {
            unparsed += 1;
        }
        let (lat, lon) = coords.map_or((Value::Null, Value::Null), |(lat, lon)| {
            (Value::from(lat), Value::from(lon))
        });
        row.insert(columns.latitude.clone(), lat);
        row.insert(columns.longitude.clone(), lon);
    }

    log::info!(
        "[{}] Extracted coordinates from '{raw_column}' ({unparsed} of {} unparseable)",
        table.name,
        table.len()
    );

    table
}

/// Coerces latitude/longitude to numbers and drops rows missing either.
///
/// Numeric strings are parsed, everything else becomes missing. The result
/// never has more rows than the input, and normalizing it again is a no-op.
#[must_use]
pub fn normalize_numeric(table: RowTable, columns: &ColumnMap) -> RowTable {
    let RowTable { name, rows } = table;
    let before = rows.len();

    let rows: Vec<Row> = rows
        .into_iter()
        .filter_map(|mut row| {
            let lat = row.get(&columns.latitude).and_then(value_as_f64)?;
            let lon = row.get(&columns.longitude).and_then(value_as_f64)?;
            row.insert(columns.latitude.clone(), Value::from(lat));
            row.insert(columns.longitude.clone(), Value::from(lon));
            Some(row)
        })
        .collect();

    let dropped = before - rows.len();
    if dropped > 0 {
        log::warn!("[{name}] Dropped {dropped} of {before} rows without valid coordinates");
    }

    RowTable { name, rows }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn table(rows: Value) -> RowTable {
        RowTable::new("lots", serde_json::from_value::<Vec<Row>>(rows).unwrap())
    }

    #[test]
    fn extracts_valid_pairs() {
        assert_eq!(extract_lat_lon("-3.2036, -52.2100"), Some((-3.2036, -52.21)));
        assert_eq!(extract_lat_lon("90,180"), Some((90.0, 180.0)));
        assert_eq!(extract_lat_lon("-90 , -180"), Some((-90.0, -180.0)));
        assert_eq!(extract_lat_lon("1.5, 2.5, 10"), Some((1.5, 2.5)));
    }

    #[test]
    fn rejects_malformed_strings() {
        assert_eq!(extract_lat_lon(""), None);
        assert_eq!(extract_lat_lon("-3.2036"), None);
        assert_eq!(extract_lat_lon("-3.2036 -52.21"), None);
        assert_eq!(extract_lat_lon("abc, def"), None);
        assert_eq!(extract_lat_lon("1.0,"), None);
        assert_eq!(extract_lat_lon_value(&Value::Null), None);
        assert_eq!(extract_lat_lon_value(&json!(12.5)), None);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(extract_lat_lon("95, 10"), None);
        assert_eq!(extract_lat_lon("10, 181"), None);
        assert_eq!(extract_lat_lon("-90.01, 0"), None);
        assert_eq!(extract_lat_lon("NaN, 0"), None);
    }

    #[test]
    fn fills_missing_columns_from_raw_column() {
        let columns = ColumnMap::default();
        let out = extract_coordinates(
            table(json!([
                {"lot_id": "L1", "latitude_longitude": "-3.2, -52.2"},
                {"lot_id": "L2", "latitude_longitude": "bad"},
            ])),
            "latitude_longitude",
            &columns,
        );
        assert_eq!(out.rows[0]["latitude"], json!(-3.2));
        assert_eq!(out.rows[0]["longitude"], json!(-52.2));
        assert_eq!(out.rows[1]["latitude"], Value::Null);
        assert_eq!(out.rows[0]["latitude_longitude"], json!("-3.2, -52.2"));
    }

    #[test]
    fn dedicated_columns_are_not_overwritten() {
        let columns = ColumnMap::default();
        let input = table(json!([
            {"latitude": 1.0, "longitude": 2.0, "latitude_longitude": "-3.2, -52.2"},
        ]));
        let out = extract_coordinates(input.clone(), "latitude_longitude", &columns);
        assert_eq!(out, input);
    }

    #[test]
    fn table_without_raw_column_is_unchanged() {
        let columns = ColumnMap::default();
        let input = table(json!([{"lot_id": "L1"}]));
        let out = extract_coordinates(input.clone(), "latitude_longitude", &columns);
        assert_eq!(out, input);
    }

    #[test]
    fn normalize_coerces_and_drops() {
        let columns = ColumnMap::default();
        let out = normalize_numeric(
            table(json!([
                {"lot_id": "L1", "latitude": "-3.2", "longitude": -52.2},
                {"lot_id": "L2", "latitude": "", "longitude": -52.2},
                {"lot_id": "L3", "latitude": null, "longitude": null},
                {"lot_id": "L4", "latitude": "x", "longitude": "1"},
                {"lot_id": "L5"},
            ])),
            &columns,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0]["lot_id"], json!("L1"));
        assert_eq!(out.rows[0]["latitude"], json!(-3.2));
    }

    #[test]
    fn normalize_never_leaves_missing_coordinates() {
        let columns = ColumnMap::default();
        let input = table(json!([
            {"latitude": 1, "longitude": 2},
            {"latitude": "1e1", "longitude": " 3 "},
            {"latitude": true, "longitude": 1},
            {"longitude": 1},
        ]));
        let before = input.len();
        let out = normalize_numeric(input, &columns);
        assert!(out.len() <= before);
        assert_eq!(out.len(), 2);
        for row in &out.rows {
            assert!(row["latitude"].is_number());
            assert!(row["longitude"].is_number());
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let columns = ColumnMap::default();
        let once = normalize_numeric(
            table(json!([
                {"latitude": "-3.2", "longitude": "-52.2", "uso": "Misto"},
                {"latitude": "n/a", "longitude": "-52.2"},
            ])),
            &columns,
        );
        let twice = normalize_numeric(once.clone(), &columns);
        assert_eq!(once, twice);
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cadastral record types shared across the cadastre map toolchain.
//!
//! Raw spreadsheet tabs arrive as [`RowTable`]s of loosely typed [`Row`]s.
//! After the data contract has been checked they are converted into
//! [`BlockRecord`] and [`LotRecord`] values through a [`ColumnMap`], and
//! blocks are finally enriched with [`BlockStats`] into [`EnrichedBlock`]s.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Sentinel used for the dominant use/typology of blocks without lots.
pub const NOT_AVAILABLE: &str = "N/A";

/// Columns added to every block by enrichment.
pub const DERIVED_FIELDS: [&str; 4] = [
    "total_lots",
    "dominant_use",
    "dominant_typology",
    "use_counts",
];

/// Appended to an input column whose name is taken by a derived field.
pub const COLLISION_SUFFIX: &str = "_x";

/// A single spreadsheet row: column header to cell value.
pub type Row = BTreeMap<String, Value>;

/// A named set of rows as fetched from one tab of the data source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowTable {
    /// Logical table name used in log and error messages (e.g. `"blocks"`).
    pub name: String,
    /// The rows, in source order.
    pub rows: Vec<Row>,
}

impl RowTable {
    /// Creates a table from fetched rows.
    #[must_use]
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Returns the column set of the table: the union of all row keys.
    #[must_use]
    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    /// Returns `true` if any row carries the given column.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|row| row.contains_key(column))
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Maps the logical fields of blocks and lots onto physical column headers.
///
/// Defaults match the canonical English headers. Sheets that use other
/// headers (e.g. `id_bloco`, `uso_lote`) override them in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    /// Block identifier column in the blocks tab.
    pub block_id: String,
    /// Latitude column (both tabs).
    pub latitude: String,
    /// Longitude column (both tabs).
    pub longitude: String,
    /// Lot identifier column in the lots tab.
    pub lot_id: String,
    /// Parent block identifier column in the lots tab.
    pub lot_block_id: String,
    /// Use-type column in the lots tab.
    pub use_type: String,
    /// Optional typology column in the lots tab.
    pub typology: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            block_id: "id".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            lot_id: "lot_id".to_string(),
            lot_block_id: "block_id".to_string(),
            use_type: "use_type".to_string(),
            typology: "typology".to_string(),
        }
    }
}

impl ColumnMap {
    /// Columns every blocks table must carry.
    #[must_use]
    pub fn required_block_columns(&self) -> [&str; 3] {
        [
            self.block_id.as_str(),
            self.latitude.as_str(),
            self.longitude.as_str(),
        ]
    }

    /// Columns every lots table must carry.
    #[must_use]
    pub fn required_lot_columns(&self) -> [&str; 3] {
        [
            self.lot_id.as_str(),
            self.lot_block_id.as_str(),
            self.use_type.as_str(),
        ]
    }
}

/// Renders a cell as trimmed text. Blank strings, nulls and nested values
/// yield `None`. Whole floats render without a fraction, so `12.0` and `12`
/// are the same key.
#[must_use]
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Coerces a cell to a finite `f64`. Numbers are taken as-is and strings
/// are parsed after trimming; anything else yields `None`.
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER => {
            format!("{f:.0}")
        }
        _ => n.to_string(),
    }
}

// 2^53: beyond this not every integer is representable as f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn optional_number(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn optional_text(value: Option<&String>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.clone()))
}

fn take_text(row: &mut Row, column: &str) -> Option<String> {
    row.remove(column).as_ref().and_then(value_as_text)
}

fn take_f64(row: &mut Row, column: &str) -> Option<f64> {
    row.remove(column).as_ref().and_then(value_as_f64)
}

/// Anything with an optional map position.
pub trait Located {
    /// Latitude (WGS84), if known.
    fn latitude(&self) -> Option<f64>;

    /// Longitude (WGS84), if known.
    fn longitude(&self) -> Option<f64>;

    /// Both coordinates, or `None` if either is missing.
    fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude()?, self.longitude()?))
    }
}

/// A city block as read from the blocks tab.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    /// Block identifier, the aggregation key.
    pub id: String,
    /// Representative latitude.
    pub latitude: Option<f64>,
    /// Representative longitude.
    pub longitude: Option<f64>,
    /// Every other column, carried through untouched.
    pub attributes: Row,
}

impl BlockRecord {
    /// Converts a validated row. A blank identifier becomes the empty string.
    #[must_use]
    pub fn from_row(mut row: Row, columns: &ColumnMap) -> Self {
        Self {
            id: take_text(&mut row, &columns.block_id).unwrap_or_default(),
            latitude: take_f64(&mut row, &columns.latitude),
            longitude: take_f64(&mut row, &columns.longitude),
            attributes: row,
        }
    }

    /// Converts every row of a validated blocks table.
    #[must_use]
    pub fn from_table(table: RowTable, columns: &ColumnMap) -> Vec<Self> {
        table
            .rows
            .into_iter()
            .map(|row| Self::from_row(row, columns))
            .collect()
    }

    /// Rebuilds the row under the physical column names of `columns`.
    #[must_use]
    pub fn to_row(&self, columns: &ColumnMap) -> Row {
        let mut row = self.attributes.clone();
        row.insert(columns.block_id.clone(), Value::String(self.id.clone()));
        row.insert(columns.latitude.clone(), optional_number(self.latitude));
        row.insert(columns.longitude.clone(), optional_number(self.longitude));
        row
    }
}

impl Located for BlockRecord {
    fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    fn longitude(&self) -> Option<f64> {
        self.longitude
    }
}

/// A cadastral lot as read from the lots tab.
#[derive(Debug, Clone, PartialEq)]
pub struct LotRecord {
    /// Lot identifier.
    pub lot_id: String,
    /// Parent block. `None` when the cell is blank.
    pub block_id: Option<String>,
    /// Use-type (open set: `Residencial`, `Misto`, ...). Blank cells become
    /// the empty string so every lot is counted once.
    pub use_type: String,
    /// Typology, when the sheet has the column and the cell is filled.
    pub typology: Option<String>,
    /// Latitude (WGS84), `None` when missing or not numeric.
    pub latitude: Option<f64>,
    /// Longitude (WGS84), `None` when missing or not numeric.
    pub longitude: Option<f64>,
    /// Address fields and every other column.
    pub attributes: Row,
}

impl LotRecord {
    /// Converts a validated row.
    #[must_use]
    pub fn from_row(mut row: Row, columns: &ColumnMap) -> Self {
        Self {
            lot_id: take_text(&mut row, &columns.lot_id).unwrap_or_default(),
            block_id: take_text(&mut row, &columns.lot_block_id),
            use_type: take_text(&mut row, &columns.use_type).unwrap_or_default(),
            typology: take_text(&mut row, &columns.typology),
            latitude: take_f64(&mut row, &columns.latitude),
            longitude: take_f64(&mut row, &columns.longitude),
            attributes: row,
        }
    }

    /// Rebuilds the row under the physical column names of `columns`. The
    /// typology column is only written when the source table had one.
    #[must_use]
    pub fn to_row(&self, columns: &ColumnMap, with_typology: bool) -> Row {
        let mut row = self.attributes.clone();
        row.insert(columns.lot_id.clone(), Value::String(self.lot_id.clone()));
        row.insert(
            columns.lot_block_id.clone(),
            optional_text(self.block_id.as_ref()),
        );
        row.insert(
            columns.use_type.clone(),
            Value::String(self.use_type.clone()),
        );
        if with_typology {
            row.insert(columns.typology.clone(), optional_text(self.typology.as_ref()));
        }
        row.insert(columns.latitude.clone(), optional_number(self.latitude));
        row.insert(columns.longitude.clone(), optional_number(self.longitude));
        row
    }
}

impl Located for LotRecord {
    fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    fn longitude(&self) -> Option<f64> {
        self.longitude
    }
}

/// Typed lots plus the table-level facts the aggregator needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LotTable {
    /// The lots, in source order.
    pub lots: Vec<LotRecord>,
    /// Whether the source table carries a typology column at all.
    pub has_typology: bool,
}

impl LotTable {
    /// Converts a validated lots table, recording typology presence once.
    #[must_use]
    pub fn from_table(table: RowTable, columns: &ColumnMap) -> Self {
        let has_typology = table.has_column(&columns.typology);
        let lots = table
            .rows
            .into_iter()
            .map(|row| LotRecord::from_row(row, columns))
            .collect();
        Self { lots, has_typology }
    }

    /// Number of lots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lots.len()
    }

    /// Returns `true` if there are no lots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

/// Per-block aggregates over the block's lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    /// Number of lots referencing the block.
    pub total_lots: u64,
    /// Most frequent use-type, or [`NOT_AVAILABLE`].
    pub dominant_use: String,
    /// Most frequent typology, or [`NOT_AVAILABLE`].
    pub dominant_typology: String,
    /// Lots per use-type. Only non-zero counts are present.
    pub use_counts: BTreeMap<String, u64>,
}

impl Default for BlockStats {
    /// Statistics of a block without lots.
    fn default() -> Self {
        Self {
            total_lots: 0,
            dominant_use: NOT_AVAILABLE.to_string(),
            dominant_typology: NOT_AVAILABLE.to_string(),
            use_counts: BTreeMap::new(),
        }
    }
}

/// A block with its lot statistics attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBlock {
    /// The block as loaded, minus any columns moved aside by [`Self::new`].
    pub block: BlockRecord,
    /// Derived statistics.
    pub stats: BlockStats,
}

impl EnrichedBlock {
    /// Attaches `stats` to `block`.
    ///
    /// Input columns named like one of the [`DERIVED_FIELDS`] are kept under
    /// their name plus [`COLLISION_SUFFIX`], repeated until the name is free.
    #[must_use]
    pub fn new(mut block: BlockRecord, stats: BlockStats) -> Self {
        for field in DERIVED_FIELDS {
            if let Some(value) = block.attributes.remove(field) {
                let mut renamed = format!("{field}{COLLISION_SUFFIX}");
                while block.attributes.contains_key(&renamed) {
                    renamed.push_str(COLLISION_SUFFIX);
                }
                log::debug!("Block {}: input column {field} kept as {renamed}", block.id);
                block.attributes.insert(renamed, value);
            }
        }
        Self { block, stats }
    }

    /// The block row under its physical column names followed by the
    /// derived fields.
    #[must_use]
    pub fn to_row(&self, columns: &ColumnMap) -> Row {
        let mut row = self.block.to_row(columns);
        let use_counts: Map<String, Value> = self
            .stats
            .use_counts
            .iter()
            .map(|(use_type, count)| (use_type.clone(), Value::from(*count)))
            .collect();
        row.insert("total_lots".to_string(), Value::from(self.stats.total_lots));
        row.insert(
            "dominant_use".to_string(),
            Value::String(self.stats.dominant_use.clone()),
        );
        row.insert(
            "dominant_typology".to_string(),
            Value::String(self.stats.dominant_typology.clone()),
        );
        row.insert("use_counts".to_string(), Value::Object(use_counts));
        row
    }
}

impl Located for EnrichedBlock {
    fn latitude(&self) -> Option<f64> {
        self.block.latitude
    }

    fn longitude(&self) -> Option<f64> {
        self.block.longitude
    }
}

//! Data contract checks.
//!
//! A table is processable only if it has rows and carries every required
//! column. Checks run before any other transformation so an invalid schema
//! never produces partial output.

use cadastre_map_cadastre_models::RowTable;

/// Errors raised when fetched data violates the data contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The table has no rows.
    #[error("The {table} table is empty")]
    EmptyTable {
        /// Logical table name.
        table: String,
    },

    /// One or more required columns are absent.
    #[error("The {table} table is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        /// Logical table name.
        table: String,
        /// Every missing column, in contract order.
        columns: Vec<String>,
    },
}

/// Checks that `table` is non-empty and has every column in `required`.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyTable`] if the table has no rows, or
/// [`ValidationError::MissingColumns`] naming every absent column.
pub fn validate(table: &RowTable, required: &[&str]) -> Result<(), ValidationError> {
    if table.is_empty() {
        return Err(ValidationError::EmptyTable {
            table: table.name.clone(),
        });
    }

    let columns = table.columns();
    let missing: Vec<String> = required
        .iter()
        .filter(|column| !columns.contains(**column))
        .map(|column| (*column).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingColumns {
            table: table.name.clone(),
            columns: missing,
        })
    }
}

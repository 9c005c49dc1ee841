//! CSV workbook source.
//!
//! Treats a directory of CSV exports as a workbook: each `.csv` file is one
//! tab. Tabs are looked up by file stem (`Bloco` → `Bloco.csv`) or by their
//! position in the file-name-sorted listing.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cadastre_map_cadastre_models::Row;
use serde_json::Value;

use crate::parsing::{numericise, records_from_grid};
use crate::{RowSource, SourceError, TabSelector};

/// A directory of CSV files, one per tab.
#[derive(Debug, Clone)]
pub struct CsvWorkbookSource {
    /// Directory holding the CSV files.
    dir: PathBuf,
    /// Field delimiter byte (defaults to `,`).
    delimiter: u8,
}

impl CsvWorkbookSource {
    /// Creates a comma-delimited workbook rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            delimiter: b',',
        }
    }

    /// Sets the field delimiter (e.g. `b';'` for spreadsheet exports in
    /// comma-decimal locales).
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Resolves a tab to a file path.
    async fn resolve(&self, tab: &TabSelector) -> Result<PathBuf, SourceError> {
        match tab {
            TabSelector::Name { name } => {
                let path = self.dir.join(format!("{name}.csv"));
                match tokio::fs::try_exists(&path).await {
                    Ok(true) => Ok(path),
                    Ok(false) => Err(SourceError::not_found(format!(
                        "tab '{name}' ({})",
                        path.display()
                    ))),
                    Err(e) => Err(classify_io(&path, e)),
                }
            }
            TabSelector::Index { index } => {
                let files = self.list_tabs().await?;
                files.into_iter().nth(*index).ok_or_else(|| {
                    SourceError::not_found(format!(
                        "tab index {index} in {}",
                        self.dir.display()
                    ))
                })
            }
        }
    }

    /// Lists the CSV files of the workbook sorted by file name.
    async fn list_tabs(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| classify_io(&self.dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| classify_io(&self.dir, e))?
        {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl RowSource for CsvWorkbookSource {
    fn describe(&self) -> String {
        format!("CSV workbook {}", self.dir.display())
    }

    async fn fetch(&self, tab: &TabSelector) -> Result<Vec<Row>, SourceError> {
        let path = self.resolve(tab).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| classify_io(&path, e))?;

        log::debug!("Read {} bytes from {}", bytes.len(), path.display());

        let rows = parse_csv(&bytes, self.delimiter).map_err(|e| {
            SourceError::connection(format!("failed to parse {}", path.display()), e)
        })?;

        log::info!("Parsed {} records from {}", rows.len(), path.display());

        Ok(rows)
    }
}

/// Parses CSV bytes into header-keyed rows with numeric-looking cells
/// converted to numbers.
///
/// # Errors
///
/// Returns [`csv::Error`] if the input is not valid CSV (e.g. invalid UTF-8).
pub fn parse_csv(bytes: &[u8], delimiter: u8) -> Result<Vec<Row>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid: Vec<Vec<Value>> = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let cells = if i == 0 {
            record
                .iter()
                .map(|h| Value::String(h.trim_start_matches('\u{feff}').trim().to_owned()))
                .collect()
        } else {
            record.iter().map(numericise).collect()
        };
        grid.push(cells);
    }

    Ok(records_from_grid(grid))
}

fn classify_io(path: &Path, e: io::Error) -> SourceError {
    match e.kind() {
        io::ErrorKind::NotFound => SourceError::not_found(path.display().to_string()),
        io::ErrorKind::PermissionDenied => {
            SourceError::permission(format!("cannot read {}", path.display()), e)
        }
        _ => SourceError::connection(format!("failed to read {}", path.display()), e),
    }
}

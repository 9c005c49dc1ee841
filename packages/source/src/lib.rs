#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Row sources for cadastral spreadsheets.
//!
//! A [`RowSource`] knows how to fetch the rows of one tab of a workbook,
//! keyed by column header. Implementations exist for a directory of CSV
//! exports ([`csv_workbook`]) and for the Google Sheets API
//! ([`google_sheets`]). Failures are classified into the
//! [`SourceError`] taxonomy so callers can tell connectivity problems from
//! permission problems and missing tabs.

pub mod csv_workbook;
pub mod google_sheets;
pub mod parsing;

use std::fmt;

use async_trait::async_trait;
use cadastre_map_cadastre_models::Row;
use serde::{Deserialize, Serialize};

/// Boxed underlying error kept for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while reading a workbook.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The data source could not be reached or read.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of what went wrong.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The data source was reached but access was denied.
    #[error("Permission denied: {message}")]
    Permission {
        /// Description of what went wrong.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The workbook or tab does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },
}

impl SourceError {
    /// Builds a [`SourceError::Connection`] wrapping `source`.
    pub fn connection(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Builds a [`SourceError::Permission`] wrapping `source`.
    pub fn permission(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Permission {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Builds a [`SourceError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

/// Selects one tab of a workbook.
///
/// Deserializes from `{ name = "Bloco" }` or `{ index = 0 }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TabSelector {
    /// Tab with the given title.
    Name {
        /// Tab title.
        name: String,
    },
    /// Tab at the given zero-based position.
    Index {
        /// Tab position.
        index: usize,
    },
}

impl TabSelector {
    /// Selects a tab by title.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name { name: name.into() }
    }

    /// Selects a tab by position.
    #[must_use]
    pub const fn index(index: usize) -> Self {
        Self::Index { index }
    }
}

impl fmt::Display for TabSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { name } => write!(f, "tab '{name}'"),
            Self::Index { index } => write!(f, "tab #{index}"),
        }
    }
}

/// Trait that all workbook backends implement.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Returns a human-readable description of the workbook (for logs).
    fn describe(&self) -> String;

    /// Fetches every record of a tab. The first row of the tab is the
    /// header; each following row becomes one [`Row`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the workbook or tab cannot be read.
    async fn fetch(&self, tab: &TabSelector) -> Result<Vec<Row>, SourceError>;
}

#[async_trait]
impl<T: RowSource + ?Sized> RowSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn fetch(&self, tab: &TabSelector) -> Result<Vec<Row>, SourceError> {
        (**self).fetch(tab).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Tabs {
        blocks: TabSelector,
        lots: TabSelector,
    }

    #[test]
    fn tab_selector_deserializes_by_name_or_index() {
        let tabs: Tabs = serde_json::from_str(
            r#"{"blocks": {"name": "Bloco"}, "lots": {"index": 0}}"#,
        )
        .unwrap();
        assert_eq!(tabs.blocks, TabSelector::name("Bloco"));
        assert_eq!(tabs.lots, TabSelector::index(0));
    }

    #[test]
    fn errors_keep_their_source() {
        let io = std::io::Error::other("connection reset");
        let err = SourceError::connection("reading workbook", io);
        assert_eq!(err.to_string(), "Connection error: reading workbook");
        assert!(std::error::Error::source(&err).is_some());
        assert!(std::error::Error::source(&SourceError::not_found("tab")).is_none());
    }
}

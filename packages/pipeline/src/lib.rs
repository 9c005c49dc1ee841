#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cadastre data pipeline.
//!
//! Loads the blocks and lots tabs from a [`cadastre_map_source::RowSource`],
//! checks the data contract ([`validate`]), splits and coerces coordinates
//! ([`coordinates`]), and enriches every block with statistics over its lots
//! ([`stats`]). The [`loader`] ties these together behind a TTL cache
//! ([`cache`]); [`summary`] derives the dashboard views from the result.

pub mod cache;
pub mod config;
pub mod coordinates;
pub mod loader;
pub mod stats;
pub mod summary;
pub mod validate;

use cadastre_map_source::SourceError;
use strum_macros::{AsRefStr, Display};

use crate::config::ConfigError;
use crate::validate::ValidationError;

/// Errors that can occur while producing a dataset.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Fetching a tab failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Fetched data violates the data contract.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A cache key could not be computed.
    #[error("Failed to fingerprint refresh input: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Coarse classification of a [`PipelineError`] for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The data source could not be reached.
    Connection,
    /// Access to the data source was denied.
    Permission,
    /// The workbook or a tab does not exist.
    NotFound,
    /// The data violates the contract.
    Validation,
    /// The configuration is invalid.
    Config,
    /// Anything else.
    Unexpected,
}

impl PipelineError {
    /// Returns the kind of failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Source(SourceError::Connection { .. }) => ErrorKind::Connection,
            Self::Source(SourceError::Permission { .. }) => ErrorKind::Permission,
            Self::Source(SourceError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Config(_) => ErrorKind::Config,
            Self::Fingerprint(_) => ErrorKind::Unexpected,
        }
    }
}

//! Configuration loaded from `cadastre_map.toml`.
//!
//! Every field has a default, so an empty file (or no file at all via
//! [`CadastreConfig::default`]) describes a CSV workbook in `data/` with the
//! canonical column names. A few settings can be overridden through
//! environment variables, see [`CadastreConfig::apply_env_overrides`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use cadastre_map_cadastre_models::ColumnMap;
use cadastre_map_source::csv_workbook::CsvWorkbookSource;
use cadastre_map_source::google_sheets::{Credentials, GoogleSheetsSource};
use cadastre_map_source::{RowSource, TabSelector};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "cadastre_map.toml";

/// Overrides the configured Google spreadsheet id.
pub const SPREADSHEET_ID_ENV: &str = "CADASTRE_SPREADSHEET_ID";

/// Overrides [`CadastreConfig::cache_ttl_secs`].
pub const CACHE_TTL_ENV: &str = "CADASTRE_CACHE_TTL_SECS";

/// Errors raised while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unexpected fields.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Where the workbook lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A directory of CSV exports, one file per tab.
    Csv {
        /// Workbook directory.
        dir: PathBuf,
        /// Field delimiter (default: comma).
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    /// A Google spreadsheet read through the Sheets API.
    GoogleSheets {
        /// Spreadsheet id from the sheet URL.
        spreadsheet_id: String,
        /// Env var holding an API key.
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        /// Env var holding an OAuth2 access token. Preferred over the API
        /// key when both are set.
        #[serde(default = "default_access_token_env")]
        access_token_env: String,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Csv {
            dir: PathBuf::from("data"),
            delimiter: default_delimiter(),
        }
    }
}

const fn default_delimiter() -> char {
    ','
}

fn default_api_key_env() -> String {
    "GOOGLE_SHEETS_API_KEY".to_string()
}

fn default_access_token_env() -> String {
    "GOOGLE_SHEETS_ACCESS_TOKEN".to_string()
}

/// Which lots contribute to block statistics.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregationScope {
    /// Only lots that survive coordinate filtering.
    #[default]
    PlottableLots,
    /// Every lot referencing a block, placed on the map or not.
    AllLots,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CadastreConfig {
    /// Workbook location.
    pub source: SourceConfig,
    /// Tab holding the blocks.
    pub blocks_tab: TabSelector,
    /// Tab holding the lots.
    pub lots_tab: TabSelector,
    /// Logical to physical column names.
    pub columns: ColumnMap,
    /// Combined `"lat, lon"` column in the blocks tab.
    pub raw_block_coordinates: String,
    /// Combined `"lat, lon"` column in the lots tab.
    pub raw_lot_coordinates: String,
    /// Lifetime of cached refresh results, in seconds.
    pub cache_ttl_secs: u64,
    /// Which lots feed block statistics.
    pub aggregation_scope: AggregationScope,
    /// Uses preselected on the heatmap.
    pub heatmap_uses: Vec<String>,
}

impl Default for CadastreConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            blocks_tab: TabSelector::name("Bloco"),
            lots_tab: TabSelector::index(0),
            columns: ColumnMap::default(),
            raw_block_coordinates: "latitude_longitude_bloco".to_string(),
            raw_lot_coordinates: "latitude_longitude".to_string(),
            cache_ttl_secs: 300,
            aggregation_scope: AggregationScope::default(),
            heatmap_uses: ["Empresarial", "Empresarial vazio", "Misto", "Institucional"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl CadastreConfig {
    /// Reads and parses a config file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env_overrides();
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, else [`DEFAULT_CONFIG_FILE`] if it exists,
    /// else the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but is invalid.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load(default_path);
        }
        log::debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses TOML text without applying overrides.
    ///
    /// # Errors
    ///
    /// Returns [`toml::de::Error`] if the text is invalid.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::de::from_str(text)
    }

    /// Applies [`SPREADSHEET_ID_ENV`] and [`CACHE_TTL_ENV`] from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let SourceConfig::GoogleSheets { spreadsheet_id, .. } = &mut self.source
            && let Some(id) = lookup(SPREADSHEET_ID_ENV).filter(|id| !id.trim().is_empty())
        {
            *spreadsheet_id = id;
        }
        if let Some(raw) = lookup(CACHE_TTL_ENV) {
            match raw.trim().parse() {
                Ok(secs) => self.cache_ttl_secs = secs,
                Err(e) => log::warn!("Ignoring {CACHE_TTL_ENV}={raw:?}: {e}"),
            }
        }
    }

    /// Cache entry lifetime.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Builds the configured row source. Google credentials are read from
    /// the environment variables named in the config.
    #[must_use]
    pub fn build_source(&self) -> Box<dyn RowSource> {
        self.build_source_with(|name| std::env::var(name).ok())
    }

    fn build_source_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Box<dyn RowSource> {
        match &self.source {
            SourceConfig::Csv { dir, delimiter } => {
                let mut source = CsvWorkbookSource::new(dir.clone());
                if let Ok(byte) = u8::try_from(*delimiter) {
                    source = source.with_delimiter(byte);
                } else {
                    log::warn!("Delimiter {delimiter:?} is not a single byte, using ','");
                }
                Box::new(source)
            }
            SourceConfig::GoogleSheets {
                spreadsheet_id,
                api_key_env,
                access_token_env,
            } => {
                let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
                let credentials = present(access_token_env)
                    .map(Credentials::BearerToken)
                    .or_else(|| present(api_key_env).map(Credentials::ApiKey));
                if credentials.is_none() {
                    log::warn!(
                        "Neither {access_token_env} nor {api_key_env} is set; requests will be refused"
                    );
                }
                Box::new(GoogleSheetsSource::new(spreadsheet_id.clone(), credentials))
            }
        }
    }
}

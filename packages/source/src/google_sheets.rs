//! Google Sheets source.
//!
//! Reads tabs through the Sheets API v4 `values` endpoint with
//! `valueRenderOption=UNFORMATTED_VALUE`, so numeric cells arrive as JSON
//! numbers. Tabs selected by index are first resolved to a title through
//! the spreadsheet metadata.

use async_trait::async_trait;
use cadastre_map_cadastre_models::Row;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::parsing::records_from_grid;
use crate::{RowSource, SourceError, TabSelector};

/// Public Sheets API endpoint.
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// How requests are authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// API key, sufficient for sheets shared by link.
    ApiKey(String),
    /// OAuth2 access token (e.g. minted for a service account).
    BearerToken(String),
}

/// A spreadsheet read through the Google Sheets API.
#[derive(Debug, Clone)]
pub struct GoogleSheetsSource {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsSource {
    /// Creates a source for the given spreadsheet. Without credentials every
    /// fetch fails with [`SourceError::Permission`].
    #[must_use]
    pub fn new(spreadsheet_id: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            credentials,
        }
    }

    /// Overrides the API endpoint (for proxies and test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, SourceError> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            SourceError::connection(format!("invalid Sheets API URL '{}'", self.base_url), e)
        })?;
        url.path_segments_mut()
            .map_err(|()| SourceError::Connection {
                message: format!("Sheets API URL '{}' cannot have a path", self.base_url),
                source: None,
            })?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .extend(segments);
        Ok(url)
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, SourceError> {
        match &self.credentials {
            Some(Credentials::ApiKey(key)) => Ok(request.query(&[("key", key.as_str())])),
            Some(Credentials::BearerToken(token)) => Ok(request.bearer_auth(token)),
            None => Err(SourceError::Permission {
                message: "credentials not found: configure an API key or access token"
                    .to_string(),
                source: None,
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, SourceError> {
        let response = self
            .authorize(request)?
            .send()
            .await
            .map_err(|e| SourceError::connection(format!("request for {what} failed"), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::debug!("Sheets API returned HTTP {status} for {what}: {body}");
            return Err(classify_status(status, &body, what));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::connection(format!("invalid response for {what}"), e))
    }

    async fn sheet_title(&self, index: usize) -> Result<String, SourceError> {
        let what = format!("spreadsheet {}", self.spreadsheet_id);
        let request = self
            .client
            .get(self.url(&[])?)
            .query(&[("fields", "sheets.properties(title,index)")]);
        let meta: SpreadsheetMeta = self.get_json(request, &what).await?;

        pick_title(&meta, index)
            .ok_or_else(|| SourceError::not_found(format!("tab index {index} in {what}")))
    }
}

#[async_trait]
impl RowSource for GoogleSheetsSource {
    fn describe(&self) -> String {
        format!("Google spreadsheet {}", self.spreadsheet_id)
    }

    async fn fetch(&self, tab: &TabSelector) -> Result<Vec<Row>, SourceError> {
        let title = match tab {
            TabSelector::Name { name } => name.clone(),
            TabSelector::Index { index } => self.sheet_title(*index).await?,
        };

        let range = quote_range(&title);
        let request = self
            .client
            .get(self.url(&["values", range.as_str()])?)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")]);
        let values: ValueRange = self.get_json(request, &format!("tab '{title}'")).await?;

        let rows = records_from_grid(values.values);
        log::info!(
            "Fetched {} records from tab '{title}' of spreadsheet {}",
            rows.len(),
            self.spreadsheet_id
        );
        Ok(rows)
    }
}

/// Quotes a tab title as an A1 range covering the whole tab.
fn quote_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn pick_title(meta: &SpreadsheetMeta, index: usize) -> Option<String> {
    meta.sheets
        .iter()
        .find(|sheet| sheet.properties.index == index)
        .map(|sheet| sheet.properties.title.clone())
}

/// Maps a non-success HTTP status onto the source error taxonomy.
fn classify_status(status: StatusCode, body: &str, what: &str) -> SourceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Permission {
            message: format!("access to {what} denied (HTTP {status})"),
            source: None,
        },
        StatusCode::NOT_FOUND => SourceError::not_found(what),
        StatusCode::BAD_REQUEST if body.contains("Unable to parse range") => {
            SourceError::not_found(what)
        }
        _ => SourceError::Connection {
            message: format!("HTTP {status} for {what}"),
            source: None,
        },
    }
}

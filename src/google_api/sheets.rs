//! Google Sheets API v4: first-worksheet reads.
//!
//! One load is a metadata lookup for the first worksheet's title followed
//! by a single `values.get` over columns A:Z. No retries: a failure is
//! returned to the caller as-is.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::credentials::CredentialProvider;
use super::{api_error_message, GoogleApiError};
use crate::error::PipelineError;
use crate::source::{RawSheet, SheetSource};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Worksheet read when the metadata lookup fails.
pub const FALLBACK_SHEET_TITLE: &str = "Sheet1";
const READ_COLUMNS: &str = "A:Z";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: Option<SheetProperties>,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

// ============================================================================
// Client
// ============================================================================

pub struct SheetsClient {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: Url,
}

impl SheetsClient {
    pub fn new(
        client: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, GoogleApiError> {
        Self::with_base_url(client, credentials, SHEETS_API_BASE)
    }

    /// Point the client at another API root (emulators, tests).
    pub fn with_base_url(
        client: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
        base_url: &str,
    ) -> Result<Self, GoogleApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GoogleApiError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GoogleApiError::InvalidEndpoint(base_url.to_string()));
        }
        Ok(Self {
            client,
            credentials,
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GoogleApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GoogleApiError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Result<T, GoogleApiError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GoogleApiError::ApiError {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(resp.json().await?)
    }

    /// Title of the first worksheet, or `Sheet1` when the spreadsheet lists none.
    pub async fn first_sheet_title(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
    ) -> Result<String, GoogleApiError> {
        let meta: SpreadsheetMetadata = self
            .get_json(
                self.endpoint(&[spreadsheet_id])?,
                &[("fields", "sheets.properties.title")],
                access_token,
            )
            .await?;

        Ok(meta
            .sheets
            .into_iter()
            .find_map(|s| s.properties.and_then(|p| p.title))
            .unwrap_or_else(|| FALLBACK_SHEET_TITLE.to_string()))
    }

    /// Cell text for an A1 range, row-major. Non-string cells are stringified.
    pub async fn read_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, GoogleApiError> {
        let body: ValueRange = self
            .get_json(
                self.endpoint(&[spreadsheet_id, "values", range])?,
                &[("majorDimension", "ROWS")],
                access_token,
            )
            .await?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    /// Read every row of the first worksheet.
    pub async fn read_first_worksheet(
        &self,
        spreadsheet_id: &str,
    ) -> Result<RawSheet, GoogleApiError> {
        let access_token = self.credentials.access_token().await?;

        let title = match self.first_sheet_title(&access_token, spreadsheet_id).await {
            Ok(title) => title,
            Err(e @ GoogleApiError::ApiError { status: 401 | 403 | 404, .. }) => return Err(e),
            Err(e) => {
                log::warn!(
                    "sheets: could not read metadata for {} ({}), using '{}'",
                    spreadsheet_id,
                    e,
                    FALLBACK_SHEET_TITLE
                );
                FALLBACK_SHEET_TITLE.to_string()
            }
        };

        let range = a1_range(&title, READ_COLUMNS);
        let grid = self
            .read_values(&access_token, spreadsheet_id, &range)
            .await?;
        let sheet = grid_to_sheet(grid);
        log::debug!(
            "sheets: read {} rows x {} columns from '{}'",
            sheet.rows.len(),
            sheet.headers.len(),
            title
        );
        Ok(sheet)
    }
}

#[async_trait]
impl SheetSource for SheetsClient {
    async fn fetch(&self, sheet_id: &str) -> Result<RawSheet, PipelineError> {
        self.read_first_worksheet(sheet_id)
            .await
            .map_err(|e| match e {
                GoogleApiError::ApiError {
                    status: 404,
                    message,
                } => PipelineError::SourceNotFound(format!("{} ({})", sheet_id, message)),
                GoogleApiError::ApiError {
                    status: 400,
                    message,
                } if message.contains("Unable to parse range") => {
                    PipelineError::SourceNotFound(format!("{}: {}", sheet_id, message))
                }
                other => other.into(),
            })
    }
}

/// Quote a worksheet title for A1 notation; embedded quotes are doubled.
fn a1_range(title: &str, columns: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), columns)
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// First row is the header row; the rest are data rows.
pub fn grid_to_sheet(grid: Vec<Vec<String>>) -> RawSheet {
    let mut rows = grid.into_iter();
    let Some(headers) = rows.next() else {
        return RawSheet::default();
    };
    RawSheet::from_grid(headers, rows.collect())
}

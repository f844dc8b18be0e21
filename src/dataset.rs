//! Normalized lead records and the immutable dataset that carries them.
//!
//! A [`Dataset`] is produced once by the normalizer and shared by reference
//! afterwards. Filtering builds a new dataset over the same header list and
//! capability set; nothing mutates records in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

// ============================================================================
// Well-known columns
// ============================================================================

pub const DATE_GENERATED: &str = "Date Generated";
pub const FIT_SCORE: &str = "Fit Score";
pub const EXPERIENCE_YEARS: &str = "Experience (Years)";
pub const CONNECTION_STATUS: &str = "Connection Status";
pub const CURRENT_EMPLOYER: &str = "Current Employer";
pub const LOCATION: &str = "Location";
pub const NOTIFICATION_EMAIL: &str = "Notification Email Sent (on accepting invitation)";

const EMAIL_STATUS_PREFIX: &str = "email status";

/// Whether a header names an email-status column.
///
/// Matches the acceptance notification column and every `Email Status ...`
/// column (case-insensitive), so sheets can add `Email Status 3` without a
/// code change.
pub fn is_email_status_column(header: &str) -> bool {
    header == NOTIFICATION_EMAIL
        || header
            .trim()
            .to_lowercase()
            .starts_with(EMAIL_STATUS_PREFIX)
}

// ============================================================================
// Record
// ============================================================================

/// One lead after normalization.
///
/// `None` means the column is absent from the sheet or the value could not
/// be parsed. A blank cell in a text column is `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub date_generated: Option<NaiveDate>,
    pub fit_score: Option<f64>,
    pub experience_years: Option<f64>,
    pub connection_status: Option<String>,
    pub current_employer: Option<String>,
    pub location: Option<String>,
    /// Email-status columns present on this row, keyed by header.
    pub email_statuses: BTreeMap<String, String>,
    /// Every other column, passed through untouched.
    pub extra: BTreeMap<String, String>,
}

impl Record {
    /// Text form of a column value, or `None` when the record has no value.
    ///
    /// Dates render as `YYYY-MM-DD`; numbers use their shortest form.
    pub fn value(&self, column: &str) -> Option<String> {
        match column {
            DATE_GENERATED => self.date_generated.map(|d| d.format("%Y-%m-%d").to_string()),
            FIT_SCORE => self.fit_score.map(|v| v.to_string()),
            EXPERIENCE_YEARS => self.experience_years.map(|v| v.to_string()),
            CONNECTION_STATUS => self.connection_status.clone(),
            CURRENT_EMPLOYER => self.current_employer.clone(),
            LOCATION => self.location.clone(),
            other => self
                .email_statuses
                .get(other)
                .or_else(|| self.extra.get(other))
                .cloned(),
        }
    }

    /// Like [`Record::value`] but treats blank cells as missing.
    pub fn non_blank_value(&self, column: &str) -> Option<String> {
        self.value(column).filter(|v| !v.trim().is_empty())
    }

    /// Connection status, if present.
    pub fn status(&self) -> Option<&str> {
        self.connection_status.as_deref()
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Which well-known columns a dataset carries.
///
/// Derived once from the header row so downstream code asks "is this column
/// present" instead of guarding every field access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub date_generated: bool,
    pub fit_score: bool,
    pub experience_years: bool,
    pub connection_status: bool,
    pub current_employer: bool,
    pub location: bool,
    /// Email-status headers in sheet order.
    pub email_status_columns: Vec<String>,
}

impl Capabilities {
    pub fn from_headers(headers: &[String]) -> Self {
        let has = |name: &str| headers.iter().any(|h| h == name);
        Self {
            date_generated: has(DATE_GENERATED),
            fit_score: has(FIT_SCORE),
            experience_years: has(EXPERIENCE_YEARS),
            connection_status: has(CONNECTION_STATUS),
            current_employer: has(CURRENT_EMPLOYER),
            location: has(LOCATION),
            email_status_columns: headers
                .iter()
                .filter(|h| is_email_status_column(h))
                .cloned()
                .collect(),
        }
    }

    /// Daily status trends need both a date and a status.
    pub fn supports_status_trend(&self) -> bool {
        self.date_generated && self.connection_status
    }

    pub fn supports_email_analysis(&self) -> bool {
        !self.email_status_columns.is_empty()
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// Immutable, ordered sequence of records. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Arc<[Record]>,
    columns: Arc<[String]>,
    capabilities: Arc<Capabilities>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        let capabilities = Capabilities::from_headers(&columns);
        Self {
            records: records.into(),
            columns: columns.into(),
            capabilities: Arc::new(capabilities),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// New dataset over the same header row, holding `records`.
    pub fn derive(&self, records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
            columns: Arc::clone(&self.columns),
            capabilities: Arc::clone(&self.capabilities),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Header row in sheet order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.records == other.records
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

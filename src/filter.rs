//! Filter engine: conjunction of date, status, and fit score predicates.
//!
//! Filtering is a pure, stable operation. A record with a null value on a
//! constrained field never matches that constraint.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Record};

/// Status selection that disables the status predicate.
pub const ALL_STATUSES: &str = "All";

// ============================================================================
// Criteria
// ============================================================================

/// Inclusive date bounds. A missing bound imposes no constraint on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// A single calendar day.
    pub fn day(date: NaiveDate) -> Self {
        Self::between(date, date)
    }

    /// Monday through Sunday of the week containing `date`.
    pub fn week_of(date: NaiveDate) -> Self {
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Self::between(monday, monday + Duration::days(6))
    }

    /// First through last day of a calendar month. `None` for an invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self::between(first, next_first.pred_opt()?))
    }

    pub fn is_unset(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        if self.is_unset() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Inclusive fit score bounds. A missing bound imposes no constraint on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ScoreRange {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, score: Option<f64>) -> bool {
        if self.is_unset() {
            return true;
        }
        let Some(score) = score else {
            return false;
        };
        self.min.map_or(true, |m| score >= m) && self.max.map_or(true, |m| score <= m)
    }
}

/// Connection status selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum StatusFilter {
    #[default]
    All,
    Only(String),
}

impl StatusFilter {
    /// Map a dropdown selection; the literal `All` disables the predicate.
    pub fn from_selection(selection: &str) -> Self {
        if selection == ALL_STATUSES {
            StatusFilter::All
        } else {
            StatusFilter::Only(selection.to_string())
        }
    }

    /// Exact, case-sensitive match.
    pub fn matches(&self, status: Option<&str>) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => status == Some(wanted.as_str()),
        }
    }
}

/// The active filter bounds. The default imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub connection_status: StatusFilter,
    #[serde(default)]
    pub fit_score: ScoreRange,
}

impl FilterCriteria {
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = range;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.connection_status = StatusFilter::from_selection(&status.into());
        self
    }

    pub fn with_fit_score(mut self, range: ScoreRange) -> Self {
        self.fit_score = range;
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.date_range.is_unset()
            && self.connection_status == StatusFilter::All
            && self.fit_score.is_unset()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.date_range.contains(record.date_generated)
            && self.connection_status.matches(record.status())
            && self.fit_score.contains(record.fit_score)
    }
}

/// Keep the records matching every active predicate, in sheet order.
pub fn apply(dataset: &Dataset, criteria: &FilterCriteria) -> Dataset {
    if criteria.is_unconstrained() {
        return dataset.clone();
    }
    let kept = dataset
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect();
    dataset.derive(kept)
}

// ============================================================================
// Bounds
// ============================================================================

/// Observed value ranges, for seeding filter widgets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterBounds {
    pub date_min: Option<NaiveDate>,
    pub date_max: Option<NaiveDate>,
    pub fit_score_min: Option<f64>,
    pub fit_score_max: Option<f64>,
    /// Distinct non-blank statuses, sorted.
    pub connection_statuses: Vec<String>,
}

impl FilterBounds {
    pub fn observe(dataset: &Dataset) -> Self {
        let mut bounds = FilterBounds::default();
        let mut statuses = std::collections::BTreeSet::new();

        for record in dataset {
            if let Some(date) = record.date_generated {
                bounds.date_min = Some(bounds.date_min.map_or(date, |d| d.min(date)));
                bounds.date_max = Some(bounds.date_max.map_or(date, |d| d.max(date)));
            }
            if let Some(score) = record.fit_score {
                bounds.fit_score_min = Some(bounds.fit_score_min.map_or(score, |s| s.min(score)));
                bounds.fit_score_max = Some(bounds.fit_score_max.map_or(score, |s| s.max(score)));
            }
            if let Some(status) = record.status().filter(|s| !s.trim().is_empty()) {
                statuses.insert(status.to_string());
            }
        }

        bounds.connection_statuses = statuses.into_iter().collect();
        bounds
    }

    /// Full observed date span, or unset when no record has a date.
    pub fn date_range(&self) -> DateRange {
        DateRange {
            start: self.date_min,
            end: self.date_max,
        }
    }

    /// Full observed score span, or unset when no record has a score.
    pub fn score_range(&self) -> ScoreRange {
        ScoreRange {
            min: self.fit_score_min,
            max: self.fit_score_max,
        }
    }

    /// Dropdown entries: `All` followed by the observed statuses.
    pub fn status_options(&self) -> Vec<String> {
        std::iter::once(ALL_STATUSES.to_string())
            .chain(self.connection_statuses.iter().cloned())
            .collect()
    }
}

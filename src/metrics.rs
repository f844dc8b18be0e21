//! KPI snapshot and chart aggregates over a (filtered) dataset.
//!
//! Every function here is total: an empty dataset or a missing column yields
//! zero counts or empty series, never an error. Null and blank group values
//! are dropped, matching the filter engine's null policy.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::dataset::{Dataset, Record, CONNECTION_STATUS};

/// Statuses that count as "invited".
pub const INVITED_STATUSES: [&str; 2] = ["Ready to send", "Sent"];
/// Status that counts as "accepted".
pub const ACCEPTED_STATUS: &str = "ACCEPTED";

pub const DEFAULT_HISTOGRAM_BINS: usize = 30;
pub const DEFAULT_TOP_N: usize = 10;

// ============================================================================
// KPIs
// ============================================================================

/// The three headline counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub total_with_fit_score: usize,
    pub invited: usize,
    pub accepted: usize,
}

/// Which headline count a record contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KpiKind {
    TotalWithFitScore,
    Invited,
    Accepted,
}

impl KpiKind {
    pub fn matches(self, record: &Record) -> bool {
        match self {
            KpiKind::TotalWithFitScore => record.fit_score.is_some(),
            KpiKind::Invited => record
                .status()
                .is_some_and(|s| INVITED_STATUSES.contains(&s)),
            KpiKind::Accepted => record.status() == Some(ACCEPTED_STATUS),
        }
    }
}

/// Compute the KPI snapshot in a single scan.
pub fn compute(dataset: &Dataset) -> KpiSnapshot {
    dataset.iter().fold(KpiSnapshot::default(), |mut kpis, record| {
        if KpiKind::TotalWithFitScore.matches(record) {
            kpis.total_with_fit_score += 1;
        }
        if KpiKind::Invited.matches(record) {
            kpis.invited += 1;
        }
        if KpiKind::Accepted.matches(record) {
            kpis.accepted += 1;
        }
        kpis
    })
}

/// The records behind one headline count, in dataset order.
pub fn leads_for(dataset: &Dataset, kind: KpiKind) -> Dataset {
    dataset.derive(
        dataset
            .iter()
            .filter(|r| kind.matches(r))
            .cloned()
            .collect(),
    )
}

// ============================================================================
// Group-by counts
// ============================================================================

/// Count of records sharing one combination of column values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: Vec<String>,
    pub count: usize,
}

/// Count records by the values of `columns`, sorted by key.
///
/// A record with a null or blank value in any grouping column is skipped.
/// No columns means one group holding every record.
pub fn group_by(dataset: &Dataset, columns: &[&str]) -> Vec<GroupCount> {
    let mut groups: BTreeMap<Vec<String>, usize> = BTreeMap::new();
    for record in dataset {
        let key: Option<Vec<String>> = columns
            .iter()
            .map(|column| record.non_blank_value(column))
            .collect();
        if let Some(key) = key {
            *groups.entry(key).or_insert(0) += 1;
        }
    }
    groups
        .into_iter()
        .map(|(key, count)| GroupCount { key, count })
        .collect()
}

/// One point of the daily status trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub status: String,
    pub count: usize,
}

/// Records per (date generated, connection status), ordered by date then status.
pub fn daily_counts(dataset: &Dataset) -> Vec<DailyCount> {
    let mut groups: BTreeMap<(NaiveDate, String), usize> = BTreeMap::new();
    for record in dataset {
        let (Some(date), Some(status)) = (record.date_generated, record.status()) else {
            continue;
        };
        if status.trim().is_empty() {
            continue;
        }
        *groups.entry((date, status.to_string())).or_insert(0) += 1;
    }
    groups
        .into_iter()
        .map(|((date, status), count)| DailyCount {
            date,
            status,
            count,
        })
        .collect()
}

/// Frequency of one value in one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Value frequencies for a column, most frequent first (ties by value).
pub fn value_counts(dataset: &Dataset, column: &str) -> Vec<ValueCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in dataset.iter().filter_map(|r| r.non_blank_value(column)) {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut out: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    out
}

/// The `n` most frequent values of a column.
pub fn top_values(dataset: &Dataset, column: &str, n: usize) -> Vec<ValueCount> {
    let mut counts = value_counts(dataset, column);
    counts.truncate(n);
    counts
}

/// Connection status distribution (pie chart input).
pub fn status_distribution(dataset: &Dataset) -> Vec<ValueCount> {
    value_counts(dataset, CONNECTION_STATUS)
}

/// Per email-status column: how many rows are filled, and with what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailColumnSummary {
    pub column: String,
    pub filled: usize,
    pub statuses: Vec<ValueCount>,
}

/// Summaries for every email-status column holding at least one value.
pub fn email_status_summary(dataset: &Dataset) -> Vec<EmailColumnSummary> {
    dataset
        .capabilities()
        .email_status_columns
        .iter()
        .map(|column| {
            let statuses = value_counts(dataset, column);
            EmailColumnSummary {
                column: column.clone(),
                filled: statuses.iter().map(|s| s.count).sum(),
                statuses,
            }
        })
        .filter(|summary| summary.filled > 0)
        .collect()
}

// ============================================================================
// Fit score distribution
// ============================================================================

/// Summary statistics over non-null fit scores, rounded to 2 places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitScoreStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1); 0 for a single score.
    pub std_dev: f64,
}

/// Five-number summary for a box plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxPlot {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

fn sorted_scores(dataset: &Dataset) -> Vec<f64> {
    let mut scores: Vec<f64> = dataset.iter().filter_map(|r| r.fit_score).collect();
    scores.sort_by(f64::total_cmp);
    scores
}

/// Linearly interpolated quantile of sorted, non-empty scores.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * p;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `None` when no record has a fit score.
pub fn fit_score_stats(dataset: &Dataset) -> Option<FitScoreStats> {
    let scores = sorted_scores(dataset);
    let n = scores.len();
    if n == 0 {
        return None;
    }

    let mean = scores.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(FitScoreStats {
        count: n,
        mean: round2(mean),
        min: round2(scores[0]),
        max: round2(scores[n - 1]),
        median: round2(quantile(&scores, 0.5)),
        std_dev: round2(variance.sqrt()),
    })
}

/// Quartiles interpolated linearly between the nearest sorted scores.
pub fn fit_score_box_plot(dataset: &Dataset) -> Option<BoxPlot> {
    let scores = sorted_scores(dataset);
    let (&min, &max) = (scores.first()?, scores.last()?);
    Some(BoxPlot {
        min,
        q1: quantile(&scores, 0.25),
        median: quantile(&scores, 0.5),
        q3: quantile(&scores, 0.75),
        max,
    })
}

/// Equal-width histogram spanning the observed score range.
///
/// The top edge is inclusive. When every score is equal, all land in the
/// first bin. Empty when no record has a score or `bins` is zero.
pub fn fit_score_histogram(dataset: &Dataset, bins: usize) -> Vec<HistogramBin> {
    let scores = sorted_scores(dataset);
    let (Some(&min), Some(&max)) = (scores.first(), scores.last()) else {
        return Vec::new();
    };
    if bins == 0 {
        return Vec::new();
    }

    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: min + width * (i + 1) as f64,
            count: 0,
        })
        .collect();

    for score in scores {
        let idx = if width > 0.0 {
            (((score - min) / width).floor() as usize).min(bins - 1)
        } else {
            0
        };
        out[idx].count += 1;
    }
    out
}

// Dashboard service
// Load-filter-compute entry points for the presentation layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::DatasetCache;
use crate::dataset::{Dataset, CURRENT_EMPLOYER, LOCATION};
use crate::error::{DashboardError, PipelineError};
use crate::filter::{self, FilterBounds, FilterCriteria};
use crate::google_api::credentials::load_provider;
use crate::google_api::http_client;
use crate::google_api::sheets::SheetsClient;
use crate::metrics::{
    self, BoxPlot, DailyCount, EmailColumnSummary, FitScoreStats, GroupCount, HistogramBin,
    KpiSnapshot, ValueCount, DEFAULT_HISTOGRAM_BINS, DEFAULT_TOP_N,
};
use crate::normalize::normalize;
use crate::source::SheetSource;
use crate::types::Config;

/// Result type for one dashboard render
#[derive(Debug, Serialize)]
#[allow(clippy::large_enum_variant)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DashboardResult {
    Success {
        data: DashboardView,
        #[serde(rename = "lastUpdated")]
        last_updated: Option<DateTime<Utc>>,
    },
    Empty {
        message: String,
    },
    Error {
        error: DashboardError,
    },
}

/// Everything the dashboard shows for one filter selection.
///
/// Sections that depend on absent columns are left empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    /// Leads matching the filter.
    pub lead_count: usize,
    pub kpis: KpiSnapshot,
    /// Computed over the unfiltered dataset.
    pub bounds: FilterBounds,
    pub daily_status: Vec<DailyCount>,
    pub status_distribution: Vec<ValueCount>,
    pub email_status: Vec<EmailColumnSummary>,
    pub fit_score_stats: Option<FitScoreStats>,
    pub fit_score_box_plot: Option<BoxPlot>,
    pub fit_score_histogram: Vec<HistogramBin>,
    pub top_employers: Vec<ValueCount>,
    pub top_locations: Vec<ValueCount>,
}

impl DashboardView {
    pub fn build(full: &Dataset, filtered: &Dataset) -> Self {
        let caps = filtered.capabilities();
        Self {
            lead_count: filtered.len(),
            kpis: metrics::compute(filtered),
            bounds: FilterBounds::observe(full),
            daily_status: if caps.supports_status_trend() {
                metrics::daily_counts(filtered)
            } else {
                Vec::new()
            },
            status_distribution: metrics::status_distribution(filtered),
            email_status: if caps.supports_email_analysis() {
                metrics::email_status_summary(filtered)
            } else {
                Vec::new()
            },
            fit_score_stats: metrics::fit_score_stats(filtered),
            fit_score_box_plot: metrics::fit_score_box_plot(filtered),
            fit_score_histogram: metrics::fit_score_histogram(filtered, DEFAULT_HISTOGRAM_BINS),
            top_employers: metrics::top_values(filtered, CURRENT_EMPLOYER, DEFAULT_TOP_N),
            top_locations: metrics::top_values(filtered, LOCATION, DEFAULT_TOP_N),
        }
    }
}

pub struct Dashboard {
    config: Config,
    source: Arc<dyn SheetSource>,
    cache: DatasetCache,
}

impl Dashboard {
    pub fn new(config: Config, source: Arc<dyn SheetSource>) -> Self {
        Self::with_cache(config, source, DatasetCache::default())
    }

    pub fn with_cache(config: Config, source: Arc<dyn SheetSource>, cache: DatasetCache) -> Self {
        Self {
            config,
            source,
            cache,
        }
    }

    /// Wire up the Google Sheets reader from config credentials.
    pub fn from_config(config: Config) -> Result<Self, PipelineError> {
        let client = http_client(config.fetch_timeout())?;
        let credentials = load_provider(&config, client.clone())?;
        let sheets = SheetsClient::new(client, credentials)?;
        Ok(Self::new(config, Arc::new(sheets)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Normalized dataset for the configured sheet, from cache when fresh.
    pub async fn load(&self) -> Result<Dataset, PipelineError> {
        let sheet_id = self.config.sheet_id.as_str();
        let timeout = self.config.fetch_timeout();

        self.cache
            .get_or_fetch(sheet_id, self.config.cache_ttl(), || async {
                let started = std::time::Instant::now();
                let sheet = tokio::time::timeout(timeout, self.source.fetch(sheet_id))
                    .await
                    .map_err(|_| PipelineError::timeout(timeout.as_secs()))?
                    .map_err(|e| {
                        log::warn!("dashboard: load of {} failed: {}", sheet_id, e);
                        e
                    })?;
                let dataset = normalize(sheet);
                log::info!(
                    "dashboard: loaded {} leads from {} in {}ms",
                    dataset.len(),
                    sheet_id,
                    started.elapsed().as_millis()
                );
                Ok::<_, PipelineError>(dataset)
            })
            .await
    }

    pub fn filter(&self, dataset: &Dataset, criteria: &FilterCriteria) -> Dataset {
        filter::apply(dataset, criteria)
    }

    pub fn compute_kpis(&self, dataset: &Dataset) -> KpiSnapshot {
        metrics::compute(dataset)
    }

    pub fn group_by(&self, dataset: &Dataset, columns: &[&str]) -> Vec<GroupCount> {
        metrics::group_by(dataset, columns)
    }

    pub fn clear_cache(&self) {
        log::info!("dashboard: cache cleared");
        self.cache.clear();
    }

    /// When the cached dataset was fetched, if one is held.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.cache.fetched_at(&self.config.sheet_id)
    }

    /// Drop the cached dataset and fetch again.
    pub async fn refresh(&self) -> Result<Dataset, PipelineError> {
        self.clear_cache();
        self.load().await
    }

    /// Load, filter, and compute every dashboard section.
    pub async fn render(&self, criteria: &FilterCriteria) -> DashboardResult {
        let full = match self.load().await {
            Ok(dataset) => dataset,
            Err(e) => {
                return DashboardResult::Error {
                    error: DashboardError::from(&e),
                }
            }
        };

        if full.is_empty() {
            return DashboardResult::Empty {
                message: "The sheet has no lead rows yet.".to_string(),
            };
        }

        let filtered = self.filter(&full, criteria);
        DashboardResult::Success {
            data: DashboardView::build(&full, &filtered),
            last_updated: self.last_updated(),
        }
    }
}

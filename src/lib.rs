//! Lead-generation dashboard pipeline.
//!
//! Reads one Google Sheets worksheet of leads, normalizes it into typed
//! records, caches the result, and derives the filtered views and KPIs a
//! dashboard renders. Rendering itself lives elsewhere.
//!
//! ```no_run
//! # async fn demo() -> Result<(), leadboard::PipelineError> {
//! let config = leadboard::state::load_config().unwrap_or_default();
//! let dashboard = leadboard::Dashboard::from_config(config)?;
//! let leads = dashboard.load().await?;
//! let sent = dashboard.filter(&leads, &leadboard::FilterCriteria::default().with_status("Sent"));
//! println!("{:?}", dashboard.compute_kpis(&sent));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod google_api;
pub mod metrics;
pub mod normalize;
pub mod poller;
pub mod services;
pub mod source;
pub mod state;
pub mod types;

pub use cache::{Clock, DatasetCache, ManualClock, SystemClock};
pub use dataset::{Capabilities, Dataset, Record};
pub use error::{DashboardError, PipelineError, UnavailableCause};
pub use filter::{DateRange, FilterBounds, FilterCriteria, ScoreRange, StatusFilter};
pub use metrics::{GroupCount, KpiKind, KpiSnapshot};
pub use poller::{spawn_configured_poller, spawn_refresh_poller, RefreshPoller};
pub use services::dashboard::{Dashboard, DashboardResult, DashboardView};
pub use source::{RawRecord, RawSheet, SheetSource};
pub use types::Config;

/// Install `env_logger` as the `log` backend. `RUST_LOG` controls verbosity;
/// defaults to `info`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

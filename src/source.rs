//! Raw worksheet rows and the seam the pipeline reads them through.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::PipelineError;

/// One worksheet row: header to raw cell text.
///
/// A header missing from the map means the sheet has no such column;
/// a blank cell is present with an empty string.
pub type RawRecord = HashMap<String, String>;

/// All rows of one worksheet, in sheet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl RawSheet {
    /// Build from a header row and positional rows.
    ///
    /// Cells past the end of a short row are blank. Cells past the last
    /// header and columns with an empty header are dropped. A repeated
    /// header keeps its first column; later ones are dropped with a warning.
    pub fn from_grid(headers: Vec<String>, grid: Vec<Vec<String>>) -> Self {
        let mut seen = HashSet::new();
        let keep: Vec<(usize, String)> = headers
            .into_iter()
            .enumerate()
            .filter(|(_, h)| !h.trim().is_empty())
            .filter(|(idx, h)| {
                let first = seen.insert(h.clone());
                if !first {
                    log::warn!(
                        "sheet: duplicate header '{}' in column {}, keeping the first",
                        h,
                        idx + 1
                    );
                }
                first
            })
            .collect();

        let rows = grid
            .into_iter()
            .map(|row| {
                keep.iter()
                    .map(|(idx, header)| (header.clone(), row.get(*idx).cloned().unwrap_or_default()))
                    .collect::<RawRecord>()
            })
            .collect();

        Self {
            headers: keep.into_iter().map(|(_, h)| h).collect(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Something that can read a worksheet by spreadsheet identifier.
///
/// Implemented by the Google Sheets client; tests substitute in-memory
/// sources.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch(&self, sheet_id: &str) -> Result<RawSheet, PipelineError>;
}

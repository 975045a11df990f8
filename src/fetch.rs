//! Chart snapshot sources.
//!
//! Two sources produce [`ChartSnapshot`]s: the bulk historical JSON feed
//! and the live chart page. A third reads dated rows from a weekly history
//! CSV for backfills. All tolerate individual bad rows (skipped and
//! counted) but abort with a [`FetchError`] when the source as a whole is
//! unreachable or unrecognizable.

mod feed;
mod history_csv;
mod page;

use thiserror::Error;

use crate::http::HttpError;

pub use feed::{FeedImport, FeedOptions, FeedSource, parse_feed};
pub use history_csv::{DatedRow, HistoryCsv, load_history_csv, read_history_csv};
pub use page::{PageSource, parse_chart_page};

pub use crate::models::{ChartRow, ChartSnapshot};

/// Structural failure of a whole fetch, as opposed to one skipped row.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Source unreachable or answered with an error status.
    #[error("chart source unavailable: {0}")]
    Source(#[from] HttpError),

    /// Feed body is not the expected JSON shape.
    #[error("chart feed could not be parsed: {0}")]
    Parse(#[source] serde_json::Error),

    /// Page was fetched but no chart rows could be located.
    #[error("chart page contains no recognizable rows")]
    NoRows,

    /// History file could not be opened.
    #[error("chart history file unreadable: {0}")]
    Io(#[source] std::io::Error),

    /// History file is not readable CSV.
    #[error("chart history CSV could not be read: {0}")]
    Csv(#[source] csv::Error),

    #[error("chart history CSV has no '{0}' column")]
    MissingColumn(&'static str),
}

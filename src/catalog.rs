//! Persistent song catalog: entries, chart history, compositions and
//! artist identities.
//!
//! [`Catalog`] owns the [`Database`] and exposes the queries and writes the
//! pipeline stages need. Row-level helpers that must run inside a caller's
//! transaction take a `&Connection` instead of `&self`.

mod artists;
mod compositions;
mod songs;

use std::sync::Arc;

use anyhow::Result;
use rusqlite::types::Type;
use time::Date;

use crate::Database;
use crate::config::{Clock, SystemClock};
use crate::models::parse_chart_date;

pub(crate) use artists::refresh_song_counts;
pub use compositions::CompositionDraft;
pub(crate) use songs::{
    NewSong, find_song_by_identity, history_entry, insert_history, insert_song, unique_song_slug,
};
pub(crate) use songs::{update_chart_stats, update_history};

/// Service layer over the catalog tables.
///
/// # Examples
///
/// ```
/// use hot100::{Catalog, Database};
///
/// # fn main() -> anyhow::Result<()> {
/// let catalog = Catalog::new(Database::in_memory()?);
/// assert_eq!(catalog.song_count()?, 0);
/// # Ok(())
/// # }
/// ```
pub struct Catalog {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl Catalog {
    /// Creates a catalog stamping rows with the system clock.
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Returns a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Unix timestamp for `created_at`/`updated_at` columns.
    pub(crate) fn timestamp(&self) -> i64 {
        self.clock.now().unix_timestamp()
    }
}

/// Reads a `YYYY-MM-DD` text column.
pub(crate) fn date_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Date> {
    let text: String = row.get(idx)?;
    parse_chart_date(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a nullable `YYYY-MM-DD` text column.
pub(crate) fn optional_date_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<Date>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        parse_chart_date(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

//! Chart history backfill from a weekly history CSV.
//!
//! Rows are grouped by normalized match key and attached to the catalog
//! entries that already carry that key. Only chart history is written; an
//! entry's peak and weeks are left to reconciliation. Each entry's rows are
//! one transaction.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::catalog::{Catalog, history_entry, insert_history, update_history};
use crate::fetch::{DatedRow, HistoryCsv};
use crate::models::{Song, SongId};
use crate::normalize::MatchKey;
use crate::reconcile::{HistoryChange, history_change, history_for};

/// Which entries a backfill visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillOptions {
    /// Count what would change without writing.
    pub dry_run: bool,
    /// Visit at most this many catalog entries, in creation order.
    pub limit: Option<usize>,
}

/// Outcome counts of one backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Entries with at least one CSV row.
    pub songs_matched: usize,
    /// Entries the CSV never mentions.
    pub songs_missing: usize,
    /// Entries whose transaction failed.
    pub songs_failed: usize,
    pub history_created: usize,
    pub history_updated: usize,
    pub history_unchanged: usize,
    /// CSV lines unusable or without a match key.
    pub skipped_rows: usize,
}

impl BackfillReport {
    fn record(&mut self, change: HistoryChange) {
        match change {
            HistoryChange::Created => self.history_created += 1,
            HistoryChange::Corrected => self.history_updated += 1,
            HistoryChange::Unchanged => self.history_unchanged += 1,
        }
    }
}

/// Attaches CSV chart history to a [`Catalog`].
///
/// # Examples
///
/// ```
/// use hot100::backfill::{BackfillOptions, HistoryBackfill};
/// use hot100::fetch::read_history_csv;
/// use hot100::models::{ChartRow, ChartSnapshot};
/// use hot100::reconcile::{ReconcileOptions, Reconciler};
/// use hot100::{Catalog, Database};
/// use time::macros::date;
///
/// # fn main() -> anyhow::Result<()> {
/// let catalog = Catalog::new(Database::in_memory()?);
/// Reconciler::new(&catalog).reconcile(
///     &ChartSnapshot::new(date!(2021 - 11 - 13), vec![ChartRow::new(1, "Easy On Me", "Adele")]),
///     &ReconcileOptions::default(),
/// )?;
///
/// let csv = "date,rank,song,artist,last-week,peak-rank,weeks-on-board\n\
///            2021-11-06,1,Easy on Me,ADELE,,1,1\n";
/// let history = read_history_csv(csv.as_bytes())?;
///
/// let report = HistoryBackfill::new(&catalog).run(&history, &BackfillOptions::default())?;
/// assert_eq!(report.history_created, 1);
/// # Ok(())
/// # }
/// ```
pub struct HistoryBackfill<'a> {
    catalog: &'a Catalog,
}

impl<'a> HistoryBackfill<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Upserts every CSV row belonging to a catalog entry.
    ///
    /// A (entry, date) already in history is corrected when the CSV
    /// disagrees and left alone otherwise.
    pub fn run(&self, history: &HistoryCsv, options: &BackfillOptions) -> Result<BackfillReport> {
        let mut report = BackfillReport {
            skipped_rows: history.skipped_rows,
            ..Default::default()
        };

        let mut by_key: HashMap<String, Vec<&DatedRow>> = HashMap::new();
        for dated in &history.rows {
            match MatchKey::new(&dated.row.title, &dated.row.artist) {
                Ok(key) => by_key.entry(key.as_storage()).or_default().push(dated),
                Err(e) => {
                    tracing::debug!(error = %e, "unmatchable history row");
                    report.skipped_rows += 1;
                }
            }
        }
        for rows in by_key.values_mut() {
            rows.sort_by_key(|dated| dated.chart_date);
        }

        for song in self.catalog.songs(options.limit)? {
            let Some(rows) = by_key.get(&song.match_key) else {
                if report.songs_missing < 20 {
                    tracing::debug!(
                        title = %song.title,
                        artist = %song.artist,
                        "no chart history in CSV"
                    );
                }
                report.songs_missing += 1;
                continue;
            };
            report.songs_matched += 1;

            let changes = if options.dry_run {
                preview_song(self.catalog.database().connection(), song.id, rows)
            } else {
                self.catalog
                    .database()
                    .transaction(|conn| apply_song(conn, song.id, rows))
            };

            match changes {
                Ok(changes) => changes.into_iter().for_each(|change| report.record(change)),
                Err(e) => {
                    log_failure(&song, &e);
                    report.songs_failed += 1;
                }
            }
        }

        tracing::info!(
            dry_run = options.dry_run,
            matched = report.songs_matched,
            missing = report.songs_missing,
            created = report.history_created,
            updated = report.history_updated,
            skipped = report.skipped_rows,
            "history backfill finished"
        );
        Ok(report)
    }
}

fn log_failure(song: &Song, error: &anyhow::Error) {
    tracing::warn!(
        title = %song.title,
        artist = %song.artist,
        error = %error,
        "failed to backfill chart history"
    );
}

fn preview_song(
    conn: &Connection,
    song_id: SongId,
    rows: &[&DatedRow],
) -> Result<Vec<HistoryChange>> {
    rows.iter()
        .map(|dated| {
            let wanted = history_for(song_id, &dated.row, dated.chart_date);
            let current = history_entry(conn, song_id, dated.chart_date)?;
            Ok(history_change(current.as_ref(), &wanted))
        })
        .collect()
}

fn apply_song(
    conn: &Connection,
    song_id: SongId,
    rows: &[&DatedRow],
) -> Result<Vec<HistoryChange>> {
    let mut changes = Vec::with_capacity(rows.len());
    for dated in rows {
        let wanted = history_for(song_id, &dated.row, dated.chart_date);
        let current = history_entry(conn, song_id, dated.chart_date)?;
        let change = history_change(current.as_ref(), &wanted);
        match change {
            HistoryChange::Created => insert_history(conn, &wanted)?,
            HistoryChange::Corrected => update_history(conn, &wanted)?,
            HistoryChange::Unchanged => {}
        }
        changes.push(change);
    }
    Ok(changes)
}

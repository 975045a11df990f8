//! Monotonic merge of chart snapshots into the catalog.
//!
//! Each row is resolved to a catalog entry by its normalized match key,
//! merged so that peak rank only improves and weeks on chart
//! only grow, and recorded in chart history for the snapshot's date. Every
//! row is its own transaction; re-running a snapshot is a no-op.

use std::collections::HashSet;

use anyhow::Result;
use rusqlite::Connection;
use time::Date;

use crate::catalog::{
    Catalog, NewSong, find_song_by_identity, history_entry, insert_history, insert_song,
    unique_song_slug, update_chart_stats, update_history,
};
use crate::models::{ChartHistoryEntry, ChartRow, ChartSnapshot, Song, SongId};
use crate::normalize::{MatchKey, slugify, song_slug};

/// Options for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Compute the report without writing anything.
    pub dry_run: bool,
}

/// Outcome counts of one pass, plus the entries enrichment should visit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Unmatchable rows (blank title or artist) plus rows the fetcher dropped.
    pub skipped: usize,
    /// Rows whose write failed; the rest of the snapshot still went through.
    pub failed: usize,
    pub history_created: usize,
    pub history_updated: usize,
    /// Entries created or changed, in row order.
    pub touched: Vec<SongId>,
    seen: HashSet<SongId>,
}

impl ReconcileReport {
    /// Rows written or confirmed against the catalog.
    pub fn upserted(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    /// Adds another report's counts to this one.
    pub fn absorb(&mut self, other: ReconcileReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.history_created += other.history_created;
        self.history_updated += other.history_updated;
        for id in other.touched {
            self.touch(id);
        }
    }

    /// Records `id` as touched, keeping first-seen order.
    pub(crate) fn touch(&mut self, id: SongId) {
        if self.seen.insert(id) {
            self.touched.push(id);
        }
    }
}

/// What happened to the catalog entry for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryChange {
    Created,
    Updated,
    Unchanged,
}

/// What happened to the history row for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HistoryChange {
    Created,
    Corrected,
    Unchanged,
}

struct RowOutcome {
    song_id: Option<SongId>,
    entry: EntryChange,
    history: HistoryChange,
}

/// Merges snapshots into a [`Catalog`].
///
/// # Examples
///
/// ```
/// use hot100::{Catalog, Database};
/// use hot100::models::{ChartRow, ChartSnapshot};
/// use hot100::reconcile::{ReconcileOptions, Reconciler};
/// use time::macros::date;
///
/// # fn main() -> anyhow::Result<()> {
/// let catalog = Catalog::new(Database::in_memory()?);
/// let snapshot = ChartSnapshot::new(
///     date!(2024 - 01 - 06),
///     vec![ChartRow::new(1, "Lovin On Me", "Jack Harlow")],
/// );
///
/// let report = Reconciler::new(&catalog).reconcile(&snapshot, &ReconcileOptions::default())?;
/// assert_eq!(report.created, 1);
///
/// let again = Reconciler::new(&catalog).reconcile(&snapshot, &ReconcileOptions::default())?;
/// assert_eq!(again.unchanged, 1);
/// assert!(again.touched.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct Reconciler<'a> {
    catalog: &'a Catalog,
}

impl<'a> Reconciler<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Reconciles every row of `snapshot`.
    ///
    /// Only database failures outside a single row abort the pass; a row
    /// whose own transaction fails is counted in `failed`.
    pub fn reconcile(
        &self,
        snapshot: &ChartSnapshot,
        options: &ReconcileOptions,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            skipped: snapshot.skipped_rows,
            ..Default::default()
        };

        for row in &snapshot.rows {
            let key = match MatchKey::new(&row.title, &row.artist) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(rank = row.rank, error = %e, "unmatchable chart row, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            let outcome = if options.dry_run {
                self.preview_row(row, &key, snapshot.chart_date)
            } else {
                let now = self.catalog.timestamp();
                self.catalog
                    .database()
                    .transaction(|conn| apply_row(conn, row, &key, snapshot.chart_date, now))
            };

            match outcome {
                Ok(outcome) => record(&mut report, outcome),
                Err(e) => {
                    tracing::warn!(
                        title = %row.title,
                        artist = %row.artist,
                        error = %e,
                        "failed to reconcile chart row"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            chart_date = %snapshot.chart_date,
            dry_run = options.dry_run,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            "snapshot reconciled"
        );
        Ok(report)
    }

    /// Same decisions as [`apply_row`], reading only.
    fn preview_row(&self, row: &ChartRow, key: &MatchKey, chart_date: Date) -> Result<RowOutcome> {
        let conn = self.catalog.database().connection();

        let Some(existing) = find_song_by_identity(conn, &key.as_storage())? else {
            return Ok(RowOutcome {
                song_id: None,
                entry: EntryChange::Created,
                history: HistoryChange::Created,
            });
        };

        let merged = merge(&existing, row, chart_date);
        let entry = if merged == existing {
            EntryChange::Unchanged
        } else {
            EntryChange::Updated
        };
        let history = history_change(
            history_entry(conn, existing.id, chart_date)?.as_ref(),
            &history_for(existing.id, row, chart_date),
        );

        Ok(RowOutcome {
            song_id: Some(existing.id),
            entry,
            history,
        })
    }
}

/// Upserts one row and its history inside the caller's transaction.
fn apply_row(
    conn: &Connection,
    row: &ChartRow,
    key: &MatchKey,
    chart_date: Date,
    now: i64,
) -> Result<RowOutcome> {
    let match_key = key.as_storage();

    let (song_id, entry) = match find_song_by_identity(conn, &match_key)? {
        Some(existing) => {
            let merged = merge(&existing, row, chart_date);
            if merged == existing {
                (existing.id, EntryChange::Unchanged)
            } else {
                update_chart_stats(conn, &merged, now)?;
                tracing::debug!(
                    title = %existing.title,
                    peak = merged.peak_rank,
                    weeks = merged.weeks_on_chart,
                    "updated catalog entry"
                );
                (existing.id, EntryChange::Updated)
            }
        }
        None => {
            let slug = unique_song_slug(conn, &song_slug(&row.title, &row.artist))?;
            let artist_slug = slugify(&row.artist);
            let id = insert_song(
                conn,
                &NewSong {
                    title: row.title.trim(),
                    artist: row.artist.trim(),
                    year: chart_date.year(),
                    peak_rank: row.effective_peak(),
                    weeks_on_chart: row.effective_weeks(),
                    slug: &slug,
                    match_key: &match_key,
                    artist_slug: &artist_slug,
                    image_url: row.image_url.as_deref(),
                },
                now,
            )?;
            tracing::debug!(title = %row.title, artist = %row.artist, "created catalog entry");
            (id, EntryChange::Created)
        }
    };

    let wanted = history_for(song_id, row, chart_date);
    let current = history_entry(conn, song_id, chart_date)?;
    let history = history_change(current.as_ref(), &wanted);
    match history {
        HistoryChange::Created => insert_history(conn, &wanted)?,
        HistoryChange::Corrected => update_history(conn, &wanted)?,
        HistoryChange::Unchanged => {}
    }

    Ok(RowOutcome {
        song_id: Some(song_id),
        entry,
        history,
    })
}

/// Monotonic merge of a row into an existing entry.
///
/// Peak only improves, weeks only grow, the year moves back to the
/// earliest sighting and a missing image is filled.
fn merge(existing: &Song, row: &ChartRow, chart_date: Date) -> Song {
    let mut merged = existing.clone();
    merged.peak_rank = existing.peak_rank.min(row.effective_peak());
    merged.weeks_on_chart = existing.weeks_on_chart.max(row.effective_weeks());
    merged.year = existing.year.min(chart_date.year());
    if merged.image_url.is_none() {
        merged.image_url = row.image_url.clone();
    }
    merged
}

pub(crate) fn history_for(song_id: SongId, row: &ChartRow, chart_date: Date) -> ChartHistoryEntry {
    ChartHistoryEntry {
        song_id,
        chart_date,
        rank: row.rank,
        peak_rank: row.effective_peak(),
        weeks_on_chart: row.effective_weeks(),
        last_week_rank: row.last_week_rank.filter(|&r| r >= 1),
    }
}

pub(crate) fn history_change(current: Option<&ChartHistoryEntry>, wanted: &ChartHistoryEntry) -> HistoryChange {
    match current {
        None => HistoryChange::Created,
        Some(current) if current == wanted => HistoryChange::Unchanged,
        Some(_) => HistoryChange::Corrected,
    }
}

fn record(report: &mut ReconcileReport, outcome: RowOutcome) {
    match outcome.entry {
        EntryChange::Created => report.created += 1,
        EntryChange::Updated => report.updated += 1,
        EntryChange::Unchanged => report.unchanged += 1,
    }
    match outcome.history {
        HistoryChange::Created => report.history_created += 1,
        HistoryChange::Corrected => report.history_updated += 1,
        HistoryChange::Unchanged => {}
    }
    if outcome.entry != EntryChange::Unchanged
        && let Some(id) = outcome.song_id
    {
        report.touch(id);
    }
}

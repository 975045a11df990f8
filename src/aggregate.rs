//! Full-replace rebuilds of derived tables and cached counters.
//!
//! Nothing here patches incrementally: each rebuild recomputes its table or
//! column from `songs`, `chart_history`, `ratings` and the tag relations
//! inside one transaction. Ordering is fixed so that two rebuilds over the
//! same source rows produce identical tables.

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};

use crate::catalog::{Catalog, date_column, refresh_song_counts};
use crate::feedback::refresh_rating_summary;
use crate::models::{CurrentHot100Entry, NumberOneSong, SongId};

/// Rows written by each rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub current_hot100: usize,
    pub number_ones: usize,
    /// Songs whose rating cache was recomputed.
    pub ratings: usize,
    pub compositions: usize,
    pub song_tags: usize,
    pub artists: usize,
}

fn previous_chart_date(conn: &Connection, before: &str) -> Result<Option<String>> {
    Ok(conn.query_row(
        "SELECT MAX(chart_date) FROM chart_history WHERE chart_date < ?1",
        [before],
        |row| row.get(0),
    )?)
}

fn current_entry_from_row(row: &Row<'_>) -> rusqlite::Result<CurrentHot100Entry> {
    Ok(CurrentHot100Entry {
        position: row.get(0)?,
        song_id: SongId::new(row.get(1)?),
        title: row.get(2)?,
        artist: row.get(3)?,
        last_week_position: row.get(4)?,
        position_change: row.get(5)?,
        peak_rank: row.get(6)?,
        weeks_on_chart: row.get(7)?,
        chart_date: date_column(row, 8)?,
    })
}

/// Rebuilds derived tables of a [`Catalog`].
///
/// # Examples
///
/// ```
/// use hot100::{Catalog, Database};
/// use hot100::aggregate::Aggregates;
///
/// # fn main() -> anyhow::Result<()> {
/// let catalog = Catalog::new(Database::in_memory()?);
/// let report = Aggregates::new(&catalog).rebuild_all()?;
/// assert_eq!(report.current_hot100, 0);
/// # Ok(())
/// # }
/// ```
pub struct Aggregates<'a> {
    catalog: &'a Catalog,
}

impl<'a> Aggregates<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Runs every rebuild, each in its own transaction.
    pub fn rebuild_all(&self) -> Result<RebuildReport> {
        let report = RebuildReport {
            current_hot100: self.rebuild_current_hot100()?,
            number_ones: self.rebuild_number_ones()?,
            ratings: self.rebuild_ratings()?,
            compositions: self.rebuild_compositions()?,
            song_tags: self.rebuild_tag_counts()?,
            artists: self.rebuild_artist_counts()?,
        };

        tracing::info!(
            current_hot100 = report.current_hot100,
            number_ones = report.number_ones,
            ratings = report.ratings,
            compositions = report.compositions,
            song_tags = report.song_tags,
            artists = report.artists,
            "aggregates rebuilt"
        );
        Ok(report)
    }

    /// Replaces the leaderboard with the latest chart date in history.
    ///
    /// Last-week positions come from the chart date just before it, falling
    /// back to the position the source reported. A song with neither has no
    /// last-week position and no change.
    pub fn rebuild_current_hot100(&self) -> Result<usize> {
        self.catalog.database().transaction(|conn| {
            conn.execute("DELETE FROM current_hot100", [])?;

            let latest: Option<String> =
                conn.query_row("SELECT MAX(chart_date) FROM chart_history", [], |row| {
                    row.get(0)
                })?;
            let Some(latest) = latest else {
                return Ok(0);
            };
            let previous = previous_chart_date(conn, &latest)?;

            let rows = conn
                .execute(
                    "INSERT INTO current_hot100 (position, song_id, title, artist,
                        last_week_position, position_change, peak_rank, weeks_on_chart, chart_date)
                     SELECT ROW_NUMBER() OVER (ORDER BY h.rank, h.song_id),
                            h.song_id, s.title, s.artist,
                            COALESCE(p.rank, h.last_week_rank),
                            COALESCE(p.rank, h.last_week_rank) - h.rank,
                            s.peak_rank, h.weeks_on_chart, h.chart_date
                     FROM chart_history h
                     JOIN songs s ON s.id = h.song_id
                     LEFT JOIN chart_history p ON p.song_id = h.song_id AND p.chart_date = ?2
                     WHERE h.chart_date = ?1
                     ORDER BY h.rank, h.song_id",
                    params![latest, previous],
                )
                .context("failed to rebuild current_hot100")?;

            tracing::debug!(chart_date = %latest, rows, "current chart rebuilt");
            Ok(rows)
        })
    }

    /// Replaces the number-one list: every song that peaked at #1, newest
    /// year first, then longest chart run.
    pub fn rebuild_number_ones(&self) -> Result<usize> {
        self.catalog.database().transaction(|conn| {
            conn.execute("DELETE FROM number_one_songs", [])?;
            let rows = conn
                .execute(
                    "INSERT INTO number_one_songs (position, song_id, title, artist, year,
                                                  weeks_on_chart)
                     SELECT ROW_NUMBER() OVER (ORDER BY year DESC, weeks_on_chart DESC, id),
                            id, title, artist, year, weeks_on_chart
                     FROM songs
                     WHERE peak_rank = 1
                     ORDER BY year DESC, weeks_on_chart DESC, id",
                    [],
                )
                .context("failed to rebuild number_one_songs")?;
            Ok(rows)
        })
    }

    /// Recomputes every song's rating cache from `ratings`.
    pub fn rebuild_ratings(&self) -> Result<usize> {
        self.catalog.database().transaction(|conn| {
            conn.execute(
                "UPDATE songs SET average_user_score = NULL, total_ratings = 0
                 WHERE id NOT IN (SELECT song_id FROM ratings)",
                [],
            )?;

            let mut stmt = conn.prepare("SELECT DISTINCT song_id FROM ratings ORDER BY song_id")?;
            let rated = stmt
                .query_map([], |row| Ok(SongId::new(row.get(0)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for &song in &rated {
                refresh_rating_summary(conn, song)?;
            }
            Ok(rated.len())
        })
    }

    /// Recomputes version counts and best-performing versions of every
    /// composition. Ties on peak go to the earliest year, then lowest id.
    pub fn rebuild_compositions(&self) -> Result<usize> {
        self.catalog.database().transaction(|conn| {
            Ok(conn.execute(
                "UPDATE compositions SET
                    total_versions =
                        (SELECT COUNT(*) FROM songs WHERE composition_id = compositions.id),
                    most_successful_song_id = (
                        SELECT id FROM songs WHERE composition_id = compositions.id
                        ORDER BY peak_rank, year, id LIMIT 1
                    )",
                [],
            )?)
        })
    }

    pub fn rebuild_tag_counts(&self) -> Result<usize> {
        self.catalog.database().transaction(|conn| {
            Ok(conn.execute(
                "UPDATE song_tags SET song_count =
                    (SELECT COUNT(*) FROM song_tag_relations WHERE tag_id = song_tags.id)",
                [],
            )?)
        })
    }

    pub fn rebuild_artist_counts(&self) -> Result<usize> {
        self.catalog.database().transaction(refresh_song_counts)
    }

    /// The rebuilt leaderboard in position order.
    pub fn current_hot100(&self) -> Result<Vec<CurrentHot100Entry>> {
        let conn = self.catalog.database().connection();
        let mut stmt = conn.prepare(
            "SELECT position, song_id, title, artist, last_week_position, position_change,
                    peak_rank, weeks_on_chart, chart_date
             FROM current_hot100 ORDER BY position",
        )?;
        let entries = stmt
            .query_map([], current_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// The rebuilt number-one list in position order.
    pub fn number_ones(&self) -> Result<Vec<NumberOneSong>> {
        let conn = self.catalog.database().connection();
        let mut stmt = conn.prepare(
            "SELECT position, song_id, title, artist, year, weeks_on_chart
             FROM number_one_songs ORDER BY position",
        )?;
        let songs = stmt
            .query_map([], |row| {
                Ok(NumberOneSong {
                    position: row.get(0)?,
                    song_id: SongId::new(row.get(1)?),
                    title: row.get(2)?,
                    artist: row.get(3)?,
                    year: row.get(4)?,
                    weeks_on_chart: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    /// Chart date the leaderboard was built from, `None` when empty.
    pub fn current_chart_date(&self) -> Result<Option<time::Date>> {
        Ok(self.current_hot100()?.first().map(|e| e.chart_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::models::{ChartRow, ChartSnapshot};
    use crate::reconcile::{ReconcileOptions, Reconciler};
    use time::macros::date;

    fn reconcile(catalog: &Catalog, snapshot: &ChartSnapshot) {
        Reconciler::new(catalog)
            .reconcile(snapshot, &ReconcileOptions::default())
            .unwrap();
    }

    fn two_weeks() -> Catalog {
        let catalog = Catalog::new(Database::in_memory().unwrap());
        reconcile(
            &catalog,
            &ChartSnapshot::new(
                date!(2024 - 01 - 06),
                vec![
                    ChartRow::new(1, "Lovin On Me", "Jack Harlow"),
                    ChartRow::new(2, "Cruel Summer", "Taylor Swift"),
                ],
            ),
        );
        reconcile(
            &catalog,
            &ChartSnapshot::new(
                date!(2024 - 01 - 13),
                vec![
                    ChartRow::new(1, "Cruel Summer", "Taylor Swift"),
                    ChartRow::new(2, "Lovin On Me", "Jack Harlow"),
                    ChartRow::new(3, "Lose Control", "Teddy Swims"),
                ],
            ),
        );
        catalog
    }

    #[test]
    fn empty_history_leaves_empty_leaderboard() {
        let catalog = Catalog::new(Database::in_memory().unwrap());
        let aggregates = Aggregates::new(&catalog);

        assert_eq!(aggregates.rebuild_current_hot100().unwrap(), 0);
        assert!(aggregates.current_hot100().unwrap().is_empty());
        assert_eq!(aggregates.current_chart_date().unwrap(), None);
    }

    #[test]
    fn leaderboard_uses_latest_week_and_previous_positions() {
        let catalog = two_weeks();
        let aggregates = Aggregates::new(&catalog);

        assert_eq!(aggregates.rebuild_current_hot100().unwrap(), 3);
        let board = aggregates.current_hot100().unwrap();

        assert_eq!(board[0].title, "Cruel Summer");
        assert_eq!(board[0].last_week_position, Some(2));
        assert_eq!(board[0].position_change, Some(1));
        assert_eq!(board[1].position_change, Some(-1));
        assert!(board[2].is_new_entry());
        assert_eq!(board[2].position_change, None);
        assert_eq!(board[2].chart_date, date!(2024 - 01 - 13));
    }

    #[test]
    fn reported_last_week_fills_in_on_a_fresh_catalog() {
        let catalog = Catalog::new(Database::in_memory().unwrap());
        reconcile(
            &catalog,
            &ChartSnapshot::new(
                date!(2024 - 01 - 13),
                vec![
                    ChartRow::new(1, "Cruel Summer", "Taylor Swift").with_last_week(Some(3)),
                    ChartRow::new(2, "Lose Control", "Teddy Swims"),
                ],
            ),
        );
        let aggregates = Aggregates::new(&catalog);

        aggregates.rebuild_current_hot100().unwrap();
        let board = aggregates.current_hot100().unwrap();

        assert_eq!(board[0].last_week_position, Some(3));
        assert_eq!(board[0].position_change, Some(2));
        assert_eq!(board[1].last_week_position, None);
    }

    #[test]
    fn stored_previous_week_wins_over_reported_position() {
        let catalog = two_weeks();
        reconcile(
            &catalog,
            &ChartSnapshot::new(
                date!(2024 - 01 - 13),
                vec![ChartRow::new(1, "Cruel Summer", "Taylor Swift").with_last_week(Some(9))],
            ),
        );
        let aggregates = Aggregates::new(&catalog);

        aggregates.rebuild_current_hot100().unwrap();

        assert_eq!(aggregates.current_hot100().unwrap()[0].last_week_position, Some(2));
    }

    #[test]
    fn number_ones_are_every_song_that_peaked_first() {
        let catalog = two_weeks();
        let aggregates = Aggregates::new(&catalog);

        assert_eq!(aggregates.rebuild_number_ones().unwrap(), 2);
        let titles: Vec<String> = aggregates
            .number_ones()
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Lovin On Me", "Cruel Summer"]);
    }

    #[test]
    fn rebuild_replaces_stale_rows() {
        let catalog = two_weeks();
        let aggregates = Aggregates::new(&catalog);
        catalog
            .database()
            .connection()
            .execute(
                "INSERT INTO current_hot100 (position, song_id, title, artist, peak_rank,
                                             weeks_on_chart, chart_date)
                 VALUES (100, 1, 'stale', 'stale', 1, 1, '1999-01-01')",
                [],
            )
            .unwrap();

        aggregates.rebuild_current_hot100().unwrap();

        assert_eq!(aggregates.current_hot100().unwrap().len(), 3);
    }

    #[test]
    fn rating_cache_is_repaired_from_ratings() {
        let catalog = two_weeks();
        let conn = catalog.database().connection();
        conn.execute("INSERT INTO users (id, username, created_at) VALUES (1, 'ana', 0)", [])
            .unwrap();
        conn.execute(
            "INSERT INTO ratings (user_id, song_id, score, created_at, updated_at)
             VALUES (1, 1, 9, 0, 0)",
            [],
        )
        .unwrap();
        conn.execute("UPDATE songs SET total_ratings = 42 WHERE id = 2", [])
            .unwrap();

        assert_eq!(Aggregates::new(&catalog).rebuild_ratings().unwrap(), 1);

        let rated = catalog.song(SongId::new(1)).unwrap().unwrap();
        assert_eq!(rated.average_user_score, Some(9.0));
        assert_eq!(rated.total_ratings, 1);
        assert_eq!(catalog.song(SongId::new(2)).unwrap().unwrap().total_ratings, 0);
    }
}

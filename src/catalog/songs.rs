use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use time::Date;

use super::{Catalog, date_column};
use crate::models::{
    ArtistId, ChartHistoryEntry, CompositionId, Song, SongId, format_chart_date,
};

pub(crate) const SONG_COLUMNS: &str = "id, title, artist, year, peak_rank, weeks_on_chart, slug, \
     match_key, review, spotify_url, youtube_url, image_url, average_user_score, total_ratings, \
     composition_id, is_original_recording, artist_id";

pub(crate) fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: SongId::new(row.get(0)?),
        title: row.get(1)?,
        artist: row.get(2)?,
        year: row.get(3)?,
        peak_rank: row.get(4)?,
        weeks_on_chart: row.get(5)?,
        slug: row.get(6)?,
        match_key: row.get(7)?,
        review: row.get(8)?,
        spotify_url: row.get(9)?,
        youtube_url: row.get(10)?,
        image_url: row.get(11)?,
        average_user_score: row.get(12)?,
        total_ratings: row.get(13)?,
        composition_id: row.get::<_, Option<i64>>(14)?.map(CompositionId::new),
        is_original_recording: row.get(15)?,
        artist_id: row.get::<_, Option<i64>>(16)?.map(ArtistId::new),
    })
}

/// Column values for a catalog entry seen for the first time.
#[derive(Debug, Clone)]
pub(crate) struct NewSong<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub year: i32,
    pub peak_rank: u32,
    pub weeks_on_chart: u32,
    pub slug: &'a str,
    pub match_key: &'a str,
    pub artist_slug: &'a str,
    pub image_url: Option<&'a str>,
}

/// Looks an entry up by its normalized `(title, artist)` match key.
///
/// Slugs are display identifiers only: distinct songs can fold to the same
/// slug (non-Latin titles, words shifting between title and artist).
pub(crate) fn find_song_by_identity(conn: &Connection, match_key: &str) -> Result<Option<Song>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SONG_COLUMNS} FROM songs WHERE match_key = ?1"),
            [match_key],
            song_from_row,
        )
        .optional()?)
}

/// First free slug among `base`, `base-2`, `base-3`, ...
pub(crate) fn unique_song_slug(conn: &Connection, base: &str) -> Result<String> {
    let base = if base.is_empty() { "song" } else { base };

    let mut candidate = base.to_string();
    let mut suffix = 2;
    loop {
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM songs WHERE slug = ?1)",
            [&candidate],
            |row| row.get(0),
        )?;
        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
}

pub(crate) fn insert_song(conn: &Connection, song: &NewSong<'_>, now: i64) -> Result<SongId> {
    conn.execute(
        "INSERT INTO songs (title, artist, year, peak_rank, weeks_on_chart, slug, match_key,
                            artist_slug, image_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            song.title,
            song.artist,
            song.year,
            song.peak_rank,
            song.weeks_on_chart,
            song.slug,
            song.match_key,
            song.artist_slug,
            song.image_url,
            now
        ],
    )
    .with_context(|| format!("failed to insert song '{}' by {}", song.title, song.artist))?;
    Ok(SongId::new(conn.last_insert_rowid()))
}

/// Writes merged chart statistics back to an existing entry.
pub(crate) fn update_chart_stats(conn: &Connection, song: &Song, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE songs
         SET year = ?2, peak_rank = ?3, weeks_on_chart = ?4, image_url = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            song.id.get(),
            song.year,
            song.peak_rank,
            song.weeks_on_chart,
            song.image_url,
            now
        ],
    )?;
    Ok(())
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<ChartHistoryEntry> {
    Ok(ChartHistoryEntry {
        song_id: SongId::new(row.get(0)?),
        chart_date: date_column(row, 1)?,
        rank: row.get(2)?,
        peak_rank: row.get(3)?,
        weeks_on_chart: row.get(4)?,
        last_week_rank: row.get(5)?,
    })
}

pub(crate) fn history_entry(
    conn: &Connection,
    song_id: SongId,
    chart_date: Date,
) -> Result<Option<ChartHistoryEntry>> {
    Ok(conn
        .query_row(
            "SELECT song_id, chart_date, rank, peak_rank, weeks_on_chart, last_week_rank
             FROM chart_history WHERE song_id = ?1 AND chart_date = ?2",
            params![song_id.get(), format_chart_date(chart_date)],
            history_from_row,
        )
        .optional()?)
}

pub(crate) fn insert_history(conn: &Connection, entry: &ChartHistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO chart_history (song_id, chart_date, rank, peak_rank, weeks_on_chart,
                                    last_week_rank)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.song_id.get(),
            format_chart_date(entry.chart_date),
            entry.rank,
            entry.peak_rank,
            entry.weeks_on_chart,
            entry.last_week_rank
        ],
    )?;
    Ok(())
}

/// Corrects the rank/peak/weeks recorded for an existing (song, date).
pub(crate) fn update_history(conn: &Connection, entry: &ChartHistoryEntry) -> Result<()> {
    conn.execute(
        "UPDATE chart_history
         SET rank = ?3, peak_rank = ?4, weeks_on_chart = ?5, last_week_rank = ?6
         WHERE song_id = ?1 AND chart_date = ?2",
        params![
            entry.song_id.get(),
            format_chart_date(entry.chart_date),
            entry.rank,
            entry.peak_rank,
            entry.weeks_on_chart,
            entry.last_week_rank
        ],
    )?;
    Ok(())
}

impl Catalog {
    /// Retrieves a catalog entry by id, `None` if absent.
    pub fn song(&self, id: SongId) -> Result<Option<Song>> {
        Ok(self
            .db
            .connection()
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1"),
                [id.get()],
                song_from_row,
            )
            .optional()?)
    }

    pub fn song_by_slug(&self, slug: &str) -> Result<Option<Song>> {
        Ok(self
            .db
            .connection()
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE slug = ?1"),
                [slug],
                song_from_row,
            )
            .optional()?)
    }

    /// Entries with no composition yet, worst peak first.
    ///
    /// `artist` filters by a case-insensitive substring of the credit.
    pub fn songs_without_composition(
        &self,
        artist: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Song>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLUMNS} FROM songs
             WHERE composition_id IS NULL
               AND (?1 IS NULL OR instr(lower(artist), lower(?1)) > 0)
             ORDER BY peak_rank DESC, id
             LIMIT ?2"
        ))?;
        let limit = limit.map_or(-1, |l| l as i64);
        let songs = stmt
            .query_map(params![artist, limit], song_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    /// Entries lacking a media link or a description, best peak first.
    ///
    /// With `force` every entry is a candidate, so existing values can be
    /// refreshed.
    pub fn songs_for_enrichment(&self, force: bool, limit: Option<usize>) -> Result<Vec<Song>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLUMNS} FROM songs
             WHERE ?1 OR spotify_url IS NULL OR spotify_url = '' OR review = ''
             ORDER BY peak_rank, id
             LIMIT ?2"
        ))?;
        let limit = limit.map_or(-1, |l| l as i64);
        let songs = stmt
            .query_map(params![force, limit], song_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    /// Entries in creation order.
    pub fn songs(&self, limit: Option<usize>) -> Result<Vec<Song>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLUMNS} FROM songs ORDER BY id LIMIT ?1"
        ))?;
        let limit = limit.map_or(-1, |l| l as i64);
        let songs = stmt
            .query_map([limit], song_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    pub fn song_count(&self) -> Result<u64> {
        let count: i64 =
            self.db
                .connection()
                .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Chart history of one entry, oldest first.
    pub fn history(&self, song_id: SongId) -> Result<Vec<ChartHistoryEntry>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT song_id, chart_date, rank, peak_rank, weeks_on_chart, last_week_rank
             FROM chart_history WHERE song_id = ?1 ORDER BY chart_date",
        )?;
        let entries = stmt
            .query_map([song_id.get()], history_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Most recent chart date with any history, `None` on an empty catalog.
    pub fn latest_chart_date(&self) -> Result<Option<Date>> {
        let text: Option<String> = self.db.connection().query_row(
            "SELECT MAX(chart_date) FROM chart_history",
            [],
            |row| row.get(0),
        )?;
        text.map(|t| {
            crate::models::parse_chart_date(&t)
                .with_context(|| format!("invalid chart date in history: {t}"))
        })
        .transpose()
    }

    /// Whether a chart for exactly `chart_date` has already been reconciled.
    pub fn is_chart_up_to_date(&self, chart_date: Date) -> Result<bool> {
        let exists: bool = self.db.connection().query_row(
            "SELECT EXISTS(SELECT 1 FROM chart_history WHERE chart_date = ?1)",
            [format_chart_date(chart_date)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Sets the media link, keeping an existing one unless `force`.
    ///
    /// Returns whether the row changed.
    pub fn fill_spotify_url(&self, id: SongId, url: &str, force: bool) -> Result<bool> {
        let changed = self.db.connection().execute(
            "UPDATE songs SET spotify_url = ?2, updated_at = ?4
             WHERE id = ?1 AND (spotify_url IS NULL OR spotify_url = '' OR ?3)
               AND spotify_url IS NOT ?2",
            params![id.get(), url, force, self.timestamp()],
        )?;
        Ok(changed > 0)
    }

    /// Sets the description, keeping an existing one unless `force`.
    pub fn fill_review(&self, id: SongId, review: &str, force: bool) -> Result<bool> {
        let changed = self.db.connection().execute(
            "UPDATE songs SET review = ?2, updated_at = ?4
             WHERE id = ?1 AND (review = '' OR ?3) AND review IS NOT ?2",
            params![id.get(), review, force, self.timestamp()],
        )?;
        Ok(changed > 0)
    }

    /// Distinct chart credits with how many entries carry each, most first.
    pub fn artist_credits(&self) -> Result<Vec<(String, u32)>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT artist, COUNT(*) FROM songs GROUP BY artist ORDER BY COUNT(*) DESC, artist",
        )?;
        let credits = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(credits)
    }
}

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Catalog;
use crate::models::{Composition, CompositionId, SongId, composition_slug};

const COMPOSITION_COLUMNS: &str = "id, title, original_writer, original_artist, original_year, \
     slug, is_traditional, musicbrainz_work_id, verified_source, total_versions, \
     most_successful_song_id";

fn composition_from_row(row: &Row<'_>) -> rusqlite::Result<Composition> {
    Ok(Composition {
        id: CompositionId::new(row.get(0)?),
        title: row.get(1)?,
        original_writer: row.get(2)?,
        original_artist: row.get(3)?,
        original_year: row.get(4)?,
        slug: row.get(5)?,
        is_traditional: row.get(6)?,
        musicbrainz_work_id: row.get(7)?,
        verified_source: row.get(8)?,
        total_versions: row.get(9)?,
        most_successful_song_id: row.get::<_, Option<i64>>(10)?.map(SongId::new),
    })
}

/// What cover detection learned about the work behind one recording.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositionDraft {
    pub title: String,
    pub original_writer: Option<String>,
    pub original_artist: Option<String>,
    pub original_year: Option<i32>,
    pub is_traditional: bool,
    pub musicbrainz_work_id: Option<String>,
    pub verified_source: Option<String>,
}

impl CompositionDraft {
    pub fn slug(&self) -> String {
        composition_slug(
            &self.title,
            self.original_writer.as_deref(),
            self.is_traditional,
        )
    }
}

/// Returns the composition with the draft's slug, creating it if needed.
///
/// An existing composition only has its empty fields filled.
fn get_or_create(conn: &Connection, draft: &CompositionDraft, now: i64) -> Result<CompositionId> {
    let slug = draft.slug();

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM compositions WHERE slug = ?1",
            [&slug],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE compositions SET
                original_writer = COALESCE(original_writer, ?2),
                original_artist = COALESCE(original_artist, ?3),
                original_year = COALESCE(original_year, ?4),
                musicbrainz_work_id = COALESCE(musicbrainz_work_id, ?5),
                verified_source = COALESCE(verified_source, ?6)
             WHERE id = ?1",
            params![
                id,
                draft.original_writer,
                draft.original_artist,
                draft.original_year,
                draft.musicbrainz_work_id,
                draft.verified_source
            ],
        )?;
        return Ok(CompositionId::new(id));
    }

    conn.execute(
        "INSERT INTO compositions (title, original_writer, original_artist, original_year, slug,
                                   is_traditional, musicbrainz_work_id, verified_source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            draft.title,
            draft.original_writer,
            draft.original_artist,
            draft.original_year,
            slug,
            draft.is_traditional,
            draft.musicbrainz_work_id,
            draft.verified_source,
            now
        ],
    )
    .with_context(|| format!("failed to create composition '{slug}'"))?;
    Ok(CompositionId::new(conn.last_insert_rowid()))
}

/// Recomputes version count and best-performing version.
///
/// Ties on peak go to the earliest year, then the lowest id.
fn update_statistics(conn: &Connection, id: CompositionId) -> Result<()> {
    conn.execute(
        "UPDATE compositions SET
            total_versions = (SELECT COUNT(*) FROM songs WHERE composition_id = ?1),
            most_successful_song_id = (
                SELECT id FROM songs WHERE composition_id = ?1
                ORDER BY peak_rank, year, id LIMIT 1
            )
         WHERE id = ?1",
        [id.get()],
    )?;
    Ok(())
}

impl Catalog {
    pub fn composition(&self, id: CompositionId) -> Result<Option<Composition>> {
        Ok(self
            .db
            .connection()
            .query_row(
                &format!("SELECT {COMPOSITION_COLUMNS} FROM compositions WHERE id = ?1"),
                [id.get()],
                composition_from_row,
            )
            .optional()?)
    }

    /// Attaches `song_id` as a version of the drafted composition.
    ///
    /// Runs in one transaction: get-or-create the composition, link the song
    /// with its original/cover flag, then refresh the statistics. A
    /// composition keeps at most one original recording, so a second
    /// original is stored as a non-original version.
    pub fn link_composition(
        &self,
        song_id: SongId,
        draft: &CompositionDraft,
        is_original: bool,
    ) -> Result<CompositionId> {
        let now = self.timestamp();
        self.db.transaction(|conn| {
            let id = get_or_create(conn, draft, now)?;

            let has_original: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM songs
                               WHERE composition_id = ?1 AND is_original_recording = 1 AND id != ?2)",
                params![id.get(), song_id.get()],
                |row| row.get(0),
            )?;

            conn.execute(
                "UPDATE songs SET composition_id = ?2, is_original_recording = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![song_id.get(), id.get(), is_original && !has_original, now],
            )?;

            update_statistics(conn, id)?;
            Ok(id)
        })
    }

    /// All versions of a composition, best peak first.
    pub fn composition_versions(&self, id: CompositionId) -> Result<Vec<SongId>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id FROM songs WHERE composition_id = ?1 ORDER BY peak_rank, year, id",
        )?;
        let ids = stmt
            .query_map([id.get()], |row| Ok(SongId::new(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Catalog, optional_date_column};
use crate::models::{
    Artist, ArtistId, ArtistProfile, RelationshipType, TagSource, format_chart_date,
};
use crate::normalize::slugify;

const ARTIST_COLUMNS: &str = "id, name, slug, nationality, birth_date, death_date, bio, \
     artist_type, is_active, musicbrainz_id, spotify_id, song_count";

fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<Artist> {
    let artist_type: Option<String> = row.get(7)?;
    Ok(Artist {
        id: ArtistId::new(row.get(0)?),
        name: row.get(1)?,
        slug: row.get(2)?,
        nationality: row.get(3)?,
        birth_date: optional_date_column(row, 4)?,
        death_date: optional_date_column(row, 5)?,
        bio: row.get::<_, Option<String>>(6)?.filter(|bio| !bio.is_empty()),
        artist_type: artist_type.and_then(|t| t.parse().ok()),
        is_active: row.get(8)?,
        musicbrainz_id: row.get(9)?,
        spotify_id: row.get(10)?,
        song_count: row.get(11)?,
    })
}

/// First free slug among `base`, `base-2`, `base-3`, ...
fn unique_artist_slug(conn: &Connection, name: &str) -> Result<String> {
    let base = match slugify(name) {
        s if s.is_empty() => "artist".to_string(),
        s => s,
    };

    let mut candidate = base.clone();
    let mut suffix = 2;
    loop {
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM artists WHERE slug = ?1)",
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

/// Returns the tag id for `name`, creating the tag if needed.
fn get_or_create_artist_tag(conn: &Connection, name: &str) -> Result<i64> {
    if let Some(id) = conn
        .query_row("SELECT id FROM artist_tags WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?
    {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO artist_tags (name, category) VALUES (?1, 'genre')",
        [name],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Recomputes every artist's cached song count.
pub(crate) fn refresh_song_counts(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE artists SET song_count =
            (SELECT COUNT(*) FROM songs WHERE songs.artist_id = artists.id)",
        [],
    )?)
}

impl Catalog {
    pub fn artist(&self, id: ArtistId) -> Result<Option<Artist>> {
        Ok(self
            .db
            .connection()
            .query_row(
                &format!("SELECT {ARTIST_COLUMNS} FROM artists WHERE id = ?1"),
                [id.get()],
                artist_from_row,
            )
            .optional()?)
    }

    /// Case-insensitive lookup by name.
    pub fn artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        Ok(self
            .db
            .connection()
            .query_row(
                &format!(
                    "SELECT {ARTIST_COLUMNS} FROM artists WHERE name = ?1 COLLATE NOCASE
                     ORDER BY id LIMIT 1"
                ),
                [name.trim()],
                artist_from_row,
            )
            .optional()?)
    }

    pub fn artist_by_musicbrainz_id(&self, musicbrainz_id: &str) -> Result<Option<Artist>> {
        Ok(self
            .db
            .connection()
            .query_row(
                &format!("SELECT {ARTIST_COLUMNS} FROM artists WHERE musicbrainz_id = ?1"),
                [musicbrainz_id],
                artist_from_row,
            )
            .optional()?)
    }

    /// Creates an artist identity with only a name and slug.
    pub fn create_artist(&self, name: &str) -> Result<Artist> {
        let name = name.trim();
        let now = self.timestamp();
        let id = self.db.transaction(|conn| {
            let slug = unique_artist_slug(conn, name)?;
            conn.execute(
                "INSERT INTO artists (name, slug, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![name, slug, now],
            )
            .with_context(|| format!("failed to create artist '{name}'"))?;
            Ok(ArtistId::new(conn.last_insert_rowid()))
        })?;

        self.artist(id)?
            .with_context(|| format!("artist {id} vanished after insert"))
    }

    /// Artists to enrich, most songs first.
    ///
    /// Without `force`, artists already carrying a registry id are left out.
    /// `name` filters by a case-insensitive substring.
    pub fn artists_for_enrichment(
        &self,
        force: bool,
        name: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Artist>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARTIST_COLUMNS} FROM artists
             WHERE (?1 OR musicbrainz_id IS NULL)
               AND (?2 IS NULL OR instr(lower(name), lower(?2)) > 0)
             ORDER BY song_count DESC, name
             LIMIT ?3"
        ))?;
        let limit = limit.map_or(-1, |l| l as i64);
        let artists = stmt
            .query_map(params![force, name, limit], artist_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    /// Links every unlinked entry credited exactly `credit` to `artist_id`.
    ///
    /// Returns the number of entries linked.
    pub fn link_songs_to_artist(&self, credit: &str, artist_id: ArtistId) -> Result<usize> {
        let linked = self.db.connection().execute(
            "UPDATE songs SET artist_id = ?2, updated_at = ?3
             WHERE artist = ?1 AND artist_id IS NULL",
            params![credit, artist_id.get(), self.timestamp()],
        )?;
        Ok(linked)
    }

    /// Number of entries with no artist identity yet.
    pub fn unlinked_song_count(&self) -> Result<u64> {
        let count: i64 = self.db.connection().query_row(
            "SELECT COUNT(*) FROM songs WHERE artist_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Copies registry data onto an artist.
    ///
    /// Each field is only written when empty, unless `force`. Returns whether
    /// anything changed.
    pub fn fill_artist_profile(
        &self,
        id: ArtistId,
        profile: &ArtistProfile,
        force: bool,
    ) -> Result<bool> {
        let Some(current) = self.artist(id)? else {
            anyhow::bail!("artist {id} not found");
        };

        let mut merged = current.clone();
        fill(&mut merged.nationality, profile.nationality.clone(), force);
        fill(&mut merged.birth_date, profile.birth_date, force);
        fill(&mut merged.death_date, profile.death_date, force);
        fill(&mut merged.bio, profile.bio.clone(), force);
        fill(&mut merged.artist_type, profile.artist_type, force);
        fill(
            &mut merged.musicbrainz_id,
            Some(profile.musicbrainz_id.clone()),
            force,
        );

        if merged == current {
            return Ok(false);
        }

        self.db.connection().execute(
            "UPDATE artists SET nationality = ?2, birth_date = ?3, death_date = ?4, bio = ?5,
                                artist_type = ?6, musicbrainz_id = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id.get(),
                merged.nationality,
                merged.birth_date.map(format_chart_date),
                merged.death_date.map(format_chart_date),
                merged.bio,
                merged.artist_type.map(|t| t.as_str()),
                merged.musicbrainz_id,
                self.timestamp()
            ],
        )?;
        Ok(true)
    }

    /// Attaches a tag to an artist, updating confidence if already attached.
    ///
    /// Returns whether the tag was newly attached.
    pub fn upsert_artist_tag(
        &self,
        artist_id: ArtistId,
        name: &str,
        confidence: f64,
        source: TagSource,
    ) -> Result<bool> {
        let name = name.trim().to_lowercase();
        self.db.transaction(|conn| {
            let tag_id = get_or_create_artist_tag(conn, &name)?;
            let attached: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM artist_tag_relations
                               WHERE artist_id = ?1 AND tag_id = ?2)",
                params![artist_id.get(), tag_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO artist_tag_relations (artist_id, tag_id, confidence, source)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (artist_id, tag_id)
                 DO UPDATE SET confidence = excluded.confidence, source = excluded.source",
                params![artist_id.get(), tag_id, confidence, source.as_str()],
            )?;
            Ok(!attached)
        })
    }

    /// Tag names and confidences for an artist, alphabetical.
    pub fn artist_tags(&self, artist_id: ArtistId) -> Result<Vec<(String, f64)>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT t.name, r.confidence FROM artist_tag_relations r
             JOIN artist_tags t ON t.id = r.tag_id
             WHERE r.artist_id = ?1 ORDER BY t.name",
        )?;
        let tags = stmt
            .query_map([artist_id.get()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Adds a directed edge unless it already exists or is a self-loop.
    ///
    /// Returns whether a new edge was stored.
    pub fn add_relationship(
        &self,
        from: ArtistId,
        to: ArtistId,
        relationship: RelationshipType,
        confidence: f64,
    ) -> Result<bool> {
        if from == to {
            return Ok(false);
        }
        let inserted = self.db.connection().execute(
            "INSERT OR IGNORE INTO artist_relationships
                (from_artist_id, to_artist_id, relationship_type, confidence)
             VALUES (?1, ?2, ?3, ?4)",
            params![from.get(), to.get(), relationship.as_str(), confidence],
        )?;
        Ok(inserted > 0)
    }

    /// Outgoing edges of an artist as (target, type), ordered by target.
    pub fn relationships_from(&self, from: ArtistId) -> Result<Vec<(ArtistId, RelationshipType)>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT to_artist_id, relationship_type FROM artist_relationships
             WHERE from_artist_id = ?1 ORDER BY to_artist_id, relationship_type",
        )?;
        let rows = stmt
            .query_map([from.get()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(to, label)| Some((ArtistId::new(to), label.parse().ok()?)))
            .collect())
    }
}

/// Fill-if-empty for one optional field.
fn fill<T>(slot: &mut Option<T>, value: Option<T>, force: bool) {
    if let Some(value) = value
        && (force || slot.is_none())
    {
        *slot = Some(value);
    }
}

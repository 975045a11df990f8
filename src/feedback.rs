//! User ratings, comments, bookmarks and song tags.
//!
//! Every rating write or delete recomputes the song's cached average and
//! count in the same transaction, so the cache never lags the ratings table.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use crate::catalog::Catalog;
use crate::models::{
    FeedbackError, Rating, RatingId, RatingSummary, Score, SongId, TagId, TagSource, UserId,
};
use crate::normalize::slugify;

/// Recomputes the cached rating average and count of one song.
pub(crate) fn refresh_rating_summary(conn: &Connection, song_id: SongId) -> Result<RatingSummary> {
    let (average, count): (Option<f64>, u32) = conn.query_row(
        "SELECT AVG(score), COUNT(*) FROM ratings WHERE song_id = ?1",
        [song_id.get()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let summary = RatingSummary::from_raw(average, count);

    conn.execute(
        "UPDATE songs SET average_user_score = ?2, total_ratings = ?3 WHERE id = ?1",
        params![song_id.get(), summary.average, summary.count],
    )?;
    Ok(summary)
}

fn ensure_song(conn: &Connection, song_id: SongId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM songs WHERE id = ?1)",
        [song_id.get()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(FeedbackError::UnknownSong(song_id).into())
    }
}

/// Feedback writes against a [`Catalog`].
///
/// # Examples
///
/// ```
/// use hot100::{Catalog, Database};
/// use hot100::feedback::Feedback;
///
/// # fn main() -> anyhow::Result<()> {
/// let catalog = Catalog::new(Database::in_memory()?);
/// let feedback = Feedback::new(&catalog);
///
/// let ana = feedback.ensure_user("ana")?;
/// assert_eq!(feedback.ensure_user(" ana ")?, ana);
/// # Ok(())
/// # }
/// ```
pub struct Feedback<'a> {
    catalog: &'a Catalog,
}

impl<'a> Feedback<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Returns the id of `username`, registering it on first use.
    pub fn ensure_user(&self, username: &str) -> Result<UserId> {
        let username = username.trim();
        if username.is_empty() {
            return Err(FeedbackError::EmptyUsername.into());
        }

        let now = self.catalog.timestamp();
        self.catalog.database().transaction(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
                params![username, now],
            )?;
            let id: i64 = conn.query_row(
                "SELECT id FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )?;
            Ok(UserId::new(id))
        })
    }

    /// Records `score` as the user's rating of the song, replacing any
    /// previous score, and returns the refreshed summary.
    pub fn rate(&self, user: UserId, song: SongId, score: Score) -> Result<RatingSummary> {
        let now = self.catalog.timestamp();
        let summary = self.catalog.database().transaction(|conn| {
            ensure_song(conn, song)?;
            conn.execute(
                "INSERT INTO ratings (user_id, song_id, score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (user_id, song_id)
                 DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at",
                params![user.get(), song.get(), score.get(), now],
            )?;
            refresh_rating_summary(conn, song)
        })?;

        tracing::debug!(%user, %song, score = score.get(), "rating saved");
        Ok(summary)
    }

    /// Deletes the user's rating of the song, if any, and returns the
    /// refreshed summary. Comments attached to it stay, unlinked.
    pub fn remove_rating(&self, user: UserId, song: SongId) -> Result<RatingSummary> {
        self.catalog.database().transaction(|conn| {
            ensure_song(conn, song)?;
            conn.execute(
                "DELETE FROM ratings WHERE user_id = ?1 AND song_id = ?2",
                params![user.get(), song.get()],
            )?;
            refresh_rating_summary(conn, song)
        })
    }

    pub fn rating(&self, user: UserId, song: SongId) -> Result<Option<Rating>> {
        let rating = self
            .catalog
            .database()
            .connection()
            .query_row(
                "SELECT id, score FROM ratings WHERE user_id = ?1 AND song_id = ?2",
                params![user.get(), song.get()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u8>(1)?)),
            )
            .optional()?;

        rating
            .map(|(id, score)| {
                Ok(Rating {
                    id: RatingId::new(id),
                    user_id: user,
                    song_id: song,
                    score: Score::new(score)?,
                })
            })
            .transpose()
    }

    /// Adds a comment, linked to the user's current rating of the song.
    pub fn add_comment(&self, user: UserId, song: SongId, body: &str) -> Result<i64> {
        let body = body.trim();
        if body.is_empty() {
            return Err(FeedbackError::EmptyComment.into());
        }

        let now = self.catalog.timestamp();
        self.catalog.database().transaction(|conn| {
            ensure_song(conn, song)?;
            let rating_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM ratings WHERE user_id = ?1 AND song_id = ?2",
                    params![user.get(), song.get()],
                    |row| row.get(0),
                )
                .optional()?;
            conn.execute(
                "INSERT INTO comments (user_id, song_id, rating_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user.get(), song.get(), rating_id, body, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Comment bodies on a song with their rating score, oldest first.
    pub fn comments(&self, song: SongId) -> Result<Vec<(String, Option<u8>)>> {
        let conn = self.catalog.database().connection();
        let mut stmt = conn.prepare(
            "SELECT c.body, r.score FROM comments c
             LEFT JOIN ratings r ON r.id = c.rating_id
             WHERE c.song_id = ?1 ORDER BY c.created_at, c.id",
        )?;
        let comments = stmt
            .query_map([song.get()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }

    /// Bookmarks the song, or removes an existing bookmark.
    ///
    /// Returns whether the song is bookmarked afterwards.
    pub fn toggle_bookmark(&self, user: UserId, song: SongId) -> Result<bool> {
        let now = self.catalog.timestamp();
        self.catalog.database().transaction(|conn| {
            ensure_song(conn, song)?;
            let removed = conn.execute(
                "DELETE FROM bookmarks WHERE user_id = ?1 AND song_id = ?2",
                params![user.get(), song.get()],
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO bookmarks (user_id, song_id, created_at) VALUES (?1, ?2, ?3)",
                params![user.get(), song.get(), now],
            )?;
            Ok(true)
        })
    }

    /// Bookmarked songs of a user, most recent first.
    pub fn bookmarks(&self, user: UserId) -> Result<Vec<SongId>> {
        let conn = self.catalog.database().connection();
        let mut stmt = conn.prepare(
            "SELECT song_id FROM bookmarks WHERE user_id = ?1 ORDER BY created_at DESC, song_id",
        )?;
        let ids = stmt
            .query_map([user.get()], |row| Ok(SongId::new(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Attaches a tag to a song, creating the tag on first use, and
    /// refreshes that tag's song count.
    pub fn tag_song(
        &self,
        song: SongId,
        name: &str,
        category: Option<&str>,
        source: TagSource,
    ) -> Result<TagId> {
        let name = name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(FeedbackError::EmptyTag.into());
        }

        self.catalog.database().transaction(|conn| {
            ensure_song(conn, song)?;
            conn.execute(
                "INSERT OR IGNORE INTO song_tags (name, slug, category) VALUES (?1, ?2, ?3)",
                params![name, slug, category],
            )?;
            let tag: i64 = conn.query_row(
                "SELECT id FROM song_tags WHERE name = ?1 OR slug = ?2 ORDER BY id LIMIT 1",
                params![name, slug],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO song_tag_relations (song_id, tag_id, source)
                 VALUES (?1, ?2, ?3)",
                params![song.get(), tag, source.as_str()],
            )?;
            conn.execute(
                "UPDATE song_tags SET song_count =
                    (SELECT COUNT(*) FROM song_tag_relations WHERE tag_id = ?1)
                 WHERE id = ?1",
                [tag],
            )?;
            Ok(TagId::new(tag))
        })
    }
}

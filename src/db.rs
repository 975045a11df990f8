pub mod migration;

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

/// Database wrapper providing connection management and schema migrations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens an in-memory SQLite database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist and applies any
    /// pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migration::apply_pending_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside `BEGIN`/`COMMIT`, rolling back if it returns an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use hot100::Database;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let failed: anyhow::Result<()> = db.transaction(|conn| {
    ///     conn.execute("INSERT INTO users (username, created_at) VALUES ('ana', 0)", [])?;
    ///     anyhow::bail!("abort");
    /// });
    /// assert!(failed.is_err());
    ///
    /// let users: i64 = db
    ///     .connection()
    ///     .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    /// assert_eq!(users, 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = &self.conn;
        conn.execute("BEGIN TRANSACTION", [])?;

        match f(conn) {
            Ok(value) => {
                conn.execute("COMMIT", [])?;
                Ok(value)
            }
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(db: &Database, kind: &str) -> Vec<String> {
        db.connection()
            .prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn in_memory_opens_successfully() {
        assert!(Database::in_memory().is_ok());
    }

    #[test]
    fn schema_tables_exist() {
        let db = Database::in_memory().unwrap();
        let tables = names(&db, "table");

        for table in [
            "songs",
            "chart_history",
            "compositions",
            "artists",
            "artist_tags",
            "artist_tag_relations",
            "artist_relationships",
            "users",
            "ratings",
            "comments",
            "bookmarks",
            "song_tags",
            "song_tag_relations",
            "current_hot100",
            "number_one_songs",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn schema_indexes_exist() {
        let db = Database::in_memory().unwrap();
        let indexes = names(&db, "index");

        assert!(indexes.contains(&"idx_songs_peak".to_string()));
        assert!(indexes.contains(&"idx_chart_history_date".to_string()));
        assert!(indexes.contains(&"idx_ratings_song".to_string()));
    }

    #[test]
    fn foreign_keys_enabled() {
        let db = Database::in_memory().unwrap();

        let fk_enabled: i32 = db
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();

        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn chart_history_rejects_duplicate_dates() {
        let db = Database::in_memory().unwrap();
        let conn = db.connection();
        conn.execute(
            "INSERT INTO songs (id, title, artist, year, peak_rank, weeks_on_chart, slug, match_key, artist_slug, created_at, updated_at)
             VALUES (1, 'Hello', 'Adele', 2015, 1, 1, 'adele-hello', 'hello::adele', 'adele', 0, 0)",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO chart_history (song_id, chart_date, rank, peak_rank, weeks_on_chart)
                      VALUES (1, '2015-11-14', 1, 1, 1)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn transaction_commits_on_success() {
        let db = Database::in_memory().unwrap();
        db.transaction(|conn| {
            conn.execute(
                "INSERT INTO users (username, created_at) VALUES ('bo', 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("hot100.db");

        assert!(Database::open(&db_path).is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("hot100.db");

        {
            let db = Database::open(&db_path).unwrap();
            db.connection()
                .execute(
                    "INSERT INTO users (username, created_at) VALUES ('cy', 0)",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&db_path).unwrap();
        let count: i32 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}

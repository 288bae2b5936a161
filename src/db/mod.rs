mod movies;
pub mod timeouts;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

pub use movies::{Genre, Movie, MovieStore, NOT_RANKED_VALUE, Ranking};
pub use timeouts::{DEFAULT_QUERY_TIMEOUT, QueryError};
pub use user::{NewUser, UserRecord, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(DEFAULT_QUERY_TIMEOUT)
            .connect(&url)
            .await?;

        let db = Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        };
        db.migrate().await?;
        Ok(db)
    }

    /// Override the per-query deadline.
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        if version < 2 {
            self.migrate_v2().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Users table
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT UNIQUE NOT NULL,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'USER',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_user_id ON users(user_id)",
                "CREATE INDEX idx_users_email ON users(email)",
                "CREATE TABLE user_favourite_genres (
                    user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                    genre_id INTEGER NOT NULL,
                    genre_name TEXT NOT NULL,
                    PRIMARY KEY (user_id, genre_id)
                )",
                // Catalog tables
                "CREATE TABLE genres (
                    genre_id INTEGER PRIMARY KEY,
                    genre_name TEXT UNIQUE NOT NULL
                )",
                "CREATE TABLE rankings (
                    ranking_value INTEGER PRIMARY KEY,
                    ranking_name TEXT UNIQUE NOT NULL
                )",
                "CREATE TABLE movies (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    imdb_id TEXT UNIQUE NOT NULL,
                    title TEXT NOT NULL,
                    poster_path TEXT NOT NULL DEFAULT '',
                    youtube_id TEXT NOT NULL DEFAULT '',
                    admin_review TEXT NOT NULL DEFAULT '',
                    ranking_value INTEGER NOT NULL DEFAULT 999,
                    ranking_name TEXT NOT NULL DEFAULT 'Not_Ranked'
                )",
                "CREATE INDEX idx_movies_ranking ON movies(ranking_value)",
                "CREATE TABLE movie_genres (
                    imdb_id TEXT NOT NULL REFERENCES movies(imdb_id) ON DELETE CASCADE,
                    genre_id INTEGER NOT NULL,
                    genre_name TEXT NOT NULL,
                    PRIMARY KEY (imdb_id, genre_id)
                )",
                "CREATE INDEX idx_movie_genres_name ON movie_genres(genre_name)",
            ],
        )
        .await
    }

    async fn migrate_v2(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            2,
            &[
                // Seed catalog reference data
                "INSERT INTO genres (genre_id, genre_name) VALUES
                    (1, 'Comedy'), (2, 'Drama'), (3, 'Western'), (4, 'Fantasy'),
                    (5, 'Thriller'), (6, 'Sci-Fi'), (7, 'Action'), (8, 'Mystery'),
                    (9, 'Crime')",
                "INSERT INTO rankings (ranking_value, ranking_name) VALUES
                    (1, 'Excellent'), (2, 'Good'), (3, 'Okay'), (4, 'Bad'),
                    (5, 'Terrible'), (999, 'Not_Ranked')",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone(), self.query_timeout)
    }

    /// Get the movie catalog store.
    pub fn movies(&self) -> MovieStore {
        MovieStore::new(self.pool.clone(), self.query_timeout)
    }
}

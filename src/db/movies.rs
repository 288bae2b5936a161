use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use std::time::Duration;

use super::timeouts::{QueryError, with_timeout};

/// Ranking value reserved for movies that have no review yet.
pub const NOT_RANKED_VALUE: i64 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Genre {
    pub genre_id: i64,
    pub genre_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ranking {
    pub ranking_value: i64,
    pub ranking_name: String,
}

impl Ranking {
    pub fn not_ranked() -> Self {
        Self {
            ranking_value: NOT_RANKED_VALUE,
            ranking_name: "Not_Ranked".to_string(),
        }
    }
}

impl Default for Ranking {
    fn default() -> Self {
        Self::not_ranked()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub imdb_id: String,
    pub title: String,
    pub poster_path: String,
    pub youtube_id: String,
    pub genre: Vec<Genre>,
    #[serde(default)]
    pub admin_review: String,
    #[serde(default)]
    pub ranking: Ranking,
}

#[derive(sqlx::FromRow)]
struct MovieRow {
    imdb_id: String,
    title: String,
    poster_path: String,
    youtube_id: String,
    admin_review: String,
    ranking_value: i64,
    ranking_name: String,
}

#[derive(sqlx::FromRow)]
struct MovieGenreRow {
    imdb_id: String,
    genre_id: i64,
    genre_name: String,
}

const MOVIE_COLUMNS: &str =
    "m.imdb_id, m.title, m.poster_path, m.youtube_id, m.admin_review, m.ranking_value, m.ranking_name";

/// Movie, genre and ranking catalog.
#[derive(Clone)]
pub struct MovieStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl MovieStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Attach genres to movie rows, keeping row order.
    async fn hydrate(&self, rows: Vec<MovieRow>) -> Result<Vec<Movie>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; rows.len()].join(", ");
        let query = format!(
            "SELECT imdb_id, genre_id, genre_name FROM movie_genres
             WHERE imdb_id IN ({}) ORDER BY genre_id",
            placeholders
        );
        let mut q = sqlx::query_as::<_, MovieGenreRow>(sqlx::AssertSqlSafe(query.as_str()));
        for row in &rows {
            q = q.bind(&row.imdb_id);
        }

        let mut genres: HashMap<String, Vec<Genre>> = HashMap::new();
        for g in q.fetch_all(&self.pool).await? {
            genres.entry(g.imdb_id).or_default().push(Genre {
                genre_id: g.genre_id,
                genre_name: g.genre_name,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| Movie {
                genre: genres.remove(&row.imdb_id).unwrap_or_default(),
                imdb_id: row.imdb_id,
                title: row.title,
                poster_path: row.poster_path,
                youtube_id: row.youtube_id,
                admin_review: row.admin_review,
                ranking: Ranking {
                    ranking_value: row.ranking_value,
                    ranking_name: row.ranking_name,
                },
            })
            .collect())
    }

    /// List every movie.
    pub async fn list(&self) -> Result<Vec<Movie>, QueryError> {
        with_timeout(self.timeout, async {
            let query = format!("SELECT {} FROM movies m ORDER BY m.id", MOVIE_COLUMNS);
            let rows: Vec<MovieRow> = sqlx::query_as(sqlx::AssertSqlSafe(query.as_str())).fetch_all(&self.pool).await?;
            self.hydrate(rows).await
        })
        .await
    }

    /// Get a movie by IMDB id.
    pub async fn get(&self, imdb_id: &str) -> Result<Option<Movie>, QueryError> {
        with_timeout(self.timeout, async {
            let query = format!("SELECT {} FROM movies m WHERE m.imdb_id = ?", MOVIE_COLUMNS);
            let row: Option<MovieRow> = sqlx::query_as(sqlx::AssertSqlSafe(query.as_str()))
                .bind(imdb_id)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
                None => Ok::<_, sqlx::Error>(None),
            }
        })
        .await
    }

    /// Insert a movie. Returns false if the IMDB id is already taken.
    pub async fn create(&self, movie: &Movie) -> Result<bool, QueryError> {
        with_timeout(self.timeout, async {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO movies
                 (imdb_id, title, poster_path, youtube_id, admin_review, ranking_value, ranking_name)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&movie.imdb_id)
            .bind(&movie.title)
            .bind(&movie.poster_path)
            .bind(&movie.youtube_id)
            .bind(&movie.admin_review)
            .bind(movie.ranking.ranking_value)
            .bind(&movie.ranking.ranking_name)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Ok(false);
            }

            for genre in &movie.genre {
                sqlx::query(
                    "INSERT OR IGNORE INTO movie_genres (imdb_id, genre_id, genre_name)
                     VALUES (?, ?, ?)",
                )
                .bind(&movie.imdb_id)
                .bind(genre.genre_id)
                .bind(&genre.genre_name)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok::<_, sqlx::Error>(true)
        })
        .await
    }

    /// Genre catalog.
    pub async fn genres(&self) -> Result<Vec<Genre>, QueryError> {
        with_timeout(
            self.timeout,
            sqlx::query_as("SELECT genre_id, genre_name FROM genres ORDER BY genre_id")
                .fetch_all(&self.pool),
        )
        .await
    }

    /// Ranking scale, best first.
    pub async fn rankings(&self) -> Result<Vec<Ranking>, QueryError> {
        with_timeout(
            self.timeout,
            sqlx::query_as(
                "SELECT ranking_value, ranking_name FROM rankings ORDER BY ranking_value",
            )
            .fetch_all(&self.pool),
        )
        .await
    }

    /// Movies sharing a genre with the user's favourites, best ranked first.
    pub async fn recommended_for(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Movie>, QueryError> {
        with_timeout(self.timeout, async {
            let query = format!(
                "SELECT {} FROM movies m
                 WHERE m.imdb_id IN (
                     SELECT mg.imdb_id FROM movie_genres mg
                     JOIN user_favourite_genres ufg ON ufg.genre_name = mg.genre_name
                     WHERE ufg.user_id = ?
                 )
                 ORDER BY m.ranking_value ASC, m.id ASC
                 LIMIT ?",
                MOVIE_COLUMNS
            );
            let rows: Vec<MovieRow> = sqlx::query_as(sqlx::AssertSqlSafe(query.as_str()))
                .bind(user_id)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;
            self.hydrate(rows).await
        })
        .await
    }

    /// Store an admin review and its ranking. Returns false if the movie doesn't exist.
    pub async fn update_review(
        &self,
        imdb_id: &str,
        admin_review: &str,
        ranking: &Ranking,
    ) -> Result<bool, QueryError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query(
                "UPDATE movies SET admin_review = ?, ranking_value = ?, ranking_name = ?
                 WHERE imdb_id = ?",
            )
            .bind(admin_review)
            .bind(ranking.ranking_value)
            .bind(&ranking.ranking_name)
            .bind(imdb_id)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

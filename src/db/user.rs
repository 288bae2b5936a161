use sqlx::sqlite::SqlitePool;
use std::time::Duration;

use super::movies::Genre;
use super::timeouts::{QueryError, with_timeout};
use crate::jwt::{Principal, Role};

/// User-record lookup/insert, keyed by email or user id.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
    timeout: Duration,
}

/// A stored user, including the credential hash checked at login.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
}

impl UserRecord {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
        }
    }
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    pub favourite_genres: Vec<Genre>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    role: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.user_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash,
            role: Role::from_db(&row.role),
        }
    }
}

const USER_COLUMNS: &str = "user_id, email, first_name, last_name, password_hash, role";

impl UserStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Insert a user together with their favourite genres.
    pub async fn create(&self, user: &NewUser) -> Result<(), QueryError> {
        with_timeout(self.timeout, async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO users (user_id, email, first_name, last_name, password_hash, role)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&user.user_id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .execute(&mut *tx)
            .await?;

            for genre in &user.favourite_genres {
                sqlx::query(
                    "INSERT OR IGNORE INTO user_favourite_genres (user_id, genre_id, genre_name)
                     VALUES (?, ?, ?)",
                )
                .bind(&user.user_id)
                .bind(genre.genre_id)
                .bind(&genre.genre_name)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await
        })
        .await
    }

    /// Check whether an email is already registered.
    pub async fn email_exists(&self, email: &str) -> Result<bool, QueryError> {
        let count: (i64,) = with_timeout(
            self.timeout,
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
                .bind(email)
                .fetch_one(&self.pool),
        )
        .await?;
        Ok(count.0 > 0)
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, QueryError> {
        let query = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row: Option<UserRow> = with_timeout(
            self.timeout,
            sqlx::query_as(sqlx::AssertSqlSafe(query.as_str())).bind(email).fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(UserRecord::from))
    }

    /// Get a user by user id.
    pub async fn get_by_user_id(&self, user_id: &str) -> Result<Option<UserRecord>, QueryError> {
        let query = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
        let row: Option<UserRow> = with_timeout(
            self.timeout,
            sqlx::query_as(sqlx::AssertSqlSafe(query.as_str()))
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(UserRecord::from))
    }

    /// Favourite genres of a user. Unknown users have none.
    pub async fn favourite_genres(&self, user_id: &str) -> Result<Vec<Genre>, QueryError> {
        with_timeout(
            self.timeout,
            sqlx::query_as(
                "SELECT genre_id, genre_name FROM user_favourite_genres
                 WHERE user_id = ? ORDER BY genre_id",
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await
    }
}

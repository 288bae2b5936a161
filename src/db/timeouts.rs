//! Bounded-duration query scope.
//!
//! Every store call runs inside `with_timeout`. When the deadline passes, the
//! query future is dropped, which returns its pooled connection and rolls back
//! any open transaction.

use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for database queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from a bounded query.
#[derive(Debug)]
pub enum QueryError {
    /// Operation timed out
    Timeout(Duration),
    /// Database error
    Database(sqlx::Error),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Timeout(d) => write!(f, "Database operation timed out after {:?}", d),
            QueryError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        QueryError::Database(e)
    }
}

/// Run `future` with a deadline.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, QueryError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(QueryError::Database(e)),
        Err(_) => Err(QueryError::Timeout(duration)),
    }
}

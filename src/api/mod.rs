mod error;
mod movies;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::auth::SessionCookieTransport;
use crate::db::Database;
use crate::jwt::TokenIssuer;
use crate::ranker::ReviewRanker;

pub use error::ApiError;
pub use session::hash_password;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    tokens: Arc<TokenIssuer>,
    cookies: SessionCookieTransport,
    ranker: Arc<dyn ReviewRanker>,
    recommended_limit: u32,
) -> Router {
    let session_state = session::SessionState {
        db: db.clone(),
        tokens: tokens.clone(),
        cookies,
    };

    let movies_state = movies::MoviesState {
        db,
        tokens,
        ranker,
        recommended_limit,
    };

    Router::new()
        .merge(session::router(session_state))
        .merge(movies::public_router(movies_state.clone()))
        .merge(movies::protected_router(movies_state))
}

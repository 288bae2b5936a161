//! Movie catalog endpoints.
//!
//! Public:
//! - GET `/movies` - List every movie
//! - GET `/genres` - Genre catalog
//!
//! Behind the auth gate:
//! - GET `/movie/{imdb_id}` - Get a movie
//! - POST `/addmovie` - Add a movie
//! - GET `/recommendedmovies` - Best ranked movies in the caller's favourite genres
//! - PATCH `/updatereview/{imdb_id}` - Set the admin review (ADMIN only)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ResultExt, validate_imdb_id};
use crate::auth::{Auth, auth_gate};
use crate::db::{Database, Movie};
use crate::jwt::{Role, TokenIssuer};
use crate::ranker::{ReviewRanker, ranking_for};

const MIN_TITLE_LENGTH: usize = 2;
const MAX_TITLE_LENGTH: usize = 500;

#[derive(Clone)]
pub struct MoviesState {
    pub db: Database,
    pub tokens: Arc<TokenIssuer>,
    pub ranker: Arc<dyn ReviewRanker>,
    pub recommended_limit: u32,
}

crate::impl_has_auth_backend!(MoviesState);

pub fn public_router(state: MoviesState) -> Router {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/genres", get(list_genres))
        .with_state(state)
}

pub fn protected_router(state: MoviesState) -> Router {
    Router::new()
        .route("/movie/{imdb_id}", get(get_movie))
        .route("/addmovie", post(add_movie))
        .route("/recommendedmovies", get(recommended_movies))
        .route("/updatereview/{imdb_id}", patch(update_review))
        .route_layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            auth_gate,
        ))
        .with_state(state)
}

#[derive(Serialize)]
struct AddMovieResponse {
    imdb_id: String,
}

#[derive(Deserialize)]
struct ReviewRequest {
    admin_review: String,
}

#[derive(Serialize)]
struct ReviewResponse {
    ranking_name: String,
    admin_review: String,
}

async fn list_movies(State(state): State<MoviesState>) -> Result<impl IntoResponse, ApiError> {
    let movies = state
        .db
        .movies()
        .list()
        .await
        .db_err("Error fetching movies")?;
    Ok(Json(movies))
}

async fn list_genres(State(state): State<MoviesState>) -> Result<impl IntoResponse, ApiError> {
    let genres = state
        .db
        .movies()
        .genres()
        .await
        .db_err("Error fetching genres")?;
    Ok(Json(genres))
}

async fn get_movie(
    State(state): State<MoviesState>,
    Path(imdb_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_imdb_id(&imdb_id)?;
    let movie = state
        .db
        .movies()
        .get(&imdb_id)
        .await
        .db_err("Error fetching movie")?
        .ok_or_else(|| ApiError::not_found("Movie not found"))?;
    Ok(Json(movie))
}

fn validate_movie(movie: &Movie) -> Result<(), ApiError> {
    validate_imdb_id(&movie.imdb_id)?;
    let title_len = movie.title.trim().chars().count();
    if !(MIN_TITLE_LENGTH..=MAX_TITLE_LENGTH).contains(&title_len) {
        return Err(ApiError::bad_request(format!(
            "Title must be between {} and {} characters",
            MIN_TITLE_LENGTH, MAX_TITLE_LENGTH
        )));
    }
    if url::Url::parse(&movie.poster_path).is_err() {
        return Err(ApiError::bad_request("poster_path must be a URL"));
    }
    if movie.youtube_id.trim().is_empty() {
        return Err(ApiError::bad_request("youtube_id is required"));
    }
    if movie.genre.is_empty() {
        return Err(ApiError::bad_request("At least one genre is required"));
    }
    Ok(())
}

async fn add_movie(
    State(state): State<MoviesState>,
    Auth(identity): Auth,
    Json(movie): Json<Movie>,
) -> Result<impl IntoResponse, ApiError> {
    validate_movie(&movie)?;

    let created = state
        .db
        .movies()
        .create(&movie)
        .await
        .db_err("Error adding movie")?;
    if !created {
        return Err(ApiError::conflict("Movie already exists"));
    }

    info!(imdb_id = %movie.imdb_id, user_id = %identity.user_id, "Movie added");
    Ok((
        StatusCode::CREATED,
        Json(AddMovieResponse {
            imdb_id: movie.imdb_id,
        }),
    ))
}

async fn recommended_movies(
    State(state): State<MoviesState>,
    Auth(identity): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let movies = state
        .db
        .movies()
        .recommended_for(&identity.user_id, state.recommended_limit)
        .await
        .db_err("Error fetching recommended movies")?;
    Ok(Json(movies))
}

async fn update_review(
    State(state): State<MoviesState>,
    Auth(identity): Auth,
    Path(imdb_id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_role(Role::Admin)?;
    validate_imdb_id(&imdb_id)?;

    let review = req.admin_review.trim();
    if review.is_empty() {
        return Err(ApiError::bad_request("admin_review is required"));
    }

    let movies = state.db.movies();
    if movies
        .get(&imdb_id)
        .await
        .db_err("Error fetching movie")?
        .is_none()
    {
        return Err(ApiError::not_found("Movie not found"));
    }

    let rankings = movies.rankings().await.db_err("Error getting rankings")?;
    let name = state.ranker.rank(review, &rankings).await.map_err(|e| {
        error!(imdb_id = %imdb_id, "Error getting review ranking: {}", e);
        ApiError::Internal("Error getting review ranking".into())
    })?;
    let ranking = ranking_for(&name, &rankings);

    if !movies
        .update_review(&imdb_id, review, &ranking)
        .await
        .db_err("Error updating movie")?
    {
        return Err(ApiError::not_found("Movie not found"));
    }

    info!(imdb_id = %imdb_id, ranking = %ranking.ranking_name, "Admin review updated");
    Ok(Json(ReviewResponse {
        ranking_name: ranking.ranking_name,
        admin_review: review.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Genre, Ranking};

    fn movie() -> Movie {
        Movie {
            imdb_id: "tt0111161".to_string(),
            title: "The Shawshank Redemption".to_string(),
            poster_path: "https://image.example/shawshank.jpg".to_string(),
            youtube_id: "PLl99DlL6b4".to_string(),
            genre: vec![Genre {
                genre_id: 2,
                genre_name: "Drama".to_string(),
            }],
            admin_review: String::new(),
            ranking: Ranking::not_ranked(),
        }
    }

    #[test]
    fn test_validate_movie() {
        assert!(validate_movie(&movie()).is_ok());

        let mut m = movie();
        m.title = "A".to_string();
        assert!(validate_movie(&m).is_err());

        let mut m = movie();
        m.poster_path = "not a url".to_string();
        assert!(validate_movie(&m).is_err());

        let mut m = movie();
        m.genre.clear();
        assert!(validate_movie(&m).is_err());
    }

    #[test]
    fn test_movie_defaults_when_deserialized() {
        let m: Movie = serde_json::from_str(
            r#"{"imdb_id":"tt1","title":"Up","poster_path":"https://x/p.jpg",
                "youtube_id":"y","genre":[{"genre_id":1,"genre_name":"Comedy"}]}"#,
        )
        .unwrap();
        assert_eq!(m.ranking, Ranking::not_ranked());
        assert!(m.admin_review.is_empty());
    }
}

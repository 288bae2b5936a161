//! Session endpoints.
//!
//! - POST `/register` - Create a USER account
//! - POST `/login` - Verify a password and set the credential cookies
//! - POST `/refresh` - Exchange the refresh cookie for a brand-new pair
//! - POST `/logout` - Clear both cookies

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ApiError, ResultExt};
use crate::auth::{AuthError, REFRESH_COOKIE_NAME, SessionCookieTransport, get_cookie};
use crate::db::{Database, Genre, NewUser};
use crate::jwt::{Principal, Role, TokenIssuer};

/// bcrypt cost factor for new accounts.
const BCRYPT_COST: u32 = 10;

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub tokens: Arc<TokenIssuer>,
    pub cookies: SessionCookieTransport,
}

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    #[serde(default)]
    favourite_genres: Vec<Genre>,
}

#[derive(Serialize)]
struct RegisterResponse {
    user_id: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Login body: the principal and its favourite genres, never the raw tokens.
#[derive(Serialize)]
struct LoginResponse {
    #[serde(flatten)]
    principal: Principal,
    favourite_genres: Vec<Genre>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    for (field, value) in [("first_name", &req.first_name), ("last_name", &req.last_name)] {
        let value = value.trim();
        if value.is_empty() {
            return Err(ApiError::bad_request(format!("{} is required", field)));
        }
        if value.len() > MAX_NAME_LENGTH {
            return Err(ApiError::bad_request(format!("{} is too long", field)));
        }
    }
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if req.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Hash a password with bcrypt off the async runtime.
pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .internal_err("Password hashing task failed")?
        .internal_err("Error hashing password")
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .internal_err("Password verification task failed")?
        .or_else(|e| {
            // A corrupt stored hash is treated as a mismatch.
            debug!(error = %e, "Stored password hash rejected");
            Ok(false)
        })
}

async fn register(
    State(state): State<SessionState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_registration(&req)?;

    let email = req.email.trim().to_string();
    if state
        .db
        .users()
        .email_exists(&email)
        .await
        .db_err("Failed to check existing user")?
    {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = hash_password(req.password, BCRYPT_COST).await?;
    let user = NewUser {
        user_id: uuid::Uuid::new_v4().to_string(),
        email,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        password_hash,
        role: Role::User,
        favourite_genres: req.favourite_genres,
    };

    state
        .db
        .users()
        .create(&user)
        .await
        .db_err("Failed to create user")?;

    info!(user_id = %user.user_id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.user_id,
        }),
    ))
}

async fn login(
    State(state): State<SessionState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_email(req.email.trim())
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let pair = state
        .tokens
        .mint(&user.principal())
        .map_err(|e| ApiError::internal_error("Error generating tokens", e))?;

    let favourite_genres = state
        .db
        .users()
        .favourite_genres(&user.user_id)
        .await
        .db_err("Failed to load favourite genres")?;

    info!(user_id = %user.user_id, "User logged in");
    Ok((
        StatusCode::OK,
        state
            .cookies
            .set_pair(&pair.access_token, &pair.refresh_token),
        Json(LoginResponse {
            principal: user.principal(),
            favourite_genres,
        }),
    ))
}

/// Rotate the credential pair. On any failure the cookies are left untouched.
async fn refresh(
    State(state): State<SessionState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingCredential)?;

    let claimed = state.tokens.verify_refresh(token).map_err(|e| {
        debug!(error = %e, "Refresh credential rejected");
        AuthError::from_refresh(e)
    })?;

    // Re-read the user so the new pair reflects the current record.
    let user = state
        .db
        .users()
        .get_by_user_id(&claimed.user_id)
        .await
        .db_err("Failed to look up user")?
        .ok_or(AuthError::RefreshInvalid)?;

    let pair = state
        .tokens
        .mint(&user.principal())
        .map_err(|e| ApiError::internal_error("Error updating tokens", e))?;

    debug!(user_id = %user.user_id, "Credentials rotated");
    Ok((
        StatusCode::OK,
        state
            .cookies
            .set_pair(&pair.access_token, &pair.refresh_token),
        Json(MessageResponse {
            message: "Tokens refreshed",
        }),
    ))
}

async fn logout(State(state): State<SessionState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        state.cookies.clear_pair(),
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            favourite_genres: Vec::new(),
        }
    }

    #[test]
    fn test_registration_validation() {
        assert!(validate_registration(&request("a@x.com", "secret")).is_ok());
        assert!(validate_registration(&request("ax.com", "secret")).is_err());
        assert!(validate_registration(&request("a@x.com", "short")).is_err());

        let mut blank_name = request("a@x.com", "secret");
        blank_name.first_name = "  ".to_string();
        assert!(validate_registration(&blank_name).is_err());
    }

    #[tokio::test]
    async fn test_password_hash_round_trip() {
        let hash = hash_password("hunter22".to_string(), 4).await.unwrap();
        assert!(verify_password("hunter22".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_hash_is_mismatch() {
        let result = verify_password("pw".to_string(), "not-a-hash".to_string()).await;
        assert!(matches!(result, Ok(false)));
    }
}

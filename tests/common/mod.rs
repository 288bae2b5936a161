#![allow(dead_code)]

use axum::body::Body;
use futures::future::BoxFuture;
use magicstream::{
    ServerConfig,
    auth::DeploymentMode,
    create_app,
    db::{Database, Genre, Movie, NewUser, Ranking},
    jwt::{Principal, Role, TokenIssuer},
    ranker::{RankerError, ReviewRanker},
};
use std::sync::Arc;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";

/// Ranker that always answers with the same ranking name.
pub struct StubRanker(pub &'static str);

impl ReviewRanker for StubRanker {
    fn rank<'a>(
        &'a self,
        _review: &'a str,
        _rankings: &'a [Ranking],
    ) -> BoxFuture<'a, Result<String, RankerError>> {
        Box::pin(async move { Ok(self.0.to_string()) })
    }
}

pub fn test_config(db: Database, mode: DeploymentMode) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        mode,
        allowed_origins: vec!["http://localhost:5173".to_string()],
        recommended_movies_limit: 5,
        ranker: Arc::new(StubRanker("Good")),
    }
}

/// Issuer sharing the test app's secrets, for minting credentials directly.
pub fn test_issuer() -> TokenIssuer {
    TokenIssuer::new(ACCESS_SECRET, REFRESH_SECRET).expect("valid test secrets")
}

/// Create a test app and return (app, db).
pub async fn create_test_app() -> (axum::Router, Database) {
    create_test_app_with(|_| {}).await
}

/// Create a test app after adjusting its configuration.
pub async fn create_test_app_with(adjust: impl FnOnce(&mut ServerConfig)) -> (axum::Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = test_config(db.clone(), DeploymentMode::Development);
    adjust(&mut config);
    let app = create_app(&config).expect("Failed to create app");
    (app, db)
}

pub fn genre(id: i64, name: &str) -> Genre {
    Genre {
        genre_id: id,
        genre_name: name.to_string(),
    }
}

/// Store a user whose password is `password`, and return its principal.
pub async fn create_user(
    db: &Database,
    email: &str,
    password: &str,
    role: Role,
    favourite_genres: Vec<Genre>,
) -> Principal {
    let user = NewUser {
        user_id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        first_name: "Alice".to_string(),
        last_name: "Liddell".to_string(),
        password_hash: bcrypt::hash(password, 4).expect("hash"),
        role,
        favourite_genres,
    };
    db.users().create(&user).await.expect("create user");
    Principal {
        user_id: user.user_id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        role,
    }
}

pub async fn create_movie(db: &Database, imdb_id: &str, genres: Vec<Genre>, ranking: (i64, &str)) {
    let movie = Movie {
        imdb_id: imdb_id.to_string(),
        title: format!("Movie {}", imdb_id),
        poster_path: format!("https://image.example/{}.jpg", imdb_id),
        youtube_id: "dQw4w9WgXcQ".to_string(),
        genre: genres,
        admin_review: String::new(),
        ranking: Ranking {
            ranking_value: ranking.0,
            ranking_name: ranking.1.to_string(),
        },
    };
    assert!(db.movies().create(&movie).await.expect("create movie"));
}

pub fn extract_set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of the named cookie among `Set-Cookie` headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let (pair, _) = c.split_once(';').unwrap_or((c, ""));
        let (n, v) = pair.split_once('=')?;
        (n.trim() == name).then(|| v.trim().to_string())
    })
}

pub fn auth_cookies(access_token: &str, refresh_token: &str) -> String {
    format!(
        "access_token={}; refresh_token={}",
        access_token, refresh_token
    )
}

pub async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

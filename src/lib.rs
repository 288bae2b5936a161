pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod ranker;

use api::create_api_router;
use auth::{DeploymentMode, SessionCookieTransport};
use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use db::Database;
use jwt::{SigningError, TokenIssuer};
use ranker::ReviewRanker;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Default number of movies returned by `/recommendedmovies`.
pub const DEFAULT_RECOMMENDED_MOVIES_LIMIT: u32 = 5;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret signing access credentials
    pub access_secret: Vec<u8>,
    /// Secret signing refresh credentials, distinct from the access secret
    pub refresh_secret: Vec<u8>,
    /// Selects the Secure/SameSite cookie flags
    pub mode: DeploymentMode,
    /// Origins allowed to make credentialed cross-origin requests
    pub allowed_origins: Vec<String>,
    /// Maximum number of recommended movies
    pub recommended_movies_limit: u32,
    /// Classifies admin reviews into rankings
    pub ranker: Arc<dyn ReviewRanker>,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    message: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Server is running",
    })
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) if value != "*" => Some(value),
            _ => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_LENGTH])
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, SigningError> {
    let tokens = Arc::new(TokenIssuer::new(
        &config.access_secret,
        &config.refresh_secret,
    )?);
    let cookies = SessionCookieTransport::new(config.mode);

    let api_router = create_api_router(
        config.db.clone(),
        tokens,
        cookies,
        config.ranker.clone(),
        config.recommended_movies_limit,
    );

    Ok(Router::new()
        .route("/health", get(health))
        .merge(api_router)
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http()))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}

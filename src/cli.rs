//! CLI argument parsing, validation, and startup helpers.

use crate::auth::DeploymentMode;
use crate::db::{DEFAULT_QUERY_TIMEOUT, Database};
use crate::{DEFAULT_RECOMMENDED_MOVIES_LIMIT, ServerConfig};
use crate::ranker::{
    ChatCompletionRanker, DEFAULT_PROMPT_TEMPLATE, DEFAULT_RANKER_MODEL, DEFAULT_RANKER_URL,
    ReviewRanker, UnconfiguredRanker,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const MIN_SECRET_LENGTH: usize = 32;

const ACCESS_SECRET_ENV: &str = "SECRET_KEY";
const REFRESH_SECRET_ENV: &str = "SECRET_REFRESH_KEY";
const RANKER_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "MagicStream",
    about = "Movie catalog server with cookie-based session authentication"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "magicstream.db")]
    pub database: String,

    /// Deployment mode; production sets Secure and SameSite=None on cookies
    #[arg(long = "env", env = "ENV", value_enum, default_value = "development")]
    pub mode: DeploymentMode,

    /// Path to file containing the access signing secret. Prefer the SECRET_KEY env var
    #[arg(long)]
    pub secret_key_file: Option<String>,

    /// Path to file containing the refresh signing secret. Prefer the SECRET_REFRESH_KEY env var
    #[arg(long)]
    pub secret_refresh_key_file: Option<String>,

    /// Comma-separated origins allowed to make credentialed requests
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub allowed_origins: Vec<String>,

    /// Maximum number of movies returned by /recommendedmovies
    #[arg(long, env = "RECOMMENDED_MOVIES_LIMIT", default_value_t = DEFAULT_RECOMMENDED_MOVIES_LIMIT)]
    pub recommended_movies_limit: u32,

    /// Deadline for a single database query, in seconds
    #[arg(long, env = "QUERY_TIMEOUT_SECS", default_value_t = DEFAULT_QUERY_TIMEOUT.as_secs())]
    pub query_timeout_secs: u64,

    /// Base URL of the OpenAI-compatible review ranking API
    #[arg(long, env = "RANKER_URL", default_value = DEFAULT_RANKER_URL)]
    pub ranker_url: String,

    /// Model used to rank reviews
    #[arg(long, env = "RANKER_MODEL", default_value = DEFAULT_RANKER_MODEL)]
    pub ranker_model: String,

    /// Prompt prefix for review ranking; `{rankings}` is replaced by the ranking names
    #[arg(long, env = "BASE_PROMPT_TEMPLATE", default_value = DEFAULT_PROMPT_TEMPLATE)]
    pub prompt_template: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a variable and remove it from the environment.
fn take_env(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    // SAFETY: called during single-threaded startup, before the runtime
    // spawns any task that reads the environment.
    unsafe { std::env::remove_var(name) };
    Some(value)
}

/// Load one signing secret from its environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, file: Option<&str>) -> Option<String> {
    let secret = if let Some(secret) = take_env(env_var) {
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!("{} is required. Set the environment variable or use a secret file", env_var);
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets. They must differ.
pub fn load_signing_secrets(
    access_file: Option<&str>,
    refresh_file: Option<&str>,
) -> Option<(String, String)> {
    let access = load_secret(ACCESS_SECRET_ENV, access_file)?;
    let refresh = load_secret(REFRESH_SECRET_ENV, refresh_file)?;

    if access == refresh {
        error!(
            "{} and {} must be different",
            ACCESS_SECRET_ENV, REFRESH_SECRET_ENV
        );
        return None;
    }

    Some((access, refresh))
}

/// Build the review ranker. Without an API key, review updates fail at request time.
pub fn build_ranker(args: &Args) -> Arc<dyn ReviewRanker> {
    match take_env(RANKER_API_KEY_ENV).filter(|key| !key.is_empty()) {
        Some(api_key) => Arc::new(ChatCompletionRanker::new(
            args.ranker_url.clone(),
            args.ranker_model.clone(),
            api_key,
            args.prompt_template.clone(),
        )),
        None => {
            warn!(
                "{} is not set; review ranking is disabled",
                RANKER_API_KEY_ENV
            );
            Arc::new(UnconfiguredRanker)
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
    ranker: Arc<dyn ReviewRanker>,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        mode: args.mode,
        allowed_origins: args.allowed_origins.clone(),
        recommended_movies_limit: args.recommended_movies_limit,
        ranker,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str, query_timeout: Duration) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, query_timeout = ?query_timeout, "Database opened");
            Some(db.with_query_timeout(query_timeout))
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

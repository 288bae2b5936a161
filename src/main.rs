use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use magicstream::cli::{
    Args, build_config, build_ranker, init_logging, load_signing_secrets, open_database,
};
use magicstream::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some((access_secret, refresh_secret)) = load_signing_secrets(
        args.secret_key_file.as_deref(),
        args.secret_refresh_key_file.as_deref(),
    ) else {
        std::process::exit(1);
    };

    let ranker = build_ranker(&args);

    let Some(db) = open_database(
        &args.database,
        Duration::from_secs(args.query_timeout_secs),
    )
    .await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let config = build_config(&args, db, access_secret, refresh_secret, ranker);
    let app = create_app(&config).unwrap_or_else(|e| {
        error!(error = %e, "Invalid signing configuration");
        std::process::exit(1);
    });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, mode = ?args.mode, "Listening"),
        Err(_) => info!(address = %addr, mode = ?args.mode, "Listening"),
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

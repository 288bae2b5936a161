//! End-to-end tests of the session client against a running server.

mod common;

use common::{create_movie, create_user, genre, test_config};
use futures::future::join_all;
use magicstream::{
    auth::DeploymentMode,
    client::{HttpTransport, RefreshError, RefreshPhase, SessionClient, SessionError},
    db::{Database, Movie},
    jwt::Role,
    start_server,
};
use reqwest::cookie::Jar;
use std::sync::Arc;

async fn start() -> (SessionClient<HttpTransport>, Arc<Jar>, url::Url) {
    let db = Database::open(":memory:").await.unwrap();
    create_user(&db, "a@x.com", "p", Role::User, vec![genre(2, "Drama")]).await;
    create_movie(&db, "tt1", vec![genre(2, "Drama")], (2, "Good")).await;
    create_movie(&db, "tt2", vec![genre(1, "Comedy")], (1, "Excellent")).await;

    let (_handle, addr) = start_server(test_config(db, DeploymentMode::Development), 0)
        .await
        .unwrap();
    let base_url = format!("http://{}", addr);
    let jar = Arc::new(Jar::default());
    let transport = HttpTransport::with_jar(&base_url, jar.clone()).unwrap();
    let url = transport.base_url().clone();
    (SessionClient::new(transport), jar, url)
}

fn ids(movies: &[Movie]) -> Vec<&str> {
    movies.iter().map(|m| m.imdb_id.as_str()).collect()
}

#[tokio::test]
async fn test_login_then_protected_request() {
    let (client, _jar, _url) = start().await;

    let profile = client.login("a@x.com", "p").await.unwrap();
    assert_eq!(profile.principal.email, "a@x.com");
    assert_eq!(profile.favourite_genres[0].genre_name, "Drama");
    assert_eq!(client.current_principal(), Some(profile.principal));

    let movies: Vec<Movie> = client.get_json("/recommendedmovies").await.unwrap();
    assert_eq!(ids(&movies), vec!["tt1"]);
    assert_eq!(client.coordinator().generation(), 0);
}

#[tokio::test]
async fn test_rejected_access_is_renewed_transparently() {
    let (client, jar, url) = start().await;
    client.login("a@x.com", "p").await.unwrap();

    jar.add_cookie_str("access_token=garbage; Path=/", &url);

    let results = join_all((0..5).map(|_| client.get_json::<Vec<Movie>>("/recommendedmovies"))).await;
    for result in results {
        assert_eq!(ids(&result.unwrap()), vec!["tt1"]);
    }
    assert_eq!(client.coordinator().generation(), 1);
    assert_eq!(client.coordinator().phase(), RefreshPhase::Idle);
    assert!(client.current_principal().is_some());
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let (client, _jar, _url) = start().await;
    client.login("a@x.com", "p").await.unwrap();
    client.logout().await.unwrap();
    assert_eq!(client.current_principal(), None);

    let err = client
        .get_json::<Vec<Movie>>("/recommendedmovies")
        .await
        .unwrap_err();
    assert!(err.requires_login());
    assert!(matches!(
        err,
        SessionError::Refresh(RefreshError::Rejected(ref m)) if m == "no credential found"
    ));
}

#[tokio::test]
async fn test_wrong_password() {
    let (client, _jar, _url) = start().await;

    let err = client.login("a@x.com", "nope").await.unwrap_err();
    assert!(matches!(err, SessionError::Unauthorized(ref m) if m == "Invalid email or password"));
    assert_eq!(client.current_principal(), None);
    assert_eq!(client.coordinator().generation(), 0);
}

#[tokio::test]
async fn test_public_routes_need_no_session() {
    let (client, _jar, _url) = start().await;

    let movies: Vec<Movie> = client.get_json("/movies").await.unwrap();
    assert_eq!(movies.len(), 2);
}

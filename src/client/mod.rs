//! Client side of the session protocol.
//!
//! `SessionClient` wraps a `Transport`. A request that fails with `401` is
//! renewed through `/refresh` once, via the session's `RefreshCoordinator`,
//! and then replayed with the retry marker set. A failed renewal ends the
//! session: the cached identity is dropped and the caller must log in again.

mod coordinator;
mod transport;

pub use coordinator::{DEFAULT_RENEWAL_TIMEOUT, RefreshCoordinator, RefreshError, RefreshPhase};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};

use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::db::Genre;
use crate::jwt::Principal;

pub const LOGIN_PATH: &str = "/login";
pub const REFRESH_PATH: &str = "/refresh";
pub const LOGOUT_PATH: &str = "/logout";

/// Body returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginProfile {
    #[serde(flatten)]
    pub principal: Principal,
    #[serde(default)]
    pub favourite_genres: Vec<Genre>,
}

#[derive(Debug)]
pub enum SessionError {
    Transport(TransportError),
    /// Renewal failed; the session is over.
    Refresh(RefreshError),
    /// Rejected with `401` without a renewal being possible or useful.
    Unauthorized(String),
    /// Any other non-success status.
    Status(StatusCode, String),
    Decode(serde_json::Error),
}

impl SessionError {
    /// Whether the caller should send the user back to login.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            SessionError::Refresh(_) | SessionError::Unauthorized(_)
        )
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Transport(e) => write!(f, "{}", e),
            SessionError::Refresh(e) => write!(f, "Session expired: {}", e),
            SessionError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            SessionError::Status(status, msg) => write!(f, "Request failed ({}): {}", status, msg),
            SessionError::Decode(e) => write!(f, "Invalid response body: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        SessionError::Transport(e)
    }
}

impl From<RefreshError> for SessionError {
    fn from(e: RefreshError) -> Self {
        SessionError::Refresh(e)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Decode(e)
    }
}

fn failure_message(response: &ApiResponse) -> String {
    response
        .error_message()
        .unwrap_or_else(|| response.status.to_string())
}

/// One logical client session.
pub struct SessionClient<T> {
    transport: T,
    coordinator: RefreshCoordinator,
    identity: Mutex<Option<Principal>>,
}

impl<T: Transport> SessionClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_renewal_timeout(transport, DEFAULT_RENEWAL_TIMEOUT)
    }

    pub fn with_renewal_timeout(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            coordinator: RefreshCoordinator::new(timeout),
            identity: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    fn identity(&self) -> MutexGuard<'_, Option<Principal>> {
        self.identity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The principal of the last successful login, until the session ends.
    pub fn current_principal(&self) -> Option<Principal> {
        self.identity().clone()
    }

    fn clear_identity(&self) {
        self.identity().take();
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginProfile, SessionError> {
        #[derive(Serialize)]
        struct Credentials<'a> {
            email: &'a str,
            password: &'a str,
        }

        let request = ApiRequest::post(LOGIN_PATH).json(&Credentials { email, password })?;
        let response = self.transport.send(&request).await?;
        match response.status {
            s if s.is_success() => {
                let profile: LoginProfile = response.json()?;
                self.coordinator.begin_session();
                *self.identity() = Some(profile.principal.clone());
                info!(user_id = %profile.principal.user_id, "Logged in");
                Ok(profile)
            }
            StatusCode::UNAUTHORIZED => Err(SessionError::Unauthorized(failure_message(&response))),
            status => Err(SessionError::Status(status, failure_message(&response))),
        }
    }

    /// Clear the credential cookies. The local identity is dropped even if the call fails.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.clear_identity();
        let response = self.transport.send(&ApiRequest::post(LOGOUT_PATH)).await?;
        if !response.status.is_success() {
            return Err(SessionError::Status(
                response.status,
                failure_message(&response),
            ));
        }
        Ok(())
    }

    /// Ask the server for a fresh pair. Never renews itself.
    async fn refresh_call(&self) -> Result<(), RefreshError> {
        let response = self
            .transport
            .send(&ApiRequest::post(REFRESH_PATH))
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        match response.status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(RefreshError::Rejected(failure_message(&response))),
            status => Err(RefreshError::Unexpected(status)),
        }
    }

    /// Send a request, renewing the credential pair once if it is rejected with `401`.
    ///
    /// Non-401 responses are returned as they are, whatever their status.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let observed = self.coordinator.generation();
        let response = self.transport.send(&request).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if request.path == REFRESH_PATH {
            // The renewal call itself failed: no recursion, the session is over.
            self.clear_identity();
            return Err(RefreshError::Rejected(failure_message(&response)).into());
        }
        if request.is_retry() || request.path == LOGIN_PATH {
            return Err(SessionError::Unauthorized(failure_message(&response)));
        }

        debug!(path = %request.path, "Request rejected with 401, renewing credentials");
        if let Err(e) = self
            .coordinator
            .renew(observed, || self.refresh_call())
            .await
        {
            self.clear_identity();
            return Err(e.into());
        }

        let retry = request.into_retry();
        let response = self.transport.send(&retry).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            return Err(SessionError::Unauthorized(failure_message(&response)));
        }
        Ok(response)
    }

    /// GET a JSON resource.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, SessionError> {
        let response = self.send(ApiRequest::get(path)).await?;
        if !response.status.is_success() {
            return Err(SessionError::Status(
                response.status,
                failure_message(&response),
            ));
        }
        Ok(response.json()?)
    }
}

//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::TokenError;

/// Every way a credential check can fail.
///
/// All kinds about the credential itself are reported as `401 Unauthorized`,
/// including `RoleDenied`; the `kind` field in the body tells them apart.
/// `ClockUnavailable` is a server fault and fails closed with `500`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingCredential,
    EmptyCredential,
    MalformedCredential,
    BadSignature,
    WrongAlgorithm,
    AccessExpired,
    RefreshExpired,
    RefreshInvalid,
    RoleDenied,
    ClockUnavailable,
}

impl AuthError {
    /// Map a verification failure on an access credential.
    pub fn from_access(e: TokenError) -> Self {
        match e {
            TokenError::Malformed => AuthError::MalformedCredential,
            TokenError::BadSignature => AuthError::BadSignature,
            TokenError::WrongAlgorithm => AuthError::WrongAlgorithm,
            TokenError::Expired => AuthError::AccessExpired,
            TokenError::Clock => AuthError::ClockUnavailable,
        }
    }

    /// Map a verification failure on a refresh credential. None of these are retryable.
    pub fn from_refresh(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::RefreshExpired,
            TokenError::Clock => AuthError::ClockUnavailable,
            _ => AuthError::RefreshInvalid,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ClockUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::EmptyCredential => "empty_credential",
            AuthError::MalformedCredential => "malformed_credential",
            AuthError::BadSignature => "bad_signature",
            AuthError::WrongAlgorithm => "wrong_algorithm",
            AuthError::AccessExpired => "access_expired",
            AuthError::RefreshExpired => "refresh_expired",
            AuthError::RefreshInvalid => "refresh_invalid",
            AuthError::RoleDenied => "role_denied",
            AuthError::ClockUnavailable => "clock_unavailable",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "no credential found",
            AuthError::EmptyCredential => "token is required",
            AuthError::MalformedCredential => "malformed token",
            AuthError::BadSignature => "invalid token signature",
            AuthError::WrongAlgorithm => "unexpected signing algorithm",
            AuthError::AccessExpired => "token has expired",
            AuthError::RefreshExpired => "refresh token has expired",
            AuthError::RefreshInvalid => "invalid refresh token",
            AuthError::RoleDenied => "insufficient role",
            AuthError::ClockUnavailable => "credential could not be checked",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            kind: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
                kind: self.kind(),
            }),
        )
            .into_response()
    }
}

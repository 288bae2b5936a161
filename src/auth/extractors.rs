//! The per-request authorization gate.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::AuthError;
use super::state::HasAuthBackend;
use super::types::Identity;
use crate::jwt::TokenIssuer;

const BEARER_PREFIX: &str = "Bearer ";

/// Find the access credential on a request.
///
/// A non-empty access cookie wins; otherwise a bearer `Authorization` header is
/// used. A credential that is present but empty is reported separately from one
/// that is absent.
pub fn extract_credential(headers: &HeaderMap) -> Result<&str, AuthError> {
    let cookie = get_cookie(headers, ACCESS_COOKIE_NAME);
    if let Some(token) = cookie.filter(|t| !t.is_empty()) {
        return Ok(token);
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim);

    match (bearer, cookie) {
        (Some(token), _) if !token.is_empty() => Ok(token),
        (Some(_), _) | (None, Some(_)) => Err(AuthError::EmptyCredential),
        (None, None) => Err(AuthError::MissingCredential),
    }
}

/// Verify the access credential carried by `headers`.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenIssuer) -> Result<Identity, AuthError> {
    let token = extract_credential(headers)?;
    tokens
        .verify_access(token)
        .map(Identity::from)
        .map_err(|e| {
            debug!(error = %e, "Access credential rejected");
            AuthError::from_access(e)
        })
}

/// Middleware guarding a group of routes.
///
/// Rejects with `401` before the handler runs, and stores the verified
/// `Identity` on the request for the `Auth` extractor.
pub async fn auth_gate(
    State(tokens): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = authenticate(request.headers(), &tokens)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Extractor for handlers that require an authenticated caller.
///
/// Reuses the identity built by `auth_gate` when the route sits behind it,
/// and verifies the credential itself otherwise.
pub struct Auth(pub Identity);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(Auth(identity.clone()));
        }
        authenticate(&parts.headers, state.tokens()).map(Auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{Principal, Role};
    use axum::http::HeaderValue;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"gate-access-secret", b"gate-refresh-secret").unwrap()
    }

    fn principal() -> Principal {
        Principal {
            user_id: "u-1".to_string(),
            email: "a@x.com".to_string(),
            first_name: "A".to_string(),
            last_name: "X".to_string(),
            role: Role::Admin,
        }
    }

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_no_credential() {
        assert_eq!(
            extract_credential(&HeaderMap::new()),
            Err(AuthError::MissingCredential)
        );
    }

    #[test]
    fn test_cookie_preferred_over_header() {
        let h = headers(&[
            (header::COOKIE, "access_token=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(extract_credential(&h), Ok("from-cookie"));
    }

    #[test]
    fn test_header_fallback() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer from-header")]);
        assert_eq!(extract_credential(&h), Ok("from-header"));

        let h = headers(&[
            (header::COOKIE, "access_token="),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(extract_credential(&h), Ok("from-header"));
    }

    #[test]
    fn test_empty_credential() {
        let h = headers(&[(header::COOKIE, "access_token=")]);
        assert_eq!(extract_credential(&h), Err(AuthError::EmptyCredential));

        let h = headers(&[(header::AUTHORIZATION, "Bearer ")]);
        assert_eq!(extract_credential(&h), Err(AuthError::EmptyCredential));
    }

    #[test]
    fn test_non_bearer_header_ignored() {
        let h = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_credential(&h), Err(AuthError::MissingCredential));
    }

    #[test]
    fn test_authenticate_builds_identity() {
        let tokens = issuer();
        let pair = tokens.mint(&principal()).unwrap();
        let cookie = format!("access_token={}", pair.access_token);
        let h = headers(&[(header::COOKIE, cookie.as_str())]);

        let identity = authenticate(&h, &tokens).unwrap();
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(identity.role, Role::Admin);
    }

    #[test]
    fn test_refresh_credential_rejected_as_access() {
        let tokens = issuer();
        let pair = tokens.mint(&principal()).unwrap();
        let bearer = format!("Bearer {}", pair.refresh_token);
        let h = headers(&[(header::AUTHORIZATION, bearer.as_str())]);

        assert_eq!(authenticate(&h, &tokens), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_role_check() {
        let identity = Identity {
            user_id: "u-2".to_string(),
            role: Role::User,
        };
        assert_eq!(
            identity.require_role(Role::Admin),
            Err(AuthError::RoleDenied)
        );
        assert!(identity.require_role(Role::User).is_ok());
    }
}

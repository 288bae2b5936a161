//! Session cookie transport.
//!
//! Credentials only ever leave the server as a pair of HttpOnly cookies. The
//! Secure/SameSite flags depend on the deployment mode and must be identical
//! between issuance and clearing, otherwise browsers keep the stale cookie.

use axum::http::{HeaderMap, HeaderName, header};
use axum::response::AppendHeaders;

/// Cookie name for the access credential.
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh credential.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Access cookie lifetime: 24 hours.
pub const ACCESS_COOKIE_MAX_AGE: i64 = 86400;

/// Refresh cookie lifetime: 7 days.
pub const REFRESH_COOKIE_MAX_AGE: i64 = 604800;

/// Max-Age used to delete a cookie.
pub const CLEARED_COOKIE_MAX_AGE: i64 = -1;

/// Two `Set-Cookie` headers, one per credential.
pub type CookiePair = AppendHeaders<[(HeaderName, String); 2]>;

/// Deployment mode, which selects the cookie security flags.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Secure=true, SameSite=None (cross-site delivery under TLS)
    Production,
    /// Secure=false, SameSite=Lax (plain local HTTP)
    #[default]
    Development,
}

impl DeploymentMode {
    pub fn secure(self) -> bool {
        matches!(self, DeploymentMode::Production)
    }

    pub fn same_site(self) -> &'static str {
        match self {
            DeploymentMode::Production => "None",
            DeploymentMode::Development => "Lax",
        }
    }
}

/// Encodes credential pairs as cookies for a fixed deployment mode.
#[derive(Clone, Copy, Debug)]
pub struct SessionCookieTransport {
    mode: DeploymentMode,
}

impl SessionCookieTransport {
    pub fn new(mode: DeploymentMode) -> Self {
        Self { mode }
    }

    /// Cookies carrying a freshly minted pair.
    pub fn set_pair(&self, access_token: &str, refresh_token: &str) -> CookiePair {
        AppendHeaders([
            (
                header::SET_COOKIE,
                self.cookie(ACCESS_COOKIE_NAME, access_token, ACCESS_COOKIE_MAX_AGE),
            ),
            (
                header::SET_COOKIE,
                self.cookie(REFRESH_COOKIE_NAME, refresh_token, REFRESH_COOKIE_MAX_AGE),
            ),
        ])
    }

    /// Cookies deleting both credentials.
    pub fn clear_pair(&self) -> CookiePair {
        AppendHeaders([
            (
                header::SET_COOKIE,
                self.cookie(ACCESS_COOKIE_NAME, "", CLEARED_COOKIE_MAX_AGE),
            ),
            (
                header::SET_COOKIE,
                self.cookie(REFRESH_COOKIE_NAME, "", CLEARED_COOKIE_MAX_AGE),
            ),
        ])
    }

    fn cookie(&self, name: &str, value: &str, max_age: i64) -> String {
        let secure = if self.mode.secure() { "; Secure" } else { "" };
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite={}{}",
            name,
            value,
            max_age,
            self.mode.same_site(),
            secure
        )
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            if let Some((key, value)) = part.trim().split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

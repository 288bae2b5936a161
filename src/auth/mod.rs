//! Cookie-borne credential authentication.
//!
//! Validation is purely a function of the token's own signature and expiry:
//! no server-side session store is consulted, and renewal happens only through
//! the explicit refresh endpoint.

mod cookie;
mod errors;
mod extractors;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_MAX_AGE, ACCESS_COOKIE_NAME, CLEARED_COOKIE_MAX_AGE, CookiePair,
    DeploymentMode, REFRESH_COOKIE_MAX_AGE, REFRESH_COOKIE_NAME, SessionCookieTransport,
    get_cookie,
};
pub use errors::AuthError;
pub use extractors::{Auth, auth_gate, authenticate, extract_credential};
pub use state::HasAuthBackend;
pub use types::Identity;

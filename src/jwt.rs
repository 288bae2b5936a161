//! Credential issuance and verification.
//!
//! Two HMAC-signed JWTs travel together:
//! - Access credentials: 24 hours, signed with the access secret
//! - Refresh credentials: 7 days, signed with a distinct refresh secret
//!
//! Each class has its own key type, so a verifier for one class can never be
//! handed the other class's key by mistake.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Value of the `iss` claim on every credential.
pub const ISSUER: &str = "MagicStream";

/// Access credential duration: 24 hours
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 24 * 60 * 60;

/// Refresh credential duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

const PINNED_ALGORITHM: Algorithm = Algorithm::HS256;

/// Principal role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    /// Role stored in a user record. Anything unrecognised is a plain user.
    pub fn from_db(s: &str) -> Self {
        match s {
            "ADMIN" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// The identity embedded in every credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Credential class, carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims shared by both credential classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub user_id: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    #[serde(rename = "iss")]
    pub issuer: String,
    /// Issued at (Unix timestamp)
    #[serde(rename = "iat")]
    pub issued_at: u64,
    /// Expiration time (Unix timestamp)
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

impl Claims {
    fn new(principal: &Principal, token_type: TokenType, issued_at: u64, duration: u64) -> Self {
        Self {
            email: principal.email.clone(),
            first_name: principal.first_name.clone(),
            last_name: principal.last_name.clone(),
            role: principal.role,
            user_id: principal.user_id.clone(),
            token_type,
            issuer: ISSUER.to_string(),
            issued_at,
            expires_at: issued_at + duration,
        }
    }

    pub fn into_principal(self) -> Principal {
        Principal {
            user_id: self.user_id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// A credential class: its key material, lifetime, and `typ` claim.
trait CredentialClass {
    const TOKEN_TYPE: TokenType;
    const DURATION_SECS: u64;

    fn keys(&self) -> &KeyPair;

    fn sign(&self, principal: &Principal, issued_at: u64) -> Result<String, SigningError> {
        let claims = Claims::new(principal, Self::TOKEN_TYPE, issued_at, Self::DURATION_SECS);
        jsonwebtoken::encode(
            &Header::new(PINNED_ALGORITHM),
            &claims,
            &self.keys().encoding,
        )
        .map_err(SigningError::Encoding)
    }

    fn verify(&self, token: &str, now: u64) -> Result<Claims, TokenError> {
        check_pinned_algorithm(token)?;

        let mut validation = Validation::new(PINNED_ALGORITHM);
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.keys().decoding, &validation)
            .map_err(TokenError::from)?;
        let claims = token_data.claims;

        if claims.token_type != Self::TOKEN_TYPE {
            return Err(TokenError::Malformed);
        }

        // The decoder already rejected expired tokens against its own clock.
        if claims.expires_at < now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

/// Key material for access credentials.
pub struct AccessKeys(KeyPair);

/// Key material for refresh credentials.
pub struct RefreshKeys(KeyPair);

impl CredentialClass for AccessKeys {
    const TOKEN_TYPE: TokenType = TokenType::Access;
    const DURATION_SECS: u64 = ACCESS_TOKEN_DURATION_SECS;

    fn keys(&self) -> &KeyPair {
        &self.0
    }
}

impl CredentialClass for RefreshKeys {
    const TOKEN_TYPE: TokenType = TokenType::Refresh;
    const DURATION_SECS: u64 = REFRESH_TOKEN_DURATION_SECS;

    fn keys(&self) -> &KeyPair {
        &self.0
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Issued at timestamp (Unix seconds), shared by both credentials
    pub issued_at: u64,
}

impl CredentialPair {
    pub fn access_expires_at(&self) -> u64 {
        self.issued_at + ACCESS_TOKEN_DURATION_SECS
    }

    pub fn refresh_expires_at(&self) -> u64 {
        self.issued_at + REFRESH_TOKEN_DURATION_SECS
    }
}

/// Mints and verifies credential pairs.
pub struct TokenIssuer {
    access: AccessKeys,
    refresh: RefreshKeys,
}

impl TokenIssuer {
    /// Create an issuer from the two secrets. They must both be present and must differ.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self, SigningError> {
        if access_secret.is_empty() {
            return Err(SigningError::MissingKey("access"));
        }
        if refresh_secret.is_empty() {
            return Err(SigningError::MissingKey("refresh"));
        }
        if access_secret == refresh_secret {
            return Err(SigningError::SharedKey);
        }

        Ok(Self {
            access: AccessKeys(KeyPair::from_secret(access_secret)),
            refresh: RefreshKeys(KeyPair::from_secret(refresh_secret)),
        })
    }

    /// Mint a new pair issued now.
    pub fn mint(&self, principal: &Principal) -> Result<CredentialPair, SigningError> {
        let now = unix_now().map_err(|_| SigningError::TimeError)?;
        self.mint_at(principal, now)
    }

    /// Mint a new pair with an explicit issue time.
    pub fn mint_at(
        &self,
        principal: &Principal,
        issued_at: u64,
    ) -> Result<CredentialPair, SigningError> {
        Ok(CredentialPair {
            access_token: self.access.sign(principal, issued_at)?,
            refresh_token: self.refresh.sign(principal, issued_at)?,
            issued_at,
        })
    }

    /// Verify an access credential and return the principal it carries.
    pub fn verify_access(&self, token: &str) -> Result<Principal, TokenError> {
        let now = unix_now()?;
        self.access.verify(token, now).map(Claims::into_principal)
    }

    /// Verify a refresh credential and return the principal it carries.
    pub fn verify_refresh(&self, token: &str) -> Result<Principal, TokenError> {
        let now = unix_now()?;
        self.refresh.verify(token, now).map(Claims::into_principal)
    }
}

/// Reject any token whose header names an algorithm other than the pinned one,
/// including algorithms the decoder does not know (such as `none`).
fn check_pinned_algorithm(token: &str) -> Result<(), TokenError> {
    #[derive(Deserialize)]
    struct RawHeader {
        alg: String,
    }

    let encoded = token
        .split('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or(TokenError::Malformed)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| TokenError::Malformed)?;
    let header: RawHeader = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    if header.alg != "HS256" {
        return Err(TokenError::WrongAlgorithm);
    }
    Ok(())
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| {
            error!(error = %e, "System clock is before the Unix epoch");
            TokenError::Clock
        })
}

/// Errors that can occur while verifying a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Not a well-formed credential of the expected class
    Malformed,
    /// Signature does not match the key for this class
    BadSignature,
    /// Header claims a different algorithm than the pinned one
    WrongAlgorithm,
    /// Past its `exp` claim
    Expired,
    /// The server clock could not be read; the credential was not checked
    Clock,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenError::WrongAlgorithm
            }
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::BadSignature => write!(f, "Invalid token signature"),
            TokenError::WrongAlgorithm => write!(f, "Unexpected signing algorithm"),
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::Clock => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Errors that can occur while minting credentials.
#[derive(Debug)]
pub enum SigningError {
    /// A secret is missing
    MissingKey(&'static str),
    /// Access and refresh secrets are identical
    SharedKey,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
}

impl std::fmt::Display for SigningError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningError::MissingKey(class) => write!(f, "Missing {} signing key", class),
            SigningError::SharedKey => {
                write!(f, "Access and refresh signing keys must be different")
            }
            SigningError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            SigningError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for SigningError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &[u8] = b"test-access-secret-for-testing";
    const REFRESH_SECRET: &[u8] = b"test-refresh-secret-for-testing";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(ACCESS_SECRET, REFRESH_SECRET).unwrap()
    }

    fn alice() -> Principal {
        Principal {
            user_id: "user-123".to_string(),
            email: "a@x.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            role: Role::User,
        }
    }

    fn now() -> u64 {
        unix_now().unwrap()
    }

    /// Re-sign the payload of `token` under a different header.
    fn with_header(token: &str, header_json: &str) -> String {
        let mut parts = token.split('.');
        let _ = parts.next();
        let payload = parts.next().unwrap();
        let signature = parts.next().unwrap();
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            payload,
            signature
        )
    }

    #[test]
    fn test_role_from_db() {
        assert_eq!(Role::from_db("ADMIN"), Role::Admin);
        assert_eq!(Role::from_db("USER"), Role::User);
        assert_eq!(Role::from_db("admin"), Role::User);
        assert_eq!(Role::from_db(Role::Admin.as_str()), Role::Admin);
    }

    #[test]
    fn test_clock_error_is_distinct() {
        assert_ne!(TokenError::Clock, TokenError::Malformed);
        assert_eq!(TokenError::Clock.to_string(), "System time error");
    }

    #[test]
    fn test_mint_and_verify_access() {
        let issuer = issuer();
        let pair = issuer.mint(&alice()).unwrap();

        let principal = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(principal, alice());
    }

    #[test]
    fn test_mint_and_verify_refresh() {
        let issuer = issuer();
        let pair = issuer.mint(&alice()).unwrap();

        let principal = issuer.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(principal, alice());
    }

    #[test]
    fn test_access_expires_before_refresh() {
        let pair = issuer().mint(&alice()).unwrap();
        assert!(pair.access_expires_at() < pair.refresh_expires_at());
        assert_eq!(
            pair.access_expires_at() - pair.issued_at,
            ACCESS_TOKEN_DURATION_SECS
        );
    }

    #[test]
    fn test_cross_use_rejected() {
        let issuer = issuer();
        let pair = issuer.mint(&alice()).unwrap();

        assert_eq!(
            issuer.verify_refresh(&pair.access_token),
            Err(TokenError::BadSignature)
        );
        assert_eq!(
            issuer.verify_access(&pair.refresh_token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_admin_role_round_trips() {
        let issuer = issuer();
        let mut admin = alice();
        admin.role = Role::Admin;

        let pair = issuer.mint(&admin).unwrap();
        assert_eq!(
            issuer.verify_access(&pair.access_token).unwrap().role,
            Role::Admin
        );
    }

    #[test]
    fn test_access_valid_one_second_before_expiry() {
        let issuer = issuer();
        let issued_at = now() - (ACCESS_TOKEN_DURATION_SECS - 1);
        let pair = issuer.mint_at(&alice(), issued_at).unwrap();

        assert!(issuer.verify_access(&pair.access_token).is_ok());
    }

    #[test]
    fn test_access_expired_one_second_after_expiry() {
        let issuer = issuer();
        let issued_at = now() - (ACCESS_TOKEN_DURATION_SECS + 1);
        let pair = issuer.mint_at(&alice(), issued_at).unwrap();

        assert_eq!(
            issuer.verify_access(&pair.access_token),
            Err(TokenError::Expired)
        );
        // The refresh credential from the same pair is still good.
        assert!(issuer.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_expired_refresh() {
        let issuer = issuer();
        let issued_at = now() - (REFRESH_TOKEN_DURATION_SECS + 10);
        let pair = issuer.mint_at(&alice(), issued_at).unwrap();

        assert_eq!(
            issuer.verify_refresh(&pair.refresh_token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_tampered_signature() {
        let issuer = issuer();
        let pair = issuer.mint(&alice()).unwrap();

        let (signed, signature) = pair.refresh_token.rsplit_once('.').unwrap();
        let first = if signature.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{}.{}{}", signed, first, &signature[1..]);

        assert_eq!(
            issuer.verify_refresh(&tampered),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_wrong_secret() {
        let issuer1 = issuer();
        let issuer2 = TokenIssuer::new(b"other-access-secret", b"other-refresh-secret").unwrap();

        let pair = issuer1.mint(&alice()).unwrap();
        assert_eq!(
            issuer2.verify_access(&pair.access_token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_alg_none_rejected() {
        let issuer = issuer();
        let pair = issuer.mint(&alice()).unwrap();

        let forged = with_header(&pair.access_token, r#"{"alg":"none","typ":"JWT"}"#);
        assert_eq!(
            issuer.verify_access(&forged),
            Err(TokenError::WrongAlgorithm)
        );
    }

    #[test]
    fn test_other_hmac_algorithm_rejected() {
        let issuer = issuer();
        let pair = issuer.mint(&alice()).unwrap();

        let forged = with_header(&pair.access_token, r#"{"alg":"HS512","typ":"JWT"}"#);
        assert_eq!(
            issuer.verify_access(&forged),
            Err(TokenError::WrongAlgorithm)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let issuer = issuer();
        assert_eq!(
            issuer.verify_access("invalid-token"),
            Err(TokenError::Malformed)
        );
        assert_eq!(issuer.verify_access("a.b.c"), Err(TokenError::Malformed));
        assert_eq!(issuer.verify_access(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let now = now();
        let claims = Claims {
            email: "a@x.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            role: Role::User,
            user_id: "user-123".to_string(),
            token_type: TokenType::Access,
            issuer: "SomeoneElse".to_string(),
            issued_at: now,
            expires_at: now + 60,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(ACCESS_SECRET),
        )
        .unwrap();

        assert_eq!(issuer().verify_access(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_secrets_must_be_present_and_distinct() {
        assert!(matches!(
            TokenIssuer::new(b"", REFRESH_SECRET),
            Err(SigningError::MissingKey("access"))
        ));
        assert!(matches!(
            TokenIssuer::new(ACCESS_SECRET, b""),
            Err(SigningError::MissingKey("refresh"))
        ));
        assert!(matches!(
            TokenIssuer::new(ACCESS_SECRET, ACCESS_SECRET),
            Err(SigningError::SharedKey)
        ));
    }

    #[test]
    fn test_claims_shape() {
        let pair = issuer().mint(&alice()).unwrap();
        let payload = pair.access_token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();

        assert_eq!(json["iss"], "MagicStream");
        assert_eq!(json["role"], "USER");
        assert_eq!(json["user_id"], "user-123");
        assert_eq!(json["email"], "a@x.com");
        assert!(json["iat"].is_u64());
        assert!(json["exp"].is_u64());
    }
}

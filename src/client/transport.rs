//! Request/response boundary wrapped by the session client.

use axum::http::{Method, StatusCode};
use reqwest::cookie::Jar;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// An API call, replayable after a credential renewal.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    retry: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retry: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Whether this request is already the replay that follows a renewal.
    pub fn is_retry(&self) -> bool {
        self.retry
    }

    /// The same request, marked as a post-renewal replay.
    pub fn into_retry(mut self) -> Self {
        self.retry = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The `error` field of a JSON error body, if there is one.
    pub fn error_message(&self) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            error: String,
        }
        self.json::<ErrorBody>().ok().map(|b| b.error)
    }
}

#[derive(Debug)]
pub enum TransportError {
    InvalidUrl(url::ParseError),
    Http(reqwest::Error),
    /// The transport could not deliver the request.
    Unavailable(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::InvalidUrl(e) => write!(f, "Invalid request URL: {}", e),
            TransportError::Http(e) => write!(f, "HTTP request failed: {}", e),
            TransportError::Unavailable(msg) => write!(f, "Transport unavailable: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e)
    }
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        TransportError::InvalidUrl(e)
    }
}

/// Sends API requests. Cookies are the transport's concern.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// HTTP transport with a cookie jar, so credential cookies set by the
/// server travel with every later request.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_jar(base_url, Arc::new(Jar::default()))
    }

    /// Use a caller-owned jar, so the caller can inspect or seed cookies.
    pub fn with_jar(base_url: &str, jar: Arc<Jar>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().cookie_provider(jar).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.base_url.join(&request.path)?;
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_marker() {
        let request = ApiRequest::get("/movies");
        assert!(!request.is_retry());
        assert!(request.into_retry().is_retry());
    }

    #[test]
    fn test_error_message() {
        let response = ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"token has expired","kind":"access_expired"}"#,
        );
        assert_eq!(response.error_message().as_deref(), Some("token has expired"));
        assert!(ApiResponse::new(StatusCode::OK, "[]").error_message().is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpTransport::new("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}

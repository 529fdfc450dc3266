use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// Maximum number of redirects followed when redirects are enabled.
const MAX_REDIRECTS: usize = 10;

/// Errors raised by a single transport request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Local file could not be read
    #[error("Failed to read local feed: {0}")]
    Io(#[from] std::io::Error),
    /// The transport does not handle this URL scheme
    #[error("Unsupported scheme for this transport: {0}")]
    UnsupportedScheme(String),
}

/// HTTP basic-auth credentials.
///
/// Either half may be missing; it is sent as an empty string. The password
/// is held as a [`SecretString`] so it never shows up in `Debug` output or
/// logs.
#[derive(Debug)]
pub struct Credentials {
    user: Option<String>,
    password: Option<SecretString>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: Option<&str>) -> Self {
        Self {
            user: Some(user.into()),
            password: password.map(|p| SecretString::from(p.to_owned())),
        }
    }

    /// Credentials with a password and no user name.
    pub fn password_only(password: &str) -> Self {
        Self {
            user: None,
            password: Some(SecretString::from(password.to_owned())),
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }
}

/// One way of getting feed bytes for a URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether [`get`](Transport::get) can send basic-auth credentials.
    fn supports_basic_auth(&self) -> bool;

    /// Performs one GET and returns the full body of a successful response.
    async fn get(&self, url: &Url, credentials: Option<&Credentials>)
        -> Result<Vec<u8>, TransportError>;
}

/// `reqwest`-backed transport for `http` and `https` URLs.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    max_size: usize,
}

impl HttpTransport {
    /// Builds a client honoring the redirect, user-agent, timeout and
    /// size settings of `config`.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(redirect)
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Wraps an existing client (caller controls its configuration).
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            timeout: config.timeout(),
            max_size: config.max_feed_size,
        }
    }

    async fn send(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut request = self.client.get(url.as_str());
        if let Some(credentials) = credentials {
            request =
                request.basic_auth(credentials.user().unwrap_or(""), credentials.password());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_size).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn supports_basic_auth(&self) -> bool {
        true
    }

    async fn get(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>, TransportError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(TransportError::UnsupportedScheme(scheme.to_owned())),
        }

        // The timeout covers the body as well as the headers
        tokio::time::timeout(self.timeout, self.send(url, credentials))
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(TransportError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: Network interruptions can end the stream early
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(TransportError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

/// Reads `file://` URLs from local disk. Cannot send credentials.
#[derive(Debug, Clone)]
pub struct FileTransport {
    max_size: usize,
}

impl FileTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            max_size: config.max_feed_size,
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn supports_basic_auth(&self) -> bool {
        false
    }

    async fn get(
        &self,
        url: &Url,
        _credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>, TransportError> {
        let path = match url.scheme() {
            "file" => url
                .to_file_path()
                .map_err(|_| TransportError::UnsupportedScheme(url.to_string()))?,
            scheme => return Err(TransportError::UnsupportedScheme(scheme.to_owned())),
        };

        let meta = tokio::fs::metadata(&path).await?;
        if meta.len() > self.max_size as u64 {
            return Err(TransportError::ResponseTooLarge);
        }
        Ok(tokio::fs::read(&path).await?)
    }
}

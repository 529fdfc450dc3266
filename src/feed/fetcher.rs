use thiserror::Error;

use super::transport::{Credentials, HttpTransport, Transport, TransportError};
use crate::config::Config;
use crate::storage::CacheStore;
use crate::util::{validate_url, UrlValidationError};

/// Errors that can occur while obtaining feed bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL failed validation before any I/O
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Credentials were given but the transport cannot send them
    #[error("No HTTP client capable of basic authentication")]
    NoCapableClient,
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The live fetch failed and no cached copy exists
    #[error("Cannot load channel {url}: {source}")]
    CannotLoad {
        url: String,
        #[source]
        source: TransportError,
    },
}

/// Cache-aware feed fetcher.
///
/// A fresh cache entry is served without touching the network. Otherwise
/// the transport is asked once; success refreshes the cache, failure falls
/// back to the cached copy of any age. Cache trouble never turns a
/// successful fetch into an error.
///
/// Holds no mutable state, so one fetcher can serve many tasks.
#[derive(Debug, Clone)]
pub struct Fetcher<T = HttpTransport> {
    config: Config,
    cache: CacheStore,
    transport: T,
}

impl Fetcher<HttpTransport> {
    /// Creates a fetcher backed by a `reqwest` client built from `config`.
    pub fn new(config: Config) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(&config).map_err(FetchError::Client)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn with_transport(config: Config, transport: T) -> Self {
        Self {
            cache: CacheStore::from_config(&config),
            config,
            transport,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the feed bytes for `url`.
    ///
    /// Leading and trailing whitespace in `url` is ignored, both for the
    /// request and for the cache key.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - the URL is malformed or has an unsupported scheme
    /// - [`FetchError::NoCapableClient`] - credentials given, transport cannot send them
    /// - [`FetchError::CannotLoad`] - the request failed and nothing is cached
    pub async fn fetch(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>, FetchError> {
        let url = url.trim();
        let parsed = validate_url(url)?;

        if let Some(bytes) = self.cache.read(url).await {
            tracing::debug!(url = %url, bytes = bytes.len(), "Serving feed from cache");
            return Ok(bytes);
        }

        if credentials.is_some() && !self.transport.supports_basic_auth() {
            return Err(FetchError::NoCapableClient);
        }

        match self.transport.get(&parsed, credentials).await {
            Ok(bytes) => {
                self.cache.write(url, &bytes).await;
                Ok(bytes)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Feed request failed");

                if let Some(bytes) = self.cache.read_stale(url).await {
                    tracing::warn!(url = %url, bytes = bytes.len(), "Serving stale cached feed");
                    return Ok(bytes);
                }

                Err(FetchError::CannotLoad {
                    url: url.to_owned(),
                    source: e,
                })
            }
        }
    }
}

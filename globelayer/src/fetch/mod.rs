//! Network retrieval of tile resources.
//!
//! The fetch pipeline talks to the network only through [`ResourceFetcher`],
//! so tests and offline tools can substitute their own implementation.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::error::PyramidError;
use crate::store::StoreError;

/// Default request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent by [`ReqwestFetcher`].
pub const DEFAULT_USER_AGENT: &str = concat!("globelayer/", env!("CARGO_PKG_VERSION"));

/// Reasons a tile resource could not be made resident.
///
/// None of these reach the traversal: the pipeline turns every one of them
/// into an absent mark for the tile.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The server answered with an error document instead of the resource.
    #[error("Server returned {content_type} instead of tile data: {body}")]
    ErrorContent { content_type: String, body: String },

    /// An image content type the decoder does not support.
    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    /// The bytes could not be decoded or re-encoded.
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    /// Not in the local store and network retrieval is turned off.
    #[error("Resource not in local store and network retrieval is disabled")]
    NetworkDisabled,

    /// The task panicked while fetching or decoding.
    #[error("Fetch task panicked: {0}")]
    Panicked(String),

    /// No resource identifier could be built for the tile.
    #[error("Cannot build resource URL: {0}")]
    Url(#[from] PyramidError),
}

/// Bytes of a resource together with the server's content type.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResource {
    pub bytes: Bytes,
    /// `Content-Type` without parameters, lower case. `None` when absent.
    pub content_type: Option<String>,
}

impl FetchedResource {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(normalize_content_type),
        }
    }
}

/// Strips parameters such as `; charset=utf-8` and lower-cases.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Retrieves resource bytes by identifier.
///
/// Called from worker threads; implementations block.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError>;
}

/// Blocking HTTP fetcher built on reqwest.
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Whole-request timeout
    /// * `user_agent` - Value of the `User-Agent` header
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT)
    }
}

impl ResourceFetcher for ReqwestFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedResource, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(normalize_content_type);

        let bytes = response
            .bytes()
            .map_err(|e| FetchError::Http(format!("Failed to read response: {}", e)))?;

        Ok(FetchedResource {
            bytes,
            content_type,
        })
    }
}

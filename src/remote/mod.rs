//! Remote listing of release artifacts.
//!
//! The update source depends on a single capability: enumerate the file
//! metadata stored in a folder. That capability is the [`RemoteListing`]
//! trait, so any storage backend exposing the same shape is substitutable
//! and tests can plug in an in-memory fake.
//!
//! - [`drive`] - Google Drive v3 `files.list` client with retry and pagination

mod drive;

pub use drive::{DriveClient, DriveClientOptions, DEFAULT_BASE_URL};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while listing a remote folder.
#[derive(Debug, Error)]
pub enum ListingError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// A single request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Listing body could not be decoded
    #[error("Malformed listing response: {0}")]
    Decode(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Pagination did not terminate (repeated token or page cap reached)
    #[error("Pagination error: {0}")]
    Pagination(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    /// The API key cannot be sent as an HTTP header value
    #[error("API key contains characters that cannot be sent in a request header")]
    InvalidApiKey,
    /// The client was closed by its owner
    #[error("Listing client has been closed")]
    Closed,
}

impl ListingError {
    /// Returns true if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ListingError::Network(_) | ListingError::Timeout | ListingError::RateLimited(_) => true,
            ListingError::HttpStatus(status) => *status == 429 || *status >= 500,
            ListingError::Decode(_)
            | ListingError::ResponseTooLarge
            | ListingError::Pagination(_)
            | ListingError::InsecureBaseUrl
            | ListingError::InvalidBaseUrl(_)
            | ListingError::InvalidApiKey
            | ListingError::Closed => false,
        }
    }
}

/// Metadata for one file in a remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Opaque remote identifier, later used to download the file
    pub id: String,
    pub name: String,
    /// Size in bytes, when the backend reports one
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: None,
            modified_time: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn modified_at(mut self, modified_time: DateTime<Utc>) -> Self {
        self.modified_time = Some(modified_time);
        self
    }
}

/// Server-side narrowing hints for a listing call.
///
/// Backends that cannot filter may ignore the hints; callers always
/// re-check names locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only return files whose name contains this substring
    pub name_contains: Option<String>,
}

impl ListQuery {
    pub fn name_contains(fragment: impl Into<String>) -> Self {
        Self {
            name_contains: Some(fragment.into()),
        }
    }
}

/// Folder-scoped file enumeration.
///
/// Implementations must be safe to call concurrently and must drain any
/// pagination before returning: a partial listing is never acceptable.
#[async_trait]
pub trait RemoteListing: Send + Sync {
    /// List every file in `folder_id` matching `query`.
    async fn list_files(
        &self,
        folder_id: &str,
        query: &ListQuery,
    ) -> Result<Vec<FileMetadata>, ListingError>;

    /// Release held resources. Only called by the owner of the client.
    fn close(&self) {}

    /// Backend name used in log fields
    fn name(&self) -> &str {
        "remote"
    }
}

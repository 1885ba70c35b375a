use crate::remote::ListingError;
use thiserror::Error;

/// Errors surfaced by [`UpdateSource`](crate::UpdateSource).
///
/// File names that do not follow the release naming convention are never
/// reported here; they are dropped from the feed and logged at trace level.
#[derive(Debug, Error)]
pub enum UpdateSourceError {
    /// A constructor argument was empty or otherwise unusable
    #[error("Invalid argument: `{param}` must be a non-empty value")]
    InvalidArgument { param: &'static str },
    /// The source was disposed before (or while) the call was made
    #[error("Update source has been disposed")]
    Disposed,
    /// The remote listing failed after the client exhausted its retries
    #[error("Update check failed, will retry later: {0}")]
    SourceUnavailable(#[source] ListingError),
    /// The caller's cancellation signal fired before the listing finished
    #[error("Update check was canceled")]
    Canceled,
}

impl UpdateSourceError {
    /// Returns true if repeating the whole feed request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpdateSourceError::SourceUnavailable(cause) => cause.is_retryable(),
            UpdateSourceError::InvalidArgument { .. }
            | UpdateSourceError::Disposed
            | UpdateSourceError::Canceled => false,
        }
    }

    /// Maps a client construction failure onto the constructor contract.
    pub(crate) fn from_client_setup(err: ListingError) -> Self {
        match err {
            ListingError::InvalidApiKey => UpdateSourceError::InvalidArgument { param: "api_key" },
            ListingError::InsecureBaseUrl | ListingError::InvalidBaseUrl(_) => {
                UpdateSourceError::InvalidArgument { param: "base_url" }
            }
            other => UpdateSourceError::SourceUnavailable(other),
        }
    }
}

//! Release artifacts discovered in a remote folder.
//!
//! - [`parser`] - File-name convention mapping raw listings to [`ReleaseEntry`]

mod parser;

pub use parser::{parse_release, NamingConvention, DEFAULT_CHANNEL, DEFAULT_EXTENSION};

use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;

/// One discoverable update artifact.
///
/// `(package_id, version, channel)` identifies a logical release; the
/// remaining fields describe the concrete remote file it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseEntry {
    pub package_id: String,
    pub version: Version,
    pub channel: String,
    /// Original remote file name
    pub file_name: String,
    /// Opaque handle for downloading the artifact later
    pub remote_id: String,
    /// Informational only; 0 when the remote did not report a size
    pub size_bytes: u64,
    pub modified_time: Option<DateTime<Utc>>,
}

impl ReleaseEntry {
    /// Whether `other` should replace `self` as the representative file of
    /// the same logical release.
    ///
    /// Later modification wins; a missing timestamp counts as oldest. Exact
    /// ties fall back to file name then remote id so the outcome never
    /// depends on listing order.
    pub(crate) fn superseded_by(&self, other: &ReleaseEntry) -> bool {
        other
            .modified_time
            .cmp(&self.modified_time)
            .then_with(|| self.file_name.cmp(&other.file_name))
            .then_with(|| self.remote_id.cmp(&other.remote_id))
            .is_gt()
    }
}

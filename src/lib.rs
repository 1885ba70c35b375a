//! Release feeds for auto-updaters, discovered from a cloud-drive folder.
//!
//! An [`UpdateSource`] turns the unordered file listing of one folder into a
//! deterministic feed: files are parsed by a [`NamingConvention`], filtered to
//! one package and channel, deduplicated, and sorted by semantic version.
//!
//! # Example
//!
//! ```no_run
//! use drive_update_source::UpdateSource;
//!
//! # async fn run() -> Result<(), drive_update_source::UpdateSourceError> {
//! let source = UpdateSource::new("1AbCdEfGh", "api-key", "MyApp")?;
//! let feed = source.get_release_feed(&tracing::Span::current(), "stable").await?;
//! if let Some(latest) = feed.last() {
//!     println!("latest: {} ({})", latest.version, latest.remote_id);
//! }
//! source.dispose();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod release;
pub mod remote;
pub mod source;

pub use config::{Config, ConfigError};
pub use error::UpdateSourceError;
pub use release::{parse_release, NamingConvention, ReleaseEntry};
pub use remote::{
    DriveClient, DriveClientOptions, FileMetadata, ListQuery, ListingError, RemoteListing,
};
pub use source::{SourceOptions, UpdateSource};

//! Update source backed by a remote folder of release artifacts.
//!
//! [`UpdateSource`] lists the configured folder, parses every file name into a
//! [`ReleaseEntry`], keeps the entries for one package and channel, and
//! returns them ordered by version. Listing is the only suspending step; the
//! parse/filter/sort pass is pure and runs after the listing is complete, so
//! the feed never depends on I/O timing.

use crate::config::Config;
use crate::error::UpdateSourceError;
use crate::release::{NamingConvention, ReleaseEntry};
use crate::remote::{DriveClient, DriveClientOptions, FileMetadata, ListQuery, RemoteListing};
use secrecy::{ExposeSecret, SecretString};
use semver::Version;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{Instrument, Span};

/// Optional construction settings for [`UpdateSource`].
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Default span for lifecycle logging; `Span::none()` when unset
    pub span: Option<Span>,
    pub convention: NamingConvention,
    /// Used only when the source builds its own Drive client
    pub drive: DriveClientOptions,
}

/// Release feed for one package stored in one remote folder.
///
/// Safe to share across tasks. Each feed request clones the client handle
/// under a short read lock, so concurrent requests never serialize on the
/// listing or on the local parse/filter work.
pub struct UpdateSource {
    folder_path: String,
    package_id: String,
    convention: NamingConvention,
    client: RwLock<Option<Arc<dyn RemoteListing>>>,
    /// True when the client was built here and must be closed on dispose
    owns_client: bool,
    disposed: AtomicBool,
    span: Span,
}

impl std::fmt::Debug for UpdateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSource")
            .field("folder_path", &self.folder_path)
            .field("package_id", &self.package_id)
            .field("convention", &self.convention)
            .field("owns_client", &self.owns_client)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl UpdateSource {
    /// Create a source that lists the folder through its own Drive client.
    ///
    /// # Errors
    ///
    /// [`UpdateSourceError::InvalidArgument`] naming the first empty argument,
    /// checked in the order `folder_path`, `api_key`, `package_id`.
    pub fn new(
        folder_path: &str,
        api_key: &str,
        package_id: &str,
    ) -> Result<Self, UpdateSourceError> {
        Self::with_options(folder_path, api_key, package_id, SourceOptions::default())
    }

    pub fn with_options(
        folder_path: &str,
        api_key: &str,
        package_id: &str,
        options: SourceOptions,
    ) -> Result<Self, UpdateSourceError> {
        let (folder_path, api_key, package_id) = validate(folder_path, api_key, package_id)?;
        let client = DriveClient::with_options(SecretString::from(api_key), options.drive.clone())
            .map_err(UpdateSourceError::from_client_setup)?;
        Ok(Self::assemble(folder_path, package_id, Arc::new(client), true, options))
    }

    /// Create a source over a caller-supplied listing client.
    ///
    /// The client is shared, not owned: [`dispose`](Self::dispose) drops this
    /// source's handle but never closes the client.
    pub fn with_client(
        folder_path: &str,
        api_key: &str,
        package_id: &str,
        client: Arc<dyn RemoteListing>,
        options: SourceOptions,
    ) -> Result<Self, UpdateSourceError> {
        let (folder_path, _, package_id) = validate(folder_path, api_key, package_id)?;
        Ok(Self::assemble(folder_path, package_id, client, false, options))
    }

    /// Create a source from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Self, UpdateSourceError> {
        let api_key = config.api_key();
        let api_key = api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .unwrap_or_default();
        Self::with_options(
            &config.folder_path,
            api_key,
            &config.package_id,
            config.source_options(),
        )
    }

    fn assemble(
        folder_path: String,
        package_id: String,
        client: Arc<dyn RemoteListing>,
        owns_client: bool,
        options: SourceOptions,
    ) -> Self {
        let span = options.span.unwrap_or_else(Span::none);
        tracing::debug!(
            parent: &span,
            folder = %folder_path,
            package = %package_id,
            backend = client.name(),
            owns_client,
            "Update source created"
        );
        Self {
            folder_path,
            package_id,
            convention: options.convention,
            client: RwLock::new(Some(client)),
            owns_client,
            disposed: AtomicBool::new(false),
            span,
        }
    }

    pub fn folder_path(&self) -> &str {
        &self.folder_path
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn convention(&self) -> &NamingConvention {
        &self.convention
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fetch the release feed for `channel`, logging inside `span`.
    ///
    /// A blank channel means the convention's default channel (`"stable"`).
    /// The result is ordered ascending by version; an empty feed is a valid
    /// outcome.
    ///
    /// # Errors
    ///
    /// - [`UpdateSourceError::Disposed`] - checked before anything else
    /// - [`UpdateSourceError::SourceUnavailable`] - the remote listing failed
    pub async fn get_release_feed(
        &self,
        span: &Span,
        channel: &str,
    ) -> Result<Vec<ReleaseEntry>, UpdateSourceError> {
        if self.is_disposed() {
            return Err(UpdateSourceError::Disposed);
        }
        let channel = self.convention.normalize_channel(channel);

        async {
            let files = self.list_release_files().await?;
            let listed = files.len();
            let feed = assemble_feed(&self.convention, &self.package_id, channel, &files);
            tracing::debug!(
                package = %self.package_id,
                channel = %channel,
                listed,
                releases = feed.len(),
                "Release feed assembled"
            );
            Ok::<_, UpdateSourceError>(feed)
        }
        .instrument(span.clone())
        .await
    }

    /// [`get_release_feed`](Self::get_release_feed) using the source's default span.
    pub async fn release_feed(
        &self,
        channel: &str,
    ) -> Result<Vec<ReleaseEntry>, UpdateSourceError> {
        self.get_release_feed(&self.span, channel).await
    }

    /// Like [`get_release_feed`](Self::get_release_feed), aborting with
    /// [`UpdateSourceError::Canceled`] as soon as `cancel` resolves.
    ///
    /// The in-flight listing request is dropped on cancellation; no partial
    /// feed is returned.
    pub async fn get_release_feed_with_cancel<C>(
        &self,
        span: &Span,
        channel: &str,
        cancel: C,
    ) -> Result<Vec<ReleaseEntry>, UpdateSourceError>
    where
        C: Future<Output = ()>,
    {
        if self.is_disposed() {
            return Err(UpdateSourceError::Disposed);
        }

        tokio::select! {
            biased;
            () = cancel => {
                tracing::debug!(parent: span, package = %self.package_id, "Release feed request canceled");
                Err(UpdateSourceError::Canceled)
            }
            result = self.get_release_feed(span, channel) => result,
        }
    }

    /// Newest release on `channel` strictly greater than `current`, if any.
    pub async fn check_for_update(
        &self,
        span: &Span,
        channel: &str,
        current: &Version,
    ) -> Result<Option<ReleaseEntry>, UpdateSourceError> {
        let feed = self.get_release_feed(span, channel).await?;
        Ok(newest_above(span, feed, current))
    }

    /// [`check_for_update`](Self::check_for_update) that aborts with
    /// [`UpdateSourceError::Canceled`] once `cancel` resolves.
    pub async fn check_for_update_with_cancel<C>(
        &self,
        span: &Span,
        channel: &str,
        current: &Version,
        cancel: C,
    ) -> Result<Option<ReleaseEntry>, UpdateSourceError>
    where
        C: Future<Output = ()>,
    {
        let feed = self
            .get_release_feed_with_cancel(span, channel, cancel)
            .await?;
        Ok(newest_above(span, feed, current))
    }

    /// Release the remote client.
    ///
    /// Idempotent. A client built by this source is closed; an injected one is
    /// only dropped. Requests already holding the client finish normally; later
    /// requests fail with [`UpdateSourceError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let client = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(client) = client {
            if self.owns_client {
                client.close();
                tracing::debug!(parent: &self.span, backend = client.name(), "Closed owned listing client");
            } else {
                tracing::debug!(parent: &self.span, backend = client.name(), "Released injected listing client");
            }
        }
    }

    /// Raw listing of plausible release artifacts in the configured folder.
    ///
    /// The backend is asked to narrow by extension; names are re-checked here
    /// because a server-side `contains` match is looser than a suffix match.
    pub(crate) async fn list_release_files(
        &self,
    ) -> Result<Vec<FileMetadata>, UpdateSourceError> {
        let client = self.acquire_client()?;
        let query = ListQuery::name_contains(self.convention.extension());

        let files = client
            .list_files(&self.folder_path, &query)
            .await
            .map_err(|e| {
                tracing::warn!(
                    folder = %self.folder_path,
                    backend = client.name(),
                    error = %e,
                    "Remote listing failed"
                );
                UpdateSourceError::SourceUnavailable(e)
            })?;

        let files: Vec<FileMetadata> = files
            .into_iter()
            .filter(|f| self.convention.matches_extension(&f.name))
            .collect();

        if files.is_empty() {
            tracing::debug!(folder = %self.folder_path, "No release artifacts in folder");
        }
        Ok(files)
    }

    fn acquire_client(&self) -> Result<Arc<dyn RemoteListing>, UpdateSourceError> {
        if self.is_disposed() {
            return Err(UpdateSourceError::Disposed);
        }
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
            .ok_or(UpdateSourceError::Disposed)
    }
}

impl Drop for UpdateSource {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn newest_above(span: &Span, feed: Vec<ReleaseEntry>, current: &Version) -> Option<ReleaseEntry> {
    let newest = feed.into_iter().rev().find(|entry| entry.version > *current);
    match &newest {
        Some(entry) => tracing::info!(
            parent: span,
            current = %current,
            available = %entry.version,
            "Update available"
        ),
        None => tracing::debug!(parent: span, current = %current, "No newer release"),
    }
    newest
}

fn validate(
    folder_path: &str,
    api_key: &str,
    package_id: &str,
) -> Result<(String, String, String), UpdateSourceError> {
    Ok((
        require("folder_path", folder_path)?,
        require("api_key", api_key)?,
        require("package_id", package_id)?,
    ))
}

fn require(param: &'static str, value: &str) -> Result<String, UpdateSourceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(UpdateSourceError::InvalidArgument { param });
    }
    Ok(value.to_string())
}

/// Turn a raw listing into the ordered feed for one package and channel.
///
/// Package id and channel match ASCII case-insensitively. Files mapping to the
/// same version keep only the most recently modified one.
fn assemble_feed(
    convention: &NamingConvention,
    package_id: &str,
    channel: &str,
    files: &[FileMetadata],
) -> Vec<ReleaseEntry> {
    let mut releases: HashMap<Version, ReleaseEntry> = HashMap::new();

    for file in files {
        let Some(entry) = convention.parse(file) else {
            tracing::trace!(file = %file.name, "Ignoring file that is not a release artifact");
            continue;
        };

        if !entry.package_id.eq_ignore_ascii_case(package_id)
            || !entry.channel.eq_ignore_ascii_case(channel)
        {
            tracing::trace!(
                file = %entry.file_name,
                package = %entry.package_id,
                channel = %entry.channel,
                "Skipping release for another package or channel"
            );
            continue;
        }

        match releases.entry(entry.version.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(mut slot) => {
                let (kept, dropped) = if slot.get().superseded_by(&entry) {
                    let previous = slot.insert(entry);
                    (slot.get().file_name.clone(), previous.file_name)
                } else {
                    (slot.get().file_name.clone(), entry.file_name)
                };
                tracing::debug!(
                    version = %slot.key(),
                    kept = %kept,
                    dropped = %dropped,
                    "Duplicate release files, keeping most recently modified"
                );
            }
        }
    }

    let mut feed: Vec<ReleaseEntry> = releases.into_values().collect();
    feed.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    feed
}

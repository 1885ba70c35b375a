use super::{FileMetadata, ListQuery, ListingError, RemoteListing};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::{Host, Url};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

const FILES_PATH: &str = "drive/v3/files";
const API_KEY_HEADER: &str = "x-goog-api-key";
const FILE_FIELDS: &str = "nextPageToken,files(id,name,size,modifiedTime)";
const MAX_LISTING_SIZE: usize = 10 * 1024 * 1024; // 10MB per page
const MAX_PAGES: usize = 1000;

/// Tunables for [`DriveClient`].
#[derive(Debug, Clone)]
pub struct DriveClientOptions {
    /// API root, e.g. `https://www.googleapis.com`
    pub base_url: String,
    /// Files requested per page (Drive accepts 1..=1000)
    pub page_size: u32,
    pub request_timeout: Duration,
    /// Retries for 429/5xx/network failures, per page
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub retry_base_delay: Duration,
}

impl Default for DriveClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 100,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Google Drive v3 listing client authenticated with an API key.
///
/// The key travels in the `x-goog-api-key` header (marked sensitive) so it
/// never appears in request URLs, error messages, or logs.
pub struct DriveClient {
    http: reqwest::Client,
    api_key: SecretString,
    files_url: Url,
    options: DriveClientOptions,
    closed: AtomicBool,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("files_url", &self.files_url.as_str())
            .field("options", &self.options)
            .field("api_key", &"[REDACTED]")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl DriveClient {
    pub fn new(api_key: SecretString) -> Result<Self, ListingError> {
        Self::with_options(api_key, DriveClientOptions::default())
    }

    pub fn with_options(
        api_key: SecretString,
        mut options: DriveClientOptions,
    ) -> Result<Self, ListingError> {
        let files_url = files_endpoint(&options.base_url)?;
        // Reject keys that can never form a header before any request is made
        HeaderValue::from_str(api_key.expose_secret()).map_err(|_| ListingError::InvalidApiKey)?;
        options.page_size = options.page_size.clamp(1, 1000);

        let http = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            http,
            api_key,
            files_url,
            options,
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn page_url(&self, q: &str, page_token: Option<&str>) -> Url {
        let mut url = self.files_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", q)
                .append_pair("fields", FILE_FIELDS)
                .append_pair("pageSize", &self.options.page_size.to_string())
                .append_pair("supportsAllDrives", "true")
                .append_pair("includeItemsFromAllDrives", "true");
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        url
    }

    /// Fetch one page with exponential backoff on transient failures.
    async fn fetch_page(&self, url: &Url) -> Result<Vec<u8>, ListingError> {
        let mut retry_count = 0;

        loop {
            match self.send_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && retry_count < self.options.max_retries => {
                    let delay = self.options.retry_base_delay * 2u32.pow(retry_count);
                    tracing::warn!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Drive listing request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(ListingError::HttpStatus(429)) => {
                    return Err(ListingError::RateLimited(retry_count));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, url: &Url) -> Result<Vec<u8>, ListingError> {
        let mut key = HeaderValue::from_str(self.api_key.expose_secret())
            .map_err(|_| ListingError::InvalidApiKey)?;
        key.set_sensitive(true);

        let request = self.http.get(url.clone()).header(API_KEY_HEADER, key);

        let response = tokio::time::timeout(self.options.request_timeout, request.send())
            .await
            .map_err(|_| ListingError::Timeout)?
            .map_err(ListingError::Network)?;

        if !response.status().is_success() {
            return Err(ListingError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_LISTING_SIZE).await
    }
}

#[async_trait]
impl RemoteListing for DriveClient {
    async fn list_files(
        &self,
        folder_id: &str,
        query: &ListQuery,
    ) -> Result<Vec<FileMetadata>, ListingError> {
        if self.is_closed() {
            return Err(ListingError::Closed);
        }

        let q = build_query(folder_id, query);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for page in 0..MAX_PAGES {
            let url = self.page_url(&q, page_token.as_deref());
            let body = self.fetch_page(&url).await?;
            let list: FileList =
                serde_json::from_slice(&body).map_err(|e| ListingError::Decode(e.to_string()))?;

            tracing::debug!(
                page = page + 1,
                files = list.files.len(),
                "Fetched drive listing page"
            );
            files.extend(list.files.into_iter().filter_map(DriveFile::into_metadata));

            match list.next_page_token.filter(|t| !t.is_empty()) {
                None => return Ok(files),
                Some(token) => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(ListingError::Pagination(format!(
                            "page token repeated after {} pages",
                            page + 1
                        )));
                    }
                    page_token = Some(token);
                }
            }
        }

        Err(ListingError::Pagination(format!(
            "listing exceeded {} pages",
            MAX_PAGES
        )))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Drive listing client closed");
        }
    }

    fn name(&self) -> &str {
        "google-drive"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<SizeField>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

/// Drive encodes int64 fields as JSON strings; accept both forms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeField {
    Number(u64),
    Text(String),
}

impl DriveFile {
    /// Records without an id cannot be downloaded later, so they are skipped.
    fn into_metadata(self) -> Option<FileMetadata> {
        if self.id.trim().is_empty() {
            tracing::debug!(name = %self.name, "Skipping drive record without id");
            return None;
        }
        let size = match self.size {
            Some(SizeField::Number(n)) => Some(n),
            Some(SizeField::Text(s)) => s.trim().parse().ok(),
            None => None,
        };
        Some(FileMetadata {
            id: self.id,
            name: self.name,
            size,
            modified_time: self.modified_time,
        })
    }
}

fn files_endpoint(base_url: &str) -> Result<Url, ListingError> {
    let base = base_url.trim().trim_end_matches('/');
    let parsed = Url::parse(base).map_err(|e| ListingError::InvalidBaseUrl(e.to_string()))?;

    // API key must only travel over HTTPS; plain HTTP is allowed for loopback test servers
    match parsed.scheme() {
        "https" => {}
        "http" if is_loopback_host(&parsed) => {
            tracing::warn!(base_url = %base, "Using non-HTTPS drive base URL (loopback only)");
        }
        _ => {
            tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL (HTTPS required except for loopback)");
            return Err(ListingError::InsecureBaseUrl);
        }
    }

    Url::parse(&format!("{}/{}", base, FILES_PATH))
        .map_err(|e| ListingError::InvalidBaseUrl(e.to_string()))
}

fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Build the Drive search expression for a folder listing.
fn build_query(folder_id: &str, query: &ListQuery) -> String {
    let mut q = format!(
        "'{}' in parents and trashed = false",
        escape_query_literal(folder_id)
    );
    if let Some(fragment) = query.name_contains.as_deref().filter(|f| !f.is_empty()) {
        q.push_str(&format!(
            " and name contains '{}'",
            escape_query_literal(fragment)
        ));
    }
    q
}

fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ListingError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ListingError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ListingError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ListingError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

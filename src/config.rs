//! Update source settings read from ~/.config/drive-update-source/config.toml.
//!
//! Every key is optional. Keys this version does not know are accepted and
//! reported at warn level so typos do not go unnoticed.
use crate::release::NamingConvention;
use crate::remote::DriveClientOptions;
use crate::source::SourceOptions;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_key` from the file.
pub const API_KEY_ENV: &str = "DRIVE_API_KEY";

const KNOWN_KEYS: [&str; 9] = [
    "folder_path",
    "package_id",
    "api_key",
    "channel",
    "base_url",
    "page_size",
    "request_timeout_secs",
    "max_retries",
    "package_extension",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Update source configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_key` to keep the credential out of logs,
/// error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote folder holding the release artifacts.
    pub folder_path: String,

    /// Package identity the feed is filtered to.
    pub package_id: String,

    /// Drive API key (alternative to DRIVE_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Channel requested when none is given on the command line.
    pub channel: String,

    /// API root; must be HTTPS outside of local testing.
    pub base_url: String,

    /// Files requested per listing page (clamped to 1..=1000).
    pub page_size: u32,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retries for transient listing failures, per page.
    pub max_retries: u32,

    /// File extension identifying release artifacts.
    pub package_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        let drive = DriveClientOptions::default();
        let convention = NamingConvention::default();
        Self {
            folder_path: String::new(),
            package_id: String::new(),
            api_key: None,
            channel: convention.default_channel().to_string(),
            base_url: drive.base_url,
            page_size: drive.page_size,
            request_timeout_secs: drive.request_timeout.as_secs(),
            max_retries: drive.max_retries,
            package_extension: convention.extension().to_string(),
        }
    }
}

/// Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("folder_path", &self.folder_path)
            .field("package_id", &self.package_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("channel", &self.channel)
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("package_extension", &self.package_extension)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// A missing or blank file yields the defaults. Unknown keys are logged and
    /// ignored; a file that cannot be read, is over the size limit, or is not
    /// valid TOML is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        if size > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "{} is {} bytes (max {})",
                path.display(),
                size,
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)?;
        if let Ok(raw) = content.parse::<toml::Table>() {
            raw.keys()
                .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
                .for_each(|key| tracing::warn!(key = %key, "Unknown config key ignored"));
        }

        tracing::info!(
            path = %path.display(),
            folder = %config.folder_path,
            package = %config.package_id,
            "Loaded update source configuration"
        );
        Ok(config)
    }

    /// Resolve the API key, preferring the DRIVE_API_KEY environment variable.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key_with_override(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with_override(&self, env_value: Option<String>) -> Option<SecretString> {
        env_value
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .map(SecretString::from)
    }

    /// Options for building an [`UpdateSource`](crate::UpdateSource) from this config.
    ///
    /// `channel` is only the channel to request; files without a channel
    /// label always belong to the convention's default channel.
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            convention: NamingConvention::default().with_extension(&self.package_extension),
            drive: DriveClientOptions {
                base_url: self.base_url.clone(),
                page_size: self.page_size,
                request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
                max_retries: self.max_retries,
                ..DriveClientOptions::default()
            },
            span: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

use super::ReleaseEntry;
use crate::remote::FileMetadata;
use semver::Version;

pub const DEFAULT_CHANNEL: &str = "stable";
pub const DEFAULT_EXTENSION: &str = ".nupkg";

/// File-name grammar for release artifacts.
///
/// With the defaults a release file is named
/// `{package_id}-{version}[-{channel}][-full].nupkg`, for example
/// `MyApp-1.4.0-beta.2-beta-full.nupkg`:
///
/// - the version starts at the first hyphen segment (after the first) that
///   begins with a digit and contains a `.`; everything before it is the
///   package id
/// - after the version core, a final segment that starts with a letter and
///   has no `.` is the channel; segments in between are the semver pre-release
/// - `-delta` packages are patches against a previous release and never
///   appear in the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConvention {
    extension: String,
    default_channel: String,
    accept_full_marker: bool,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            default_channel: DEFAULT_CHANNEL.to_string(),
            accept_full_marker: true,
        }
    }
}

impl NamingConvention {
    /// Use a different artifact extension. A missing leading dot is added.
    pub fn with_extension(mut self, extension: &str) -> Self {
        let extension = extension.trim();
        if !extension.is_empty() {
            self.extension = if extension.starts_with('.') {
                extension.to_string()
            } else {
                format!(".{}", extension)
            };
        }
        self
    }

    /// Channel assigned to files that carry no channel label.
    pub fn with_default_channel(mut self, channel: &str) -> Self {
        let channel = channel.trim();
        if !channel.is_empty() {
            self.default_channel = channel.to_string();
        }
        self
    }

    /// Whether a trailing `-full` marker is stripped (otherwise it reads as a channel).
    pub fn with_full_marker(mut self, accept: bool) -> Self {
        self.accept_full_marker = accept;
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    /// Map a requested channel onto the convention; blank means the default.
    pub fn normalize_channel<'a>(&'a self, channel: &'a str) -> &'a str {
        let channel = channel.trim();
        if channel.is_empty() {
            self.default_channel.as_str()
        } else {
            channel
        }
    }

    pub fn matches_extension(&self, name: &str) -> bool {
        strip_suffix_ignore_case(name.trim(), &self.extension).is_some()
    }

    /// Parse a listing record into a release entry.
    ///
    /// Returns `None` for anything that does not follow the convention;
    /// foreign files routinely share the folder, so this is not an error.
    pub fn parse(&self, file: &FileMetadata) -> Option<ReleaseEntry> {
        let name = file.name.trim();
        let stem = strip_suffix_ignore_case(name, &self.extension)?;

        let mut segments: Vec<&str> = stem.split('-').collect();
        if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        if let Some(last) = segments.last() {
            if last.eq_ignore_ascii_case("delta") {
                return None;
            }
            if self.accept_full_marker && last.eq_ignore_ascii_case("full") && segments.len() > 2
            {
                segments.pop();
            }
        }

        let version_start = segments
            .iter()
            .skip(1)
            .position(|s| is_version_core(s))
            .map(|i| i + 1)?;

        let package_id = segments[..version_start].join("-");
        let mut version_segments = &segments[version_start..];

        let mut channel = None;
        if let Some((last, rest)) = version_segments.split_last() {
            if !rest.is_empty() && is_channel_label(last) {
                channel = Some(*last);
                version_segments = rest;
            }
        }

        let version = Version::parse(&version_segments.join("-")).ok()?;

        Some(ReleaseEntry {
            package_id,
            version,
            channel: channel.unwrap_or(self.default_channel.as_str()).to_string(),
            file_name: file.name.clone(),
            remote_id: file.id.clone(),
            size_bytes: file.size.unwrap_or(0),
            modified_time: file.modified_time,
        })
    }
}

/// Parse with the default `.nupkg` convention.
pub fn parse_release(file: &FileMetadata) -> Option<ReleaseEntry> {
    NamingConvention::default().parse(file)
}

fn is_version_core(segment: &str) -> bool {
    segment.starts_with(|c: char| c.is_ascii_digit()) && segment.contains('.')
}

fn is_channel_label(segment: &str) -> bool {
    segment.starts_with(|c: char| c.is_ascii_alphabetic())
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if suffix.is_empty() || name.len() <= suffix.len() {
        return None;
    }
    let split = name.len() - suffix.len();
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

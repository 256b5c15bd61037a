//! Resolved sources and remote URL acceptance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use url::{Host, Url};
use uuid::Uuid;

use crate::kind::MediaKind;

/// Maximum accepted URL length.
pub const MAX_URL_LENGTH: usize = 2048;

/// Hosting platforms whose URLs are accepted (subdomains included).
pub const ALLOWED_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitter.com",
    "x.com",
    "twitch.tv",
    "tiktok.com",
    "dailymotion.com",
];

/// Identifier of a resolved source, stable for the resolver's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a source came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceOrigin {
    RemoteUrl { url: String },
    UploadedFile { file_name: Option<String> },
}

/// A resolved, locally readable media input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHandle {
    pub id: SourceId,
    pub origin: SourceOrigin,
    pub title: String,
    pub approximate_size_bytes: u64,
    /// Probed duration; `None` when the container reports none
    pub duration_secs: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
    pub local_path: PathBuf,
    pub resolved_at: DateTime<Utc>,
}

impl SourceHandle {
    /// Whether this source can produce output of the given kind.
    pub fn supports(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => self.has_video,
            MediaKind::Audio => self.has_audio,
        }
    }
}

/// Why a URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejection {
    #[error("URL cannot be empty")]
    Empty,

    #[error("URL exceeds maximum length of {MAX_URL_LENGTH} characters")]
    TooLong,

    #[error("Invalid URL format: {0}")]
    Malformed(String),

    #[error("Invalid protocol '{0}'. Only HTTP and HTTPS are allowed.")]
    Scheme(String),

    #[error("URL appears to target an internal or restricted endpoint")]
    Blocked,

    #[error("Domain '{0}' is not supported. Use a supported video platform (YouTube, Vimeo, TikTok, etc.)")]
    DomainNotAllowed(String),
}

/// Check a remote source URL against the platform allowlist.
///
/// Returns the normalized URL on success.
pub fn validate_source_url(raw: &str) -> Result<Url, UrlRejection> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlRejection::Empty);
    }
    if raw.len() > MAX_URL_LENGTH {
        return Err(UrlRejection::TooLong);
    }

    let url = Url::parse(raw).map_err(|e| UrlRejection::Malformed(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlRejection::Scheme(other.to_string())),
    }

    let domain = match url.host() {
        Some(Host::Domain(d)) => d.to_ascii_lowercase(),
        Some(Host::Ipv4(ip)) => return Err(blocked_or_denied(IpAddr::V4(ip))),
        Some(Host::Ipv6(ip)) => return Err(blocked_or_denied(IpAddr::V6(ip))),
        None => return Err(UrlRejection::Malformed("URL must have a host".to_string())),
    };

    if domain == "localhost" || domain.starts_with("metadata.") || domain.ends_with(".internal") {
        return Err(UrlRejection::Blocked);
    }
    if !is_domain_allowed(&domain) {
        return Err(UrlRejection::DomainNotAllowed(domain));
    }

    Ok(url)
}

fn blocked_or_denied(ip: IpAddr) -> UrlRejection {
    let internal = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    };
    if internal {
        UrlRejection::Blocked
    } else {
        UrlRejection::DomainNotAllowed(ip.to_string())
    }
}

fn is_domain_allowed(domain: &str) -> bool {
    ALLOWED_DOMAINS
        .iter()
        .any(|allowed| domain == *allowed || domain.ends_with(&format!(".{allowed}")))
}

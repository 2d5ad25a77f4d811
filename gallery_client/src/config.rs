//! Client configuration: endpoint layout and transfer pacing.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Production API host.
pub const DEFAULT_API_HOST: &str = "https://api.icosa.gallery";

/// Size of one upload chunk. Each uploader step sends at most this much.
pub const DEFAULT_CHUNK_SIZE: usize = 512_000;

/// Delay between successive operation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls attempted before the import is declared timed out (~30 min at the
/// default interval).
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 900;

/// Endpoint layout and pacing knobs for one gallery client.
#[derive(Debug, Clone)]
pub struct GalleryConfig {
    /// URL files are POSTed to.
    pub upload_url: String,

    /// URL of the import submit endpoint.
    pub import_url: String,

    /// Base URL the polled operation name is appended to.
    pub poll_base_url: String,

    pub chunk_size: usize,

    pub poll_interval: Duration,

    /// `None` keeps polling until the operation is terminal.
    pub max_poll_attempts: Option<u32>,

    /// When set, local files larger than this are rejected before any bytes
    /// are sent.
    pub max_upload_bytes: Option<u64>,
}

impl GalleryConfig {
    /// Configuration for the standard endpoint layout under one host.
    pub fn for_host(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            upload_url: format!("{host}/uploads"),
            import_url: format!("{host}/v1/assets:startImport"),
            poll_base_url: format!("{host}/v1"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: Some(DEFAULT_MAX_POLL_ATTEMPTS),
            max_upload_bytes: None,
        }
    }

    /// Defaults with environment overrides applied.
    ///
    /// Recognized variables: `GALLERY_API_HOST`, `GALLERY_CHUNK_SIZE`,
    /// `GALLERY_POLL_INTERVAL_MS`, `GALLERY_MAX_POLL_ATTEMPTS` (0 disables
    /// the poll bound), `GALLERY_MAX_UPLOAD_BYTES`.
    pub fn from_env() -> Self {
        let host = env::var("GALLERY_API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_string());
        let mut config = Self::for_host(&host);

        if let Some(chunk_size) = parse_env("GALLERY_CHUNK_SIZE") {
            config.chunk_size = chunk_size;
        }
        if let Some(interval_ms) = parse_env::<u64>("GALLERY_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(attempts) = parse_env::<u32>("GALLERY_MAX_POLL_ATTEMPTS") {
            config.max_poll_attempts = (attempts > 0).then_some(attempts);
        }
        if let Some(limit) = parse_env("GALLERY_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = Some(limit);
        }

        config
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self::for_host(DEFAULT_API_HOST)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparsable {name}={raw}");
            None
        },
    }
}

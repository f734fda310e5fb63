use crate::error::FetchError;
use constants::texture::{FETCH_ATTEMPTS, FETCH_BACKOFF_MS, FETCH_TIMEOUT_SECONDS};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Anything that can turn a thumbnail URL into encoded image bytes.
pub trait ThumbnailSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Bounded retry with exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: FETCH_ATTEMPTS,
            backoff: Duration::from_millis(FETCH_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based retry count).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Fetches with retries on transient failures. Permanent failures return at once.
pub fn fetch_with_retry(
    source: &dyn ThumbnailSource,
    url: &str,
    policy: RetryPolicy,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 1;
    loop {
        match source.fetch(url) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_transient() && attempt < policy.attempts.max(1) => {
                log::debug!("retrying {url} after attempt {attempt}: {err}");
                pause(policy.delay_before(attempt));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn pause(delay: Duration) {
    std::thread::sleep(delay);
}

// Tasks share the browser's main thread, so retries go out back to back.
#[cfg(target_arch = "wasm32")]
fn pause(_delay: Duration) {}

/// True for URLs that have to go over the network.
pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Reads thumbnails relative to a local asset root.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ThumbnailSource for FileSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let relative = url.strip_prefix("file://").unwrap_or(url);
        let path = self.root.join(relative.trim_start_matches('/'));
        std::fs::read(&path).map_err(|source| FetchError::Io { path, source })
    }
}

/// Blocking HTTP(S) source with a per-request timeout.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("sphere-gallery/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: format!("client error: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ThumbnailSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().map_err(transport)?.to_vec())
    }
}

/// Routes `http(s)://` URLs to the network and everything else to files.
pub struct UrlSource {
    #[cfg(not(target_arch = "wasm32"))]
    http: Option<HttpSource>,
    files: FileSource,
}

impl UrlSource {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            http: HttpSource::new(Duration::from_secs(FETCH_TIMEOUT_SECONDS))
                .inspect_err(|e| log::warn!("HTTP thumbnails disabled: {e}"))
                .ok(),
            files: FileSource::new(asset_root),
        }
    }
}

impl ThumbnailSource for UrlSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if is_remote(url) {
            #[cfg(not(target_arch = "wasm32"))]
            if let Some(http) = &self.http {
                return http.fetch(url);
            }
            return Err(FetchError::Unsupported(url.to_string()));
        }
        self.files.fetch(url)
    }
}

/// In-memory thumbnails, for hosts that already hold the bytes.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    images: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(url.into(), bytes);
    }
}

impl ThumbnailSource for MemorySource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.images.get(url).cloned().ok_or_else(|| FetchError::Io {
            path: PathBuf::from(url),
            source: std::io::ErrorKind::NotFound.into(),
        })
    }
}

//! Archive fetching with an on-disk download cache.
//!
//! `http://` and `https://` URLs are downloaded once into
//! `<cache>/<url digest>/<file name>` and reused afterwards. `file://` URLs
//! and absolute paths are used in place.

use crate::output;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of retries after a failed download attempt
pub const DEFAULT_RETRIES: u32 = 2;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("local archive not found: {0}")]
    NotFound(PathBuf),
    #[error("server returned HTTP {status}")]
    Status { status: u16 },
    #[error("transfer failed after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Resolves a URL to a local archive path.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<PathBuf, FetchError>;

    /// Forget any cached copy of `url`, e.g. after it failed verification.
    fn evict(&self, _url: &str) {}
}

/// Fetcher backed by `ureq` and a download cache directory.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    cache_dir: PathBuf,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
    dry_run: bool,
}

impl HttpFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_secs(1),
            dry_run: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Base delay between attempts; attempt `n` waits `n * delay`.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Where a downloaded URL lives in the cache.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        self.cache_dir.join(&digest[..16]).join(url_filename(url))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let dir = dest.parent().unwrap_or(&self.cache_dir);
        std::fs::create_dir_all(dir).map_err(|e| FetchError::io(dir, e))?;

        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let attempts = self.retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                output::warning(&format!(
                    "retrying {} (attempt {}/{}): {}",
                    url, attempt, attempts, last_error
                ));
                std::thread::sleep(self.retry_delay * (attempt - 1));
            }

            match agent.get(url).call() {
                Ok(response) => match self.write_response(response, url, dest) {
                    Ok(bytes) => return Ok(bytes),
                    Err(FetchError::Transport { message, .. }) => last_error = message,
                    Err(e) => return Err(e),
                },
                Err(ureq::Error::Status(status, _)) if !is_retryable_status(status) => {
                    return Err(FetchError::Status { status });
                }
                Err(ureq::Error::Status(status, _)) => last_error = format!("HTTP {}", status),
                Err(ureq::Error::Transport(t)) => last_error = t.to_string(),
            }
        }

        Err(FetchError::Transport {
            attempts,
            message: last_error,
        })
    }

    fn write_response(
        &self,
        response: ureq::Response,
        url: &str,
        dest: &Path,
    ) -> Result<u64, FetchError> {
        let pb = output::spinner(&format!("downloading {}", url_filename(url)));
        if let Some(len) = response
            .header("content-length")
            .and_then(|s| s.parse().ok())
        {
            output::upgrade_to_bytes(&pb, len);
        }

        let dir = dest.parent().unwrap_or(&self.cache_dir);
        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| FetchError::io(dir, e))?;
        let mut reader = response.into_reader();
        let mut buffer = [0u8; 64 * 1024];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(n) => n,
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(FetchError::Transport {
                        attempts: 1,
                        message: e.to_string(),
                    });
                }
            };
            if n == 0 {
                break;
            }
            staged
                .write_all(&buffer[..n])
                .map_err(|e| FetchError::io(staged.path(), e))?;
            total += n as u64;
            pb.set_position(total);
        }
        pb.finish_and_clear();

        staged
            .persist(dest)
            .map_err(|e| FetchError::io(dest, e.error))?;
        Ok(total)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        if let Some(path) = local_path(url) {
            if !self.dry_run && !path.is_file() {
                return Err(FetchError::NotFound(path));
            }
            return Ok(path);
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::UnsupportedScheme(url.to_string()));
        }

        let dest = self.cache_path(url);
        if dest.is_file() {
            output::detail(&format!("using cached {}", dest.display()));
            return Ok(dest);
        }
        if self.dry_run {
            output::command("dry-run", &format!("download {}", url));
            return Ok(dest);
        }

        let bytes = self.download(url, &dest)?;
        output::detail(&format!("downloaded {} ({} bytes)", url_filename(url), bytes));
        Ok(dest)
    }

    fn evict(&self, url: &str) {
        if local_path(url).is_none() {
            let _ = std::fs::remove_file(self.cache_path(url));
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(rest) = url.strip_prefix("file://") {
        Some(PathBuf::from(rest))
    } else if url.starts_with('/') {
        Some(PathBuf::from(url))
    } else {
        None
    }
}

/// Extract the file name from a URL, ignoring any query string.
pub fn url_filename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "download".to_string(),
    }
}

/// Verify a file's SHA-256 digest.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), FetchError> {
    let mut file = std::fs::File::open(path).map_err(|e| FetchError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).map_err(|e| FetchError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let actual = hex::encode(hasher.finalize());
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FetchError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

//! Byte fetching from archive locations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;

/// Where an archive lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Base URL without a trailing slash.
    Http(String),
    /// Absolute directory on the local filesystem.
    Local(PathBuf),
}

impl Location {
    /// Classify a configured location string.
    pub fn parse(location: &str) -> Result<Self, FetchError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(Self::Http(location.trim_end_matches('/').to_string()));
        }
        let path = location.strip_prefix("file://").unwrap_or(location);
        if Path::new(path).is_absolute() {
            return Ok(Self::Local(PathBuf::from(path)));
        }
        Err(FetchError::UnsupportedLocation {
            location: location.to_string(),
        })
    }

    /// Human-readable address of `file` at this location.
    pub fn describe(&self, file: &str) -> String {
        match self {
            Self::Http(base) => format!("{base}/{file}"),
            Self::Local(dir) => dir.join(file).display().to_string(),
        }
    }
}

/// Retrieves one file from an archive location.
///
/// A missing file must be reported as [`FetchError::NotFound`]; callers rely
/// on it to tell an absent signature from a failed download.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, location: &Location, file: &str) -> Result<Vec<u8>, FetchError>;
}

/// Reads archives from local directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, location: &Location, file: &str) -> Result<Vec<u8>, FetchError> {
        let Location::Local(dir) = location else {
            return Err(FetchError::UnsupportedLocation {
                location: location.describe(""),
            });
        };
        let path = dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound {
                location: path.display().to_string(),
            }),
            Err(source) => Err(FetchError::Io { path, source }),
        }
    }
}

/// Default timeout for one HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Downloads from HTTP(S) archives.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parcel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http {
                url: String::new(),
                status: None,
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, location: &Location, file: &str) -> Result<Vec<u8>, FetchError> {
        let Location::Http(_) = location else {
            return Err(FetchError::UnsupportedLocation {
                location: location.describe(""),
            });
        };
        let url = location.describe(file);
        tracing::debug!(%url, "GET");

        let http_error = |status: Option<u16>, message: String| FetchError::Http {
            url: url.clone(),
            status,
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http_error(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { location: url });
        }
        if !status.is_success() {
            return Err(http_error(Some(status.as_u16()), format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| http_error(Some(status.as_u16()), e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Dispatches on the location kind.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    local: LocalFetcher,
    http: HttpFetcher,
}

impl SourceFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            local: LocalFetcher,
            http: HttpFetcher::new()?,
        })
    }
}

#[async_trait]
impl Fetcher for SourceFetcher {
    async fn fetch(&self, location: &Location, file: &str) -> Result<Vec<u8>, FetchError> {
        match location {
            Location::Local(_) => self.local.fetch(location, file).await,
            Location::Http(_) => self.http.fetch(location, file).await,
        }
    }
}

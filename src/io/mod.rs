mod http;
mod local;

pub use http::HttpFetcher;
pub use local::LocalFileFetcher;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Bytes read from the source before each write to disk.
pub const CHUNK_SIZE: usize = 8192;

/// Errors raised while retrieving an archive
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("HTTP request failed with status: {0}")]
    Status(StatusCode),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for retrieving a remote resource onto local disk
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Stream `url` into `destination`, creating parent directories.
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError>;
}

/// Dispatches on the URL scheme: `http(s)://` over the network, `file://`
/// from the local filesystem.
pub struct UrlFetcher {
    http: HttpFetcher,
    local: LocalFileFetcher,
}

impl UrlFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpFetcher::new(timeout)?,
            local: LocalFileFetcher,
        })
    }
}

#[async_trait]
impl Fetch for UrlFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let size = match parsed.scheme() {
            "http" | "https" => self.http.fetch(url, destination).await?,
            "file" => self.local.fetch(url, destination).await?,
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        };

        info!(
            size_bytes = size,
            target_path = %destination.display(),
            "File downloaded successfully"
        );
        Ok(size)
    }
}

async fn create_parent(destination: &Path) -> Result<(), FetchError> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unknown_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = UrlFetcher::new(Duration::from_secs(5)).unwrap();

        let err = fetcher
            .fetch("ftp://example.com/a.zip", &dir.path().join("a.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(s) if s == "ftp"));

        let err = fetcher
            .fetch("not a url", &dir.path().join("a.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn fetches_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.zip");
        let payload = vec![7u8; CHUNK_SIZE * 3 + 11];
        std::fs::write(&source, &payload).unwrap();

        let url = reqwest::Url::from_file_path(&source).unwrap();
        let destination = dir.path().join("work/nested/archive.zip");
        let fetcher = UrlFetcher::new(Duration::from_secs(5)).unwrap();
        let size = fetcher.fetch(url.as_str(), &destination).await.unwrap();

        assert_eq!(size, payload.len() as u64);
        assert_eq!(std::fs::read(&destination).unwrap(), payload);
    }
}

use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};

use super::{create_parent, Fetch, FetchError, CHUNK_SIZE};

/// Copies a `file://` archive into the workspace
pub struct LocalFileFetcher;

#[async_trait]
impl Fetch for LocalFileFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let source = reqwest::Url::parse(url)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        create_parent(destination).await?;

        let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(&source).await?);
        let mut file = File::create(destination).await?;
        let written = tokio::io::copy_buf(&mut reader, &mut file).await?;
        file.flush().await?;

        Ok(written)
    }
}

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::info;
use zip::ZipArchive;

use crate::error::{PipelineError, Result};

/// Extract every entry of the zip archive at `archive_path` into
/// `destination`, creating it if needed.
///
/// Entry names escaping `destination` are rejected by the zip crate. Returns
/// the number of entries in the archive.
pub fn extract_all(archive_path: &Path, destination: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| PipelineError::Extraction(e.to_string()))?;

    let entries = archive.len();
    std::fs::create_dir_all(destination)?;
    archive
        .extract(destination)
        .map_err(|e| PipelineError::Extraction(e.to_string()))?;

    info!(entries, path = %destination.display(), "Archive successfully extracted");
    Ok(entries)
}

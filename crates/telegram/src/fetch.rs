//! Materialization of remote file parts to local storage before upload.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};

/// Returns true when a part source needs downloading before it can be
/// attached to an upload.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Downloads `url` into the engine's temp directory and returns the local
/// path. `filename` wins over the URL's last path segment when provided.
pub async fn materialize(url: &str, filename: Option<&str>) -> Result<PathBuf> {
    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(Error::message(format!(
            "failed to download file: HTTP {}",
            response.status()
        )));
    }
    let bytes = response.bytes().await?;

    let dir = std::env::temp_dir().join("pontis");
    tokio::fs::create_dir_all(&dir).await?;

    let name = filename
        .map(String::from)
        .or_else(|| {
            url.rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| "download.bin".to_string());
    let path = dir.join(name);

    tokio::fs::write(&path, &bytes).await?;
    debug!(url, path = %path.display(), bytes = bytes.len(), "materialized remote file");
    Ok(path)
}

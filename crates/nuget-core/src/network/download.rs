//! Streamed package downloads.
//!
//! The body is written to `{destination}.part` and renamed into place once
//! complete, so a failed or cancelled download never leaves a truncated
//! `.nupkg` behind.

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::credentials::Credentials;
use crate::error::{NugetError, Result};
use crate::network::client::{race, HttpClient};
use crate::network::retry::{retry_async, RetryConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Path of the in-progress file for `destination`.
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Download `url` to `destination` with retries. Returns the byte count.
pub async fn download_file(
    http: &HttpClient,
    url: &str,
    credentials: Option<&Credentials>,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| NugetError::io_with_path(e, parent))?;
        }
    }

    let temp_path = temp_path_for(destination);
    let result = retry_async(&RetryConfig::default(), cancel, || {
        stream_to_file(http, url, credentials, &temp_path, cancel)
    })
    .await;

    match result {
        Ok(bytes) => {
            if let Err(e) = tokio::fs::rename(&temp_path, destination).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(NugetError::io_with_path(e, destination));
            }
            info!("Downloaded {} bytes to {}", bytes, destination.display());
            Ok(bytes)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

async fn stream_to_file(
    http: &HttpClient,
    url: &str,
    credentials: Option<&Credentials>,
    temp_path: &Path,
    cancel: &CancellationToken,
) -> Result<u64> {
    let response = http.get(url, credentials, cancel).await?;

    let mut file = tokio::fs::File::create(temp_path)
        .await
        .map_err(|e| NugetError::io_with_path(e, temp_path))?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = race(cancel, stream.next()).await? {
        let chunk = chunk.map_err(|e| NugetError::from_reqwest(url, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| NugetError::io_with_path(e, temp_path))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| NugetError::io_with_path(e, temp_path))?;

    if written == 0 {
        return Err(NugetError::DownloadFailed {
            url: url.to_string(),
            message: "server returned an empty package".to_string(),
        });
    }
    debug!("Streamed {} bytes from {}", written, url);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_for() {
        let path = temp_path_for(Path::new("/tmp/pkgs/serilog.2.10.0.nupkg"));
        assert_eq!(path, PathBuf::from("/tmp/pkgs/serilog.2.10.0.nupkg.part"));
    }
}

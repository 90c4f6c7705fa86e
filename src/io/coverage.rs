//! HTTP retrieval of raster coverages

use crate::types::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fetches a remote coverage into a local file
pub trait CoverageClient {
    fn fetch(&self, url: &str, output_path: &Path) -> PipelineResult<()>;
}

/// Blocking reqwest client with a fixed number of attempts per request
pub struct HttpCoverageClient {
    client: reqwest::blocking::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpCoverageClient {
    pub fn new(max_retries: u32, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("plotvars/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Download(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_retries: max_retries.max(1),
            retry_delay: Duration::from_secs(2),
        })
    }

    fn try_download_once(&self, url: &str, output_path: &Path) -> PipelineResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| PipelineError::Download(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Download(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                url
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| PipelineError::Download(format!("Failed to read response body: {}", e)))?;
        if content.is_empty() {
            return Err(PipelineError::Download(format!("Empty response from {}", url)));
        }
        log::debug!("Downloaded {} bytes", content.len());
        if !is_tiff_content(&content) {
            return Err(PipelineError::Download(format!("Response from {} is not a GeoTIFF", url)));
        }
        write_completed(output_path, &content)
    }
}

/// Path a download is staged under until it is complete
pub fn partial_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Write `content` to `<output_path>.part` and move it into place.
///
/// `output_path` only ever exists with the full content; the staging file is
/// removed when writing fails.
pub fn write_completed(output_path: &Path, content: &[u8]) -> PipelineResult<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(output_path);
    let result = std::fs::write(&partial, content).and_then(|()| std::fs::rename(&partial, output_path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

/// TIFF or BigTIFF byte-order mark plus magic number
fn is_tiff_content(data: &[u8]) -> bool {
    [b"II*\0", b"MM\0*", b"II+\0", b"MM\0+"]
        .iter()
        .any(|magic| data.starts_with(*magic))
}

impl CoverageClient for HttpCoverageClient {
    fn fetch(&self, url: &str, output_path: &Path) -> PipelineResult<()> {
        log::info!("Downloading coverage from: {}", url);
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            log::debug!("Download attempt {} of {}", attempt, self.max_retries);
            match self.try_download_once(url, output_path) {
                Ok(()) => {
                    log::info!("Saved coverage to: {}", output_path.display());
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("Download attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PipelineError::Download("Download failed after all retries".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_completed_write_leaves_no_partial() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output = temp_dir.path().join("wcs").join("phh2o_0-5cm_mean.tif");
        write_completed(&output, b"II*\0data").expect("write");
        assert_eq!(std::fs::read(&output).unwrap(), b"II*\0data");
        assert!(!partial_path(&output).exists());
        assert_eq!(
            partial_path(&output).file_name().and_then(|n| n.to_str()),
            Some("phh2o_0-5cm_mean.tif.part")
        );
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // The target is an existing directory, so the final rename fails
        let output = temp_dir.path().join("occupied.tif");
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("keep"), b"").unwrap();
        assert!(write_completed(&output, b"II*\0data").is_err());
        assert!(output.is_dir());
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn test_unreachable_server_writes_no_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output = temp_dir.path().join("bdod.tif");
        let client = HttpCoverageClient::new(1, Duration::from_secs(2)).expect("client");
        assert!(client.fetch("http://127.0.0.1:9/coverage.tif", &output).is_err());
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn test_tiff_signature() {
        assert!(is_tiff_content(b"II*\0\x08\0\0\0"));
        assert!(is_tiff_content(b"MM\0*\0\0\0\x08"));
        assert!(!is_tiff_content(b"<?xml version=\"1.0\"?><ows:ExceptionReport"));
    }
}

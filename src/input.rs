//! Input resolution: load a document JSON from a local path or a URL.
//!
//! Local files are read whole; URLs are fetched with a one-shot `reqwest`
//! client bounded by `timeout_secs`. In both cases the bytes are parsed into
//! a [`Document`] here so callers get a loader error that names the source
//! rather than a bare serde message.

use crate::document::Document;
use crate::error::PaperpressError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load and parse a document from `input` (path or HTTP(S) URL).
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<Document, PaperpressError> {
    let bytes = if is_url(input) {
        download(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    parse(input, &bytes)
}

/// Parse document JSON, attributing errors to `source_name`.
pub fn parse(source_name: &str, bytes: &[u8]) -> Result<Document, PaperpressError> {
    let doc: Document =
        serde_json::from_slice(bytes).map_err(|e| PaperpressError::InvalidDocument {
            source_name: source_name.to_string(),
            detail: e.to_string(),
        })?;
    debug!(
        "Parsed document '{}' ({} sections) from {}",
        doc.title,
        doc.sections.len(),
        source_name
    );
    Ok(doc)
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, PaperpressError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(PaperpressError::PermissionDenied { path })
        }
        Err(_) => Err(PaperpressError::DocumentNotFound { path }),
    }
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, PaperpressError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| PaperpressError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

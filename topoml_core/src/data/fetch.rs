//! Downloading published datasets that are missing locally.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::DatasetError;

/// Make sure `path` exists, downloading it from `url` when it does not.
///
/// A failed download is fatal for the run; there are no retries.
pub fn ensure_local(path: &Path, url: &str) -> Result<(), DatasetError> {
    if path.exists() {
        return Ok(());
    }

    info!(url, path = %path.display(), "retrieving dataset from web");
    let download_err = |message: String| DatasetError::Download {
        url: url.to_string(),
        message,
    };

    let bytes = reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .map_err(|err| download_err(err.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }

    fs::write(path, &bytes).map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!(bytes = bytes.len(), "dataset stored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.npz");
        fs::write(&path, b"cached").unwrap();

        // an unroutable URL would fail if a download were attempted
        ensure_local(&path, "http://127.0.0.1:9/never").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"cached");
    }

    #[test]
    fn test_failed_download_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.npz");
        let result = ensure_local(&path, "http://127.0.0.1:9/never");
        assert!(matches!(result, Err(DatasetError::Download { .. })));
        assert!(!path.exists());
    }
}

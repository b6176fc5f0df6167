//! Input resolution: normalise each submitted path or URL to a local file.
//!
//! pdfium requires a file-system path, so URL inputs are downloaded into a
//! `TempDir` whose lifetime is tied to the returned value; cleanup happens
//! automatically when the request context is dropped. The `%PDF` magic bytes
//! are validated before pdfium ever sees the file, so callers get a
//! meaningful error rather than a library crash.

use crate::error::TaxDocError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A resolved document — either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedDocument {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedDocument {
    /// Path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedDocument::Local(p) => p,
            ResolvedDocument::Downloaded { path, .. } => path,
        }
    }

    /// Short display name used in notes, failures and source lists.
    pub fn display_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path().to_string_lossy().into_owned())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve one submitted document to a local PDF file.
pub async fn resolve_document(
    input: &str,
    timeout_secs: u64,
) -> Result<ResolvedDocument, TaxDocError> {
    if input.trim().is_empty() {
        return Err(TaxDocError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedDocument, TaxDocError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(TaxDocError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(TaxDocError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TaxDocError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(TaxDocError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedDocument::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedDocument, TaxDocError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TaxDocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TaxDocError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TaxDocError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TaxDocError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);

    let temp_dir = TempDir::new().map_err(|e| TaxDocError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TaxDocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(TaxDocError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| TaxDocError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedDocument::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Extract a reasonable filename from the URL.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/w2.pdf"));
        assert!(is_url("http://example.com/w2.pdf"));
        assert!(!is_url("/tmp/w2.pdf"));
        assert!(!is_url("w2.pdf"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = resolve_document("   ", 10).await.unwrap_err();
        assert!(matches!(err, TaxDocError::InvalidInput { .. }));
    }

    #[test]
    fn local_missing_file_is_not_found() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, TaxDocError::FileNotFound { .. }));
    }

    #[test]
    fn local_non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let err = resolve_local(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TaxDocError::NotAPdf { .. }));
    }

    #[test]
    fn display_name_uses_file_name() {
        let doc = ResolvedDocument::Local(PathBuf::from("/uploads/2024/my w2.pdf"));
        assert_eq!(doc.display_name(), "my w2.pdf");
    }

    #[test]
    fn filename_from_url_falls_back() {
        assert_eq!(filename_from_url("https://x.test/a/w2.pdf"), "w2.pdf");
        assert_eq!(filename_from_url("https://x.test/"), "downloaded.pdf");
    }
}

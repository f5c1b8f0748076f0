//! Input resolution: normalise a user-supplied path or URL to a local file
//! and classify it as a PDF or an image.
//!
//! URLs are downloaded into a `TempDir` owned by the returned
//! [`ResolvedInput`], so the file lives exactly as long as the run needs it.
//! The format is decided from magic bytes, never from the file extension:
//! phone uploads routinely arrive as `IMG_1234` or `scan.pdf.jpg`.

use crate::error::ExtractError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// What kind of document an input is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Multi-page PDF, rasterised page by page.
    Pdf,
    /// Single image, passed through unchanged.
    Image { mime_type: &'static str },
}

/// A local, classified input file.
#[derive(Debug)]
pub struct ResolvedInput {
    path: PathBuf,
    kind: InputKind,
    /// Kept alive so a downloaded file is removed only after processing.
    _temp_dir: Option<TempDir>,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &InputKind {
        &self.kind
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Classify a file by its leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<InputKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(InputKind::Pdf);
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => Some(InputKind::Image {
            mime_type: "image/png",
        }),
        Ok(image::ImageFormat::Jpeg) => Some(InputKind::Image {
            mime_type: "image/jpeg",
        }),
        _ => None,
    }
}

fn magic_of(bytes: &[u8]) -> [u8; 4] {
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    magic
}

/// Resolve the input string to a classified local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    if input.trim().is_empty() {
        return Err(ExtractError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and format.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, ExtractError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(ExtractError::FileNotFound { path });
    }

    let mut head = Vec::with_capacity(16);
    match std::fs::File::open(&path) {
        Ok(f) => {
            f.take(16)
                .read_to_end(&mut head)
                .map_err(|e| ExtractError::Internal(format!("Failed to read {}: {e}", path.display())))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound { path });
        }
    }

    let kind = sniff(&head).ok_or_else(|| ExtractError::UnsupportedFormat {
        path: path.clone(),
        magic: magic_of(&head),
    })?;

    debug!("Resolved local input {} as {:?}", path.display(), kind);
    Ok(ResolvedInput {
        path,
        kind,
        _temp_dir: None,
    })
}

/// Download a URL to a temporary directory and classify it.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| ExtractError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let kind = sniff(&bytes).ok_or_else(|| ExtractError::UnsupportedFormat {
        path: file_path.clone(),
        magic: magic_of(&bytes),
    })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ExtractError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput {
        path: file_path,
        kind,
        _temp_dir: Some(temp_dir),
    })
}

/// Last non-empty path segment of a URL, or a generic name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/register.pdf"));
        assert!(is_url("http://example.com/page.jpg"));
        assert!(!is_url("/tmp/register.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniff_formats() {
        assert_eq!(sniff(b"%PDF-1.7\n"), Some(InputKind::Pdf));
        assert_eq!(
            sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(InputKind::Image {
                mime_type: "image/png"
            })
        );
        assert_eq!(
            sniff(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(InputKind::Image {
                mime_type: "image/jpeg"
            })
        );
        assert_eq!(sniff(b"No,Nama\n"), None);
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://x.test/a/b/scan1.jpg"), "scan1.jpg");
        assert_eq!(filename_from_url("https://x.test/"), "downloaded");
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn unsupported_local_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"No,Nama Pasien\n1,SRI\n").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn pdf_local_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.4\n%...").unwrap();
        let resolved = resolve_input(f.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.kind(), &InputKind::Pdf);
        assert_eq!(resolved.path(), f.path());
    }
}

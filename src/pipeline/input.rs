//! Document resolution: turn what the viewer reports into a local PDF path.
//!
//! Viewers report either a plain path or a `file://` URL with percent-encoded
//! characters (`file:///home/me/T%C3%A4mil%20Reader.pdf`). pdfium needs a
//! file-system path, and we check the `%PDF` magic bytes up front so a wrong
//! file yields a readable error rather than a pdfium failure.

use crate::error::AssistantError;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

/// Check if the reported document looks like a URL.
pub fn is_file_url(reported: &str) -> bool {
    reported.starts_with("file://")
}

/// Resolve a viewer-reported document to a readable local PDF.
pub fn resolve_document(reported: &str) -> Result<PathBuf, AssistantError> {
    let reported = reported.trim();
    if reported.is_empty() {
        return Err(AssistantError::ViewerUnavailable {
            detail: "viewer reported no open document".into(),
        });
    }

    let path = if is_file_url(reported) {
        file_url_to_path(reported)?
    } else {
        PathBuf::from(reported)
    };
    check_pdf(path)
}

/// Check that `path` exists, is readable, and starts with `%PDF`.
pub fn check_pdf(path: impl Into<PathBuf>) -> Result<PathBuf, AssistantError> {
    let path = path.into();
    if !path.exists() {
        return Err(AssistantError::DocumentNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(AssistantError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AssistantError::PermissionDenied { path });
        }
        Err(_) => return Err(AssistantError::DocumentNotFound { path }),
    }

    debug!("Resolved document: {}", path.display());
    Ok(path)
}

fn file_url_to_path(url: &str) -> Result<PathBuf, AssistantError> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| AssistantError::DocumentNotFound {
            path: PathBuf::from(url),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &std::path::Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_is_file_url() {
        assert!(is_file_url("file:///tmp/a.pdf"));
        assert!(!is_file_url("/tmp/a.pdf"));
        assert!(!is_file_url("https://example.com/a.pdf"));
    }

    #[test]
    fn plain_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "book.pdf", b"%PDF-1.7\n");
        assert_eq!(resolve_document(path.to_str().unwrap()).unwrap(), path);
    }

    #[test]
    fn percent_encoded_url_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "Tamil Reader.pdf", b"%PDF-1.4\n");
        let url = format!("file://{}", path.display()).replace(' ', "%20");
        assert_eq!(resolve_document(&url).unwrap(), path);
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(
            resolve_document("/definitely/not/here.pdf"),
            Err(AssistantError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "fake.pdf", b"PK\x03\x04zip");
        match resolve_document(path.to_str().unwrap()) {
            Err(AssistantError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[test]
    fn check_pdf_accepts_path_buf() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.pdf", b"%PDF-2.0\n");
        assert_eq!(check_pdf(path.clone()).unwrap(), path);
        let short = write_file(dir.path(), "b.pdf", b"%P");
        assert!(matches!(check_pdf(short), Err(AssistantError::NotAPdf { .. })));
    }

    #[test]
    fn blank_report_means_no_document() {
        assert!(matches!(
            resolve_document("  "),
            Err(AssistantError::ViewerUnavailable { .. })
        ));
    }
}

//! Document viewer integration.
//!
//! The session only needs three answers from the viewer: which document is
//! open, which page is showing, and what text is selected. [`DocumentViewer`]
//! is that seam; [`OkularViewer`] answers it for KDE Okular over D-Bus using
//! the `qdbus` command-line client, and reads the selection from the X primary
//! selection with `xclip`.
//!
//! Reading page and document takes two separate calls, and the user may turn
//! the page in between. [`snapshot`] reads the page before and after the
//! document and retries until both readings agree.

use crate::error::AssistantError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Attempts [`snapshot`] makes before giving up.
pub const MAX_SNAPSHOT_ATTEMPTS: u32 = 3;

/// What the session needs from a document viewer.
pub trait DocumentViewer: Send + Sync {
    /// The page currently shown, 1-based.
    fn current_page(&self) -> BoxFuture<'_, Result<usize, AssistantError>>;

    /// The open document as reported by the viewer: a path or a `file://` URL.
    fn current_document(&self) -> BoxFuture<'_, Result<String, AssistantError>>;

    /// The selected text; empty when nothing is selected.
    fn selected_text(&self) -> BoxFuture<'_, Result<String, AssistantError>>;
}

/// A consistent (document, page) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSnapshot {
    pub document: String,
    pub page: usize,
}

/// Read the document and page the viewer is showing.
///
/// The page is read before and after the document; if the two readings differ
/// the user navigated mid-read and the snapshot is taken again, up to
/// [`MAX_SNAPSHOT_ATTEMPTS`] times.
pub async fn snapshot(viewer: &dyn DocumentViewer) -> Result<ViewerSnapshot, AssistantError> {
    for attempt in 1..=MAX_SNAPSHOT_ATTEMPTS {
        let before = viewer.current_page().await?;
        let document = viewer.current_document().await?;
        let after = viewer.current_page().await?;
        if before == after {
            return Ok(ViewerSnapshot {
                document,
                page: after,
            });
        }
        debug!(
            "Viewer page changed during snapshot ({} → {}), attempt {}",
            before, after, attempt
        );
    }
    Err(AssistantError::ViewerInconsistent {
        attempts: MAX_SNAPSHOT_ATTEMPTS,
    })
}

/// [`DocumentViewer`] for a running Okular instance.
///
/// The D-Bus service name (`org.kde.okular-<pid>`) is discovered on first use
/// and cached; when a call on the cached name fails (Okular restarted), the
/// name is discovered again and the call retried once.
#[derive(Debug)]
pub struct OkularViewer {
    service_prefix: String,
    object_path: String,
    service: Mutex<Option<String>>,
}

impl OkularViewer {
    pub fn new(service_prefix: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            service_prefix: service_prefix.into(),
            object_path: object_path.into(),
            service: Mutex::new(None),
        }
    }

    async fn discover(&self) -> Result<String, AssistantError> {
        let listing = run("qdbus", &[]).await?;
        let service = find_service(&listing, &self.service_prefix).ok_or_else(|| {
            AssistantError::ViewerUnavailable {
                detail: format!("no D-Bus service named {}* (is Okular running?)", self.service_prefix),
            }
        })?;
        info!("Found viewer service: {}", service);
        if let Ok(mut cached) = self.service.lock() {
            *cached = Some(service.clone());
        }
        Ok(service)
    }

    fn cached_service(&self) -> Option<String> {
        self.service.lock().ok().and_then(|s| s.clone())
    }

    fn forget_service(&self) {
        if let Ok(mut cached) = self.service.lock() {
            *cached = None;
        }
    }

    /// Call `method` on the viewer object and return its trimmed output.
    async fn call(&self, method: &str) -> Result<String, AssistantError> {
        if let Some(service) = self.cached_service() {
            match run("qdbus", &[&service, &self.object_path, method]).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    debug!("Call on cached service {} failed: {}; rediscovering", service, e);
                    self.forget_service();
                }
            }
        }
        let service = self.discover().await?;
        run("qdbus", &[&service, &self.object_path, method]).await
    }
}

impl Default for OkularViewer {
    fn default() -> Self {
        Self::new("org.kde.okular", "/okular")
    }
}

impl DocumentViewer for OkularViewer {
    fn current_page(&self) -> BoxFuture<'_, Result<usize, AssistantError>> {
        async move { parse_page(&self.call("currentPage").await?) }.boxed()
    }

    fn current_document(&self) -> BoxFuture<'_, Result<String, AssistantError>> {
        async move {
            let doc = self.call("currentDocument").await?;
            if doc.is_empty() {
                return Err(AssistantError::ViewerUnavailable {
                    detail: "no document open".into(),
                });
            }
            Ok(doc)
        }
        .boxed()
    }

    fn selected_text(&self) -> BoxFuture<'_, Result<String, AssistantError>> {
        async move {
            // Okular has no D-Bus call for the selection; the X primary
            // selection holds it while the text is highlighted.
            match run("xclip", &["-o", "-selection", "primary"]).await {
                Ok(text) => Ok(text),
                Err(e) => {
                    warn!("Could not read selection: {}", e);
                    Ok(String::new())
                }
            }
        }
        .boxed()
    }
}

/// Run a helper program and return its trimmed stdout.
async fn run(bin: &str, args: &[&str]) -> Result<String, AssistantError> {
    let out = Command::new(bin).args(args).output().await.map_err(|e| {
        let detail = if e.kind() == std::io::ErrorKind::NotFound {
            format!("`{bin}` is not installed")
        } else {
            format!("failed to run `{bin}`: {e}")
        };
        AssistantError::ViewerUnavailable { detail }
    })?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(AssistantError::ViewerUnavailable {
            detail: format!("`{bin}` exited with {}: {}", out.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// First service in a `qdbus` listing whose name starts with `prefix`.
fn find_service(listing: &str, prefix: &str) -> Option<String> {
    listing
        .lines()
        .map(str::trim)
        .find(|name| name.starts_with(prefix))
        .map(str::to_string)
}

fn parse_page(raw: &str) -> Result<usize, AssistantError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| AssistantError::ViewerUnavailable {
            detail: format!("viewer returned a non-numeric page: {raw:?}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns pages from a script, one per call.
    struct ScriptedViewer {
        pages: Vec<usize>,
        calls: AtomicUsize,
    }

    impl DocumentViewer for ScriptedViewer {
        fn current_page(&self) -> BoxFuture<'_, Result<usize, AssistantError>> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let page = self.pages[i.min(self.pages.len() - 1)];
            async move { Ok(page) }.boxed()
        }

        fn current_document(&self) -> BoxFuture<'_, Result<String, AssistantError>> {
            async { Ok("/books/reader.pdf".to_string()) }.boxed()
        }

        fn selected_text(&self) -> BoxFuture<'_, Result<String, AssistantError>> {
            async { Ok(String::new()) }.boxed()
        }
    }

    #[test]
    fn find_service_matches_prefix() {
        let listing = ":1.12\n org.freedesktop.DBus\n org.kde.okular-41234\n org.kde.okular-5000\n";
        assert_eq!(
            find_service(listing, "org.kde.okular").as_deref(),
            Some("org.kde.okular-41234")
        );
        assert_eq!(find_service(listing, "org.kde.kate"), None);
    }

    #[test]
    fn parse_page_rejects_garbage() {
        assert_eq!(parse_page(" 12\n").unwrap(), 12);
        assert!(matches!(
            parse_page("Error: org.freedesktop.DBus.Error.ServiceUnknown"),
            Err(AssistantError::ViewerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_returns_stable_reading() {
        let v = ScriptedViewer {
            pages: vec![4, 4],
            calls: AtomicUsize::new(0),
        };
        let snap = snapshot(&v).await.unwrap();
        assert_eq!(snap.page, 4);
        assert_eq!(snap.document, "/books/reader.pdf");
    }

    #[tokio::test]
    async fn snapshot_retries_when_page_moves() {
        let v = ScriptedViewer {
            pages: vec![4, 5, 5, 5],
            calls: AtomicUsize::new(0),
        };
        assert_eq!(snapshot(&v).await.unwrap().page, 5);
    }

    #[tokio::test]
    async fn snapshot_gives_up_after_three_attempts() {
        let v = ScriptedViewer {
            pages: vec![1, 2, 3, 4, 5, 6, 7],
            calls: AtomicUsize::new(0),
        };
        assert!(matches!(
            snapshot(&v).await,
            Err(AssistantError::ViewerInconsistent { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_viewer_unavailable() {
        assert!(matches!(
            run("pagegloss-no-such-binary", &[]).await,
            Err(AssistantError::ViewerUnavailable { .. })
        ));
    }
}

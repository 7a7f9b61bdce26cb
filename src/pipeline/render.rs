//! PDF rasterisation: render one page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. `tokio::task::spawn_blocking` moves
//! the work onto the blocking pool so the runtime's worker threads stay free
//! while a dense page renders.
//!
//! ## Scale, then cap
//!
//! Pages are scaled by `dpi / 72` (PDF user space is 72 units per inch) and
//! then capped so neither edge exceeds `max_rendered_pixels`. An A3 scan at
//! 200 DPI would otherwise be ~3300 × 4700 px, well past what the model needs
//! to read the text.

use crate::error::AssistantError;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable pointing at an existing pdfium shared library.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Renders one page of a document to an image.
pub trait PageRasterizer: Send + Sync {
    /// Render `page_number` (1-based) of `document` at `dpi`.
    fn render_page<'a>(
        &'a self,
        document: &'a Path,
        page_number: usize,
        dpi: u32,
    ) -> BoxFuture<'a, Result<DynamicImage, AssistantError>>;
}

/// [`PageRasterizer`] backed by `pdfium-render`.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    max_pixels: Option<u32>,
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_pixels: Some(max_pixels),
            password,
        }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render_page<'a>(
        &'a self,
        document: &'a Path,
        page_number: usize,
        dpi: u32,
    ) -> BoxFuture<'a, Result<DynamicImage, AssistantError>> {
        let path = document.to_path_buf();
        let max_pixels = self.max_pixels;
        let password = self.password.clone();

        async move {
            tokio::task::spawn_blocking(move || {
                render_page_blocking(&path, page_number, dpi, max_pixels, password.as_deref())
            })
            .await
            .map_err(|e| AssistantError::Internal(format!("Render task panicked: {}", e)))?
        }
        .boxed()
    }
}

/// Blocking implementation of page rendering.
fn render_page_blocking(
    pdf_path: &Path,
    page_number: usize,
    dpi: u32,
    max_pixels: Option<u32>,
    password: Option<&str>,
) -> Result<DynamicImage, AssistantError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| classify_load_error(pdf_path, &format!("{:?}", e), password.is_some()))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    debug!("PDF loaded: {} pages", total);

    let index = page_index(page_number, total)?;
    let page = pages
        .get(index)
        .map_err(|e| AssistantError::RasterisationFailed {
            page: page_number,
            detail: format!("{:?}", e),
        })?;

    let mut render_config = PdfRenderConfig::new().scale_page_by_factor(scale_for_dpi(dpi));
    if let Some(max) = max_pixels {
        let max = i32::try_from(max).unwrap_or(i32::MAX);
        render_config = render_config
            .set_maximum_width(max)
            .set_maximum_height(max);
    }

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| AssistantError::RasterisationFailed {
            page: page_number,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    info!(
        "Rendered page {} of {} at {} DPI → {}x{} px",
        page_number,
        total,
        dpi,
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Bind to pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library search path.
pub fn bind_pdfium() -> Result<Pdfium, AssistantError> {
    if let Some(path) = std::env::var_os(PDFIUM_LIB_ENV).map(PathBuf::from) {
        if path.exists() {
            debug!("Binding pdfium from {}", path.display());
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| AssistantError::PdfiumBindingFailed(format!("{}: {}", path.display(), e)));
        }
        debug!("{} points at missing file {}", PDFIUM_LIB_ENV, path.display());
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| AssistantError::PdfiumBindingFailed(e.to_string()))
}

/// Render scale for `dpi`; PDF user space has 72 units per inch.
fn scale_for_dpi(dpi: u32) -> f32 {
    dpi as f32 / 72.0
}

/// Convert a 1-based page number into pdfium's 0-based `u16` index.
fn page_index(page_number: usize, total: usize) -> Result<u16, AssistantError> {
    if page_number == 0 || page_number > total {
        return Err(AssistantError::PageOutOfRange {
            page: page_number,
            total,
        });
    }
    u16::try_from(page_number - 1).map_err(|_| AssistantError::PageOutOfRange {
        page: page_number,
        total,
    })
}

fn classify_load_error(path: &Path, detail: &str, had_password: bool) -> AssistantError {
    let path = path.to_path_buf();
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            AssistantError::WrongPassword { path }
        } else {
            AssistantError::PasswordRequired { path }
        }
    } else {
        AssistantError::CorruptPdf {
            path,
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_is_dpi_over_72() {
        assert_eq!(scale_for_dpi(72), 1.0);
        assert_eq!(scale_for_dpi(144), 2.0);
        assert!((scale_for_dpi(200) - 2.777_778).abs() < 1e-4);
    }

    #[test]
    fn page_numbers_are_one_based() {
        assert_eq!(page_index(1, 3).unwrap(), 0);
        assert_eq!(page_index(3, 3).unwrap(), 2);
        assert!(matches!(
            page_index(0, 3),
            Err(AssistantError::PageOutOfRange { page: 0, total: 3 })
        ));
        assert!(matches!(
            page_index(4, 3),
            Err(AssistantError::PageOutOfRange { page: 4, total: 3 })
        ));
    }

    #[test]
    fn password_errors_are_classified() {
        let p = Path::new("/tmp/locked.pdf");
        assert!(matches!(
            classify_load_error(p, "PdfiumLibraryInternalError(PasswordError)", false),
            AssistantError::PasswordRequired { .. }
        ));
        assert!(matches!(
            classify_load_error(p, "PdfiumLibraryInternalError(PasswordError)", true),
            AssistantError::WrongPassword { .. }
        ));
        assert!(matches!(
            classify_load_error(p, "PdfiumLibraryInternalError(FormatError)", false),
            AssistantError::CorruptPdf { .. }
        ));
    }
}

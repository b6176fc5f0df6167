//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so Tokio worker threads never stall on CPU-heavy rendering.
//!
//! ## Failure granularity
//!
//! A document that cannot be opened at all is a [`TaxDocError::CorruptPdf`];
//! the orchestrator records it as a per-document failure and keeps going.
//! A single page that fails to render becomes an entry in the returned
//! failure list — the remaining pages of the same document still process.

use crate::config::ProcessingConfig;
use crate::error::TaxDocError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Pages rendered from one document, plus the pages that failed.
pub struct RenderedDocument {
    /// `(page_index_0based, image)` for each page that rendered.
    pub pages: Vec<(usize, DynamicImage)>,
    /// `(page_index_0based, detail)` for each page that did not.
    pub failed: Vec<(usize, String)>,
}

/// Rasterise every page of a PDF.
pub async fn render_document(
    pdf_path: &Path,
    config: &ProcessingConfig,
) -> Result<RenderedDocument, TaxDocError> {
    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;

    tokio::task::spawn_blocking(move || render_document_blocking(&path, dpi, max_pixels))
        .await
        .map_err(|e| TaxDocError::Internal(format!("Render task panicked: {}", e)))?
}

/// Target page width in pixels for a given DPI, capped by the pixel bound.
///
/// Tax forms are US Letter (8.5 in wide); the cap keeps an oversized DPI
/// setting or an unusual page geometry within API upload limits.
fn target_width(dpi: u32, max_pixels: u32) -> i32 {
    let width = (dpi as f32 * 8.5) as u32;
    width.min(max_pixels) as i32
}

/// Blocking implementation of document rendering.
fn render_document_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<RenderedDocument, TaxDocError> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| TaxDocError::PdfiumBindingFailed(format!("{:?}", e)))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| TaxDocError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("{}: {} pages", pdf_path.display(), total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width(dpi, max_pixels))
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(total_pages);
    let mut failed = Vec::new();

    for idx in 0..total_pages {
        let page = match pages.get(idx as u16) {
            Ok(p) => p,
            Err(e) => {
                warn!("{} page {}: load failed: {:?}", pdf_path.display(), idx + 1, e);
                failed.push((idx, format!("{:?}", e)));
                continue;
            }
        };

        // The bitmap result borrows `page`; keeping the match a statement
        // drops that borrow before `page` goes out of scope.
        match page.render_with_config(&render_config) {
            Ok(bitmap) => {
                let image = bitmap.as_image();
                debug!(
                    "Rendered {} page {} → {}x{} px",
                    pdf_path.display(),
                    idx + 1,
                    image.width(),
                    image.height()
                );
                rendered.push((idx, image));
            }
            Err(e) => {
                warn!(
                    "{} page {}: render failed: {:?}",
                    pdf_path.display(),
                    idx + 1,
                    e
                );
                failed.push((idx, format!("{:?}", e)));
            }
        };
    }

    Ok(RenderedDocument {
        pages: rendered,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_width_follows_dpi_under_the_cap() {
        // 8.5in page width at the given DPI.
        assert_eq!(target_width(200, 2000), 1700);
        assert_eq!(target_width(72, 2000), 612);
    }

    #[test]
    fn target_width_is_capped_by_max_pixels() {
        assert_eq!(target_width(400, 2000), 2000);
        assert_eq!(target_width(400, 10_000), 3400);
    }
}

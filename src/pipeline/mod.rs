//! Pipeline stages from submitted PDFs to per-page images.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and lets us swap an
//! implementation (e.g. the rendering backend) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ RawPage
//! (path/URL) (pdfium)  (base64)
//! ```
//!
//! 1. [`input`]  — canonicalise each submitted path or URL to a local file
//! 2. [`render`] — rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`] — PNG-encode and base64-wrap each `DynamicImage` for the
//!    multimodal QA request body
//!
//! Classification and extraction consume the resulting [`RawPage`]s; see
//! [`crate::classify`] and [`crate::extract`].

pub mod encode;
pub mod input;
pub mod render;

use edgequake_llm::ImageData;

/// One rasterised page, ready for document-QA.
///
/// Created once per page, consumed by classification and extraction, and
/// discarded with the request context. Never persisted.
#[derive(Clone)]
pub struct RawPage {
    /// Display name of the document this page came from.
    pub source_file: String,
    /// Zero-based page index within the source document.
    pub page_index: usize,
    /// Base64 PNG of the page.
    pub image: ImageData,
}

impl std::fmt::Debug for RawPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawPage")
            .field("source_file", &self.source_file)
            .field("page_index", &self.page_index)
            .field("image_bytes", &self.image.data.len())
            .finish()
    }
}

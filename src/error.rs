//! Error types for the taxdoc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TaxDocError`] — **Fatal**: the request cannot proceed at all
//!   (bad filing status, no usable documents, missing rule tables, provider
//!   not configured). Returned as `Err(TaxDocError)` from the top-level
//!   `process_*` functions.
//!
//! * [`PageFailure`] — **Non-fatal**: a single page or document could not
//!   be read but others are fine. Stored inside
//!   [`crate::output::TaxReturnOutput`] so callers see partial success
//!   rather than losing the whole batch to one bad scan. (QA-level failures
//!   degrade differently: an unclassifiable page becomes `Unknown`, an
//!   unreadable field becomes an [`crate::extract::ExtractionNote`].)
//!
//! The split mirrors how the tax numbers themselves degrade: a field the
//! model cannot read contributes zero and a note, a filing status the
//! request got wrong aborts everything before a single page is touched.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the taxdoc library.
///
/// Page- and field-level failures use [`PageFailure`] and
/// [`crate::extract::ExtractionNote`] and are stored in the output instead.
#[derive(Debug, Error)]
pub enum TaxDocError {
    // ── Request validation ────────────────────────────────────────────────
    /// The filing status string matched none of the supported statuses.
    #[error(
        "Unsupported filing status '{input}'.\nSupported: Single, Married Filing Jointly (MFJ), \
         Married Filing Separately (MFS), Head of Household (HoH)."
    )]
    UnsupportedFilingStatus { input: String },

    /// Dependent count was negative.
    #[error("Number of dependents must be non-negative, got {value}")]
    InvalidDependents { value: i64 },

    /// The request contained no documents at all.
    #[error("No documents were submitted. Provide at least one PDF.")]
    NoDocuments,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── QA provider errors ────────────────────────────────────────────────
    /// The configured vision provider is not initialised (missing API key etc.).
    #[error("Document-QA provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every page of every document failed; no totals could be produced.
    #[error("All {total} pages failed during processing.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// The whole request exceeded its processing deadline.
    #[error("Request timed out after {secs}s; in-flight page tasks were cancelled")]
    RequestTimeout { secs: u64 },

    // ── Tax rule configuration ────────────────────────────────────────────
    /// Rule tables for the supported tax year are missing or inconsistent.
    ///
    /// This always indicates a deployment defect, never bad user input, so
    /// it is fatal rather than absorbed.
    #[error("Tax rule configuration error: {0}")]
    Configuration(String),

    // ── Summary document rendering ────────────────────────────────────────
    /// A required slot of the summary document was empty.
    #[error("Summary document cannot be rendered: required slot '{slot}' is missing")]
    MissingSlot { slot: String },

    /// Could not write the generated summary document.
    #[error("Failed to write summary document '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
         Install libpdfium and place it next to the binary or on the system \
         library search path."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure for a single page.
///
/// Stored in [`crate::output::TaxReturnOutput::failures`]. Processing
/// continues unless ALL pages fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageFailure {
    /// Page rasterisation failed; the page is excluded from classification.
    #[error("{file} page {page}: rasterisation failed: {detail}")]
    RenderFailed {
        file: String,
        page: usize,
        detail: String,
    },

    /// A whole document could not be opened; all its pages are excluded.
    #[error("{file}: document unreadable: {detail}")]
    DocumentUnreadable { file: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_status_display() {
        let e = TaxDocError::UnsupportedFilingStatus {
            input: "Quadruple".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Quadruple"), "got: {msg}");
        assert!(msg.contains("Head of Household"));
    }

    #[test]
    fn all_pages_failed_display() {
        let e = TaxDocError::AllPagesFailed {
            total: 4,
            first_error: "timeout".into(),
        };
        assert!(e.to_string().contains("All 4 pages"));
        assert!(e.to_string().contains("timeout"));
    }

    #[test]
    fn page_failure_display() {
        let e = PageFailure::RenderFailed {
            file: "w2.pdf".into(),
            page: 2,
            detail: "bad xref".into(),
        };
        assert!(e.to_string().contains("w2.pdf page 2"));
    }

    #[test]
    fn page_failure_serialises() {
        let e = PageFailure::DocumentUnreadable {
            file: "doc.pdf".into(),
            detail: "bad header".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("DocumentUnreadable"));
    }
}

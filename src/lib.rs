//! # taxdoc
//!
//! Turn scanned US tax forms (W-2, 1099-NEC, 1099-INT) into a draft federal
//! income tax estimate using vision document-QA models.
//!
//! ## Why this crate?
//!
//! Tax forms arrive as scans and phone photos, not structured data.
//! Template-based OCR breaks the moment a payroll provider moves a box.
//! Instead this crate rasterises each page into a PNG and asks a vision
//! model targeted questions ("What is the amount in box 1, wages, tips,
//! other compensation?"), reading the form the way a human preparer would.
//! The model reads; all arithmetic stays in exact decimal on our side.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDFs
//!  │
//!  ├─ 1. Input     resolve local files or download from URLs
//!  ├─ 2. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode    PNG → base64 ImageData
//!  ├─ 4. Classify  per page: instructional filter, then form identity
//!  ├─ 5. Extract   targeted box questions per form type
//!  ├─ 6. Aggregate join barrier — sum fields across all pages
//!  ├─ 7. Compute   2024 brackets, standard deduction, dependent credits
//!  └─ 8. Output    structured result + optional summary document
//! ```
//!
//! Steps 4–5 run concurrently across pages with bounded fan-out; every
//! page completes (or definitively fails) before step 6 sums anything.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taxdoc::{process_documents, MarkdownRenderer, ProcessingConfig, TaxRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ProcessingConfig::default();
//!     let request = TaxRequest {
//!         filing_status: "single".into(),
//!         num_dependents: 0,
//!     };
//!     let renderer = MarkdownRenderer::new("tax_summary.md");
//!     let output = process_documents(
//!         &["w2_2024.pdf".into(), "1099_int.pdf".into()],
//!         &request,
//!         Some(&renderer),
//!         &config,
//!     )
//!     .await?;
//!     println!("{}", output.message);
//!     println!("Refund/due: {}", output.summary_rounded.tax_due_or_refund);
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Exact arithmetic.** All money flows through [`rust_decimal::Decimal`];
//!   rounding happens once, at presentation.
//! - **Deterministic.** The same extracted amounts always produce the same
//!   estimate, regardless of page completion order.
//! - **Degrades, never fabricates.** An unreadable field contributes zero
//!   and is reported in `notes`; no value is ever guessed.
//!
//! This produces a **draft estimate**, not a filing. Nothing here is
//! submitted anywhere.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `taxdoc` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! taxdoc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod prompts;
pub mod qa;
pub mod summary;
pub mod tax;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{aggregate, TaxProfile};
pub use classify::{FormType, PageClassification};
pub use config::{ProcessingConfig, ProcessingConfigBuilder};
pub use error::{PageFailure, TaxDocError};
pub use extract::{ExtractedForm, ExtractionNote, FieldName};
pub use output::{ProcessingStats, TaxReturnOutput};
pub use process::{process_documents, process_pages, TaxRequest};
pub use qa::{DocumentQa, QaAnswer, QaError, VisionQa};
pub use summary::{DocumentRenderer, MarkdownRenderer, SummarySlots};
pub use tax::{compute, FilingStatus, TaxSummary, TaxYearRules};

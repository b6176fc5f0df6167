//! Response payload types for a processing run.

use crate::classify::PageClassification;
use crate::error::PageFailure;
use crate::extract::{ExtractionNote, FieldName};
use crate::summary::DocumentDetail;
use crate::tax::TaxSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything the caller gets back from one request.
///
/// Partial extraction still yields a best-effort summary; the `notes` and
/// `failures` lists tell the caller exactly which documents and fields could
/// not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxReturnOutput {
    /// Human-readable status line.
    pub message: String,
    /// Exact (unrounded) summary; recomputing from the same inputs yields
    /// identical values.
    pub summary: TaxSummary,
    /// The summary rounded half-up to cents for presentation.
    pub summary_rounded: TaxSummary,
    /// Per-page extraction detail for every processable page.
    pub documents: Vec<DocumentDetail>,
    /// Classification of every page seen, including excluded ones.
    pub classifications: Vec<PageClassification>,
    /// Source files contributing to each aggregated total.
    pub sources: BTreeMap<FieldName, Vec<String>>,
    /// Fields the extractor could not read.
    pub notes: Vec<ExtractionNote>,
    /// Pages or documents that failed outright.
    pub failures: Vec<PageFailure>,
    /// Path of the generated summary document, when rendering succeeded.
    pub summary_document: Option<PathBuf>,
    /// Why the summary document is missing, when rendering failed.
    pub render_error: Option<String>,
    pub stats: ProcessingStats,
}

/// Timing and page-count statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Pages rasterised across all documents.
    pub total_pages: usize,
    /// Pages classified as a known form and extracted.
    pub extracted_pages: usize,
    /// Pages excluded as instructional/blank/unknown.
    pub skipped_pages: usize,
    /// Pages lost to render or QA failures.
    pub failed_pages: usize,
    pub render_duration_ms: u64,
    pub qa_duration_ms: u64,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn output_round_trips_through_json() {
        let summary = TaxSummary {
            gross_income: Decimal::ZERO,
            standard_deduction: Decimal::from(14_600u32),
            taxable_income: Decimal::ZERO,
            calculated_tax: Decimal::ZERO,
            total_withheld: Decimal::ZERO,
            tax_due_or_refund: Decimal::ZERO,
        };
        let output = TaxReturnOutput {
            message: "ok".into(),
            summary: summary.clone(),
            summary_rounded: summary.rounded(),
            documents: vec![],
            classifications: vec![],
            sources: BTreeMap::new(),
            notes: vec![],
            failures: vec![],
            summary_document: None,
            render_error: None,
            stats: ProcessingStats::default(),
        };

        let json = serde_json::to_string_pretty(&output).expect("serialise");
        let back: TaxReturnOutput = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back.summary, output.summary);
        assert_eq!(back.stats.total_pages, 0);
    }
}

//! Result formatting: project the computed numbers into the response payload
//! and the generated summary document.
//!
//! No computation happens here. [`SummarySlots`] is a pure projection of the
//! profile and summary into the fixed semantic slots of the output document;
//! [`DocumentRenderer`] is the seam to the external rendering capability. A
//! render failure withholds only the artifact — the tax numbers themselves
//! are still returned to the caller.

use crate::aggregate::TaxProfile;
use crate::error::TaxDocError;
use crate::extract::{ExtractedForm, FieldName};
use crate::tax::TaxSummary;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-source-document extraction detail for the response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetail {
    pub source_file: String,
    pub page_index: usize,
    pub form_type: crate::classify::FormType,
    pub fields: BTreeMap<FieldName, Decimal>,
    pub confidences: BTreeMap<FieldName, f32>,
}

impl From<&ExtractedForm> for DocumentDetail {
    fn from(form: &ExtractedForm) -> Self {
        Self {
            source_file: form.source_file.clone(),
            page_index: form.page_index,
            form_type: form.form_type,
            fields: form.fields.clone(),
            confidences: form.confidences.clone(),
        }
    }
}

/// The fixed semantic slots of the generated summary document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySlots {
    pub filing_status: String,
    pub dependents: u32,
    pub wages: Decimal,
    pub interest_income: Decimal,
    pub nonemployee_compensation: Decimal,
    pub gross_income: Decimal,
    pub standard_deduction: Decimal,
    pub taxable_income: Decimal,
    pub calculated_tax: Decimal,
    pub total_withheld: Decimal,
    pub tax_due_or_refund: Decimal,
    /// Source files that contributed income, for the audit line.
    pub source_files: Vec<String>,
}

impl SummarySlots {
    /// Project profile + rounded summary into document slots.
    pub fn project(profile: &TaxProfile, summary: &TaxSummary) -> Self {
        let rounded = summary.rounded();
        let mut source_files: Vec<String> = profile
            .sources
            .values()
            .flatten()
            .cloned()
            .collect();
        source_files.sort();
        source_files.dedup();

        Self {
            filing_status: profile.filing_status.to_string(),
            dependents: profile.dependents,
            wages: profile.total_wages,
            interest_income: profile.total_interest_income,
            nonemployee_compensation: profile.total_nonemployee_compensation,
            gross_income: rounded.gross_income,
            standard_deduction: rounded.standard_deduction,
            taxable_income: rounded.taxable_income,
            calculated_tax: rounded.calculated_tax,
            total_withheld: rounded.total_withheld,
            tax_due_or_refund: rounded.tax_due_or_refund,
            source_files,
        }
    }

    fn validate(&self) -> Result<(), TaxDocError> {
        if self.filing_status.trim().is_empty() {
            return Err(TaxDocError::MissingSlot {
                slot: "filing_status".into(),
            });
        }
        Ok(())
    }
}

/// External document-rendering capability.
///
/// Implementations write the populated summary somewhere retrievable and
/// return a handle (here: a path). Must fail with a slot error rather than
/// emit a document with holes in it.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, slots: &SummarySlots) -> Result<PathBuf, TaxDocError>;
}

/// Default renderer: a draft Form-1040-style Markdown summary on disk.
///
/// Writes atomically (temp file + rename) so a crash never leaves a partial
/// document at the target path.
pub struct MarkdownRenderer {
    output_path: PathBuf,
}

impl MarkdownRenderer {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    fn render_markdown(slots: &SummarySlots) -> String {
        let due_line = if slots.tax_due_or_refund.is_sign_negative() {
            format!("**Estimated refund: ${}**", -slots.tax_due_or_refund)
        } else {
            format!("**Estimated tax due: ${}**", slots.tax_due_or_refund)
        };

        let mut doc = String::new();
        doc.push_str("# DRAFT Federal Income Tax Summary\n\n");
        doc.push_str("> Estimate generated from scanned documents. Not a filed return.\n\n");
        doc.push_str(&format!("- Filing status: {}\n", slots.filing_status));
        doc.push_str(&format!("- Dependents: {}\n\n", slots.dependents));
        doc.push_str("## Income\n\n");
        doc.push_str("| Line | Amount |\n|---|---:|\n");
        doc.push_str(&format!("| Wages (W-2 box 1) | {} |\n", slots.wages));
        doc.push_str(&format!(
            "| Interest income (1099-INT box 1) | {} |\n",
            slots.interest_income
        ));
        doc.push_str(&format!(
            "| Nonemployee compensation (1099-NEC box 1) | {} |\n",
            slots.nonemployee_compensation
        ));
        doc.push_str(&format!("| **Gross income** | {} |\n\n", slots.gross_income));
        doc.push_str("## Tax\n\n");
        doc.push_str("| Line | Amount |\n|---|---:|\n");
        doc.push_str(&format!(
            "| Standard deduction | {} |\n",
            slots.standard_deduction
        ));
        doc.push_str(&format!("| Taxable income | {} |\n", slots.taxable_income));
        doc.push_str(&format!("| Calculated tax | {} |\n", slots.calculated_tax));
        doc.push_str(&format!(
            "| Federal tax withheld | {} |\n\n",
            slots.total_withheld
        ));
        doc.push_str(&due_line);
        doc.push('\n');
        if !slots.source_files.is_empty() {
            doc.push_str(&format!(
                "\nSources: {}\n",
                slots.source_files.join(", ")
            ));
        }
        doc
    }
}

impl DocumentRenderer for MarkdownRenderer {
    fn render(&self, slots: &SummarySlots) -> Result<PathBuf, TaxDocError> {
        slots.validate()?;

        let path: &Path = &self.output_path;
        let write_failed = |source: std::io::Error| TaxDocError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_failed)?;
            }
        }

        let tmp_path = path.with_extension("md.tmp");
        std::fs::write(&tmp_path, Self::render_markdown(slots)).map_err(write_failed)?;
        std::fs::rename(&tmp_path, path).map_err(write_failed)?;

        info!("Summary document written to {}", path.display());
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::FilingStatus;
    use rust_decimal_macros::dec;

    fn slots() -> SummarySlots {
        let profile = TaxProfile {
            total_wages: dec!(50000.00),
            total_federal_withheld: dec!(6000.00),
            total_interest_income: dec!(12.34),
            total_nonemployee_compensation: Decimal::ZERO,
            filing_status: FilingStatus::Single,
            dependents: 1,
            sources: Default::default(),
        };
        let summary = TaxSummary {
            gross_income: dec!(50012.34),
            standard_deduction: dec!(14600),
            taxable_income: dec!(35412.34),
            calculated_tax: dec!(3517.4808),
            total_withheld: dec!(6000.00),
            tax_due_or_refund: dec!(-2482.5192),
        };
        SummarySlots::project(&profile, &summary)
    }

    #[test]
    fn project_rounds_to_cents() {
        let s = slots();
        assert_eq!(s.calculated_tax, dec!(3517.48));
        assert_eq!(s.tax_due_or_refund, dec!(-2482.52));
        assert_eq!(s.filing_status, "Single");
    }

    #[test]
    fn markdown_mentions_refund_for_negative_due() {
        let md = MarkdownRenderer::render_markdown(&slots());
        assert!(md.contains("Estimated refund: $2482.52"));
        assert!(md.contains("Standard deduction | 14600"));
    }

    #[test]
    fn render_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("summary.md");
        let renderer = MarkdownRenderer::new(&out);
        let path = renderer.render(&slots()).unwrap();
        assert_eq!(path, out);
        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.starts_with("# DRAFT Federal Income Tax Summary"));
        assert!(!dir.path().join("summary.md.tmp").exists());
    }

    #[test]
    fn missing_status_slot_fails_render() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = MarkdownRenderer::new(dir.path().join("x.md"));
        let mut s = slots();
        s.filing_status = "  ".into();
        let err = renderer.render(&s).unwrap_err();
        assert!(matches!(err, TaxDocError::MissingSlot { .. }));
    }
}

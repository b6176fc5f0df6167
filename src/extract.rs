//! Field extraction: pull the monetary fields off a classified page.
//!
//! Each recognised form type has a fixed question table. Every answer is
//! treated as untrusted input: it must parse as a non-negative decimal after
//! currency cleanup or the field is recorded as absent with a note. A page
//! with one readable field and one unreadable field still contributes its
//! readable field — partial success is success.

use crate::classify::FormType;
use crate::pipeline::RawPage;
use crate::prompts::{
    INT_INTEREST_QUESTION, NEC_COMPENSATION_QUESTION, W2_WAGES_QUESTION, W2_WITHHELD_QUESTION,
};
use crate::qa::DocumentQa;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// The closed set of extractable field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Wages,
    FederalWithheld,
    NonemployeeCompensation,
    InterestIncome,
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldName::Wages => "wages",
            FieldName::FederalWithheld => "federal_withheld",
            FieldName::NonemployeeCompensation => "nonemployee_compensation",
            FieldName::InterestIncome => "interest_income",
        };
        f.write_str(s)
    }
}

/// One row of a form's question table.
#[derive(Debug, Clone, Copy)]
pub struct FieldQuestion {
    pub field: FieldName,
    pub question: &'static str,
}

/// The fixed question table for a form type.
///
/// `Unknown` has no questions; unprocessable pages never reach this module.
pub fn questions_for(form: FormType) -> &'static [FieldQuestion] {
    match form {
        FormType::W2 => &[
            FieldQuestion {
                field: FieldName::Wages,
                question: W2_WAGES_QUESTION,
            },
            FieldQuestion {
                field: FieldName::FederalWithheld,
                question: W2_WITHHELD_QUESTION,
            },
        ],
        FormType::Nec1099 => &[FieldQuestion {
            field: FieldName::NonemployeeCompensation,
            question: NEC_COMPENSATION_QUESTION,
        }],
        FormType::Int1099 => &[FieldQuestion {
            field: FieldName::InterestIncome,
            question: INT_INTEREST_QUESTION,
        }],
        FormType::Unknown => &[],
    }
}

/// A field the extractor could not confidently determine.
///
/// Recorded in the output, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionNote {
    pub source_file: String,
    pub page_index: usize,
    pub field: FieldName,
    pub reason: String,
}

/// Extraction result for one classified page.
///
/// Invariant: every value in `fields` is a non-negative decimal. Malformed
/// answers never land here; they become [`ExtractionNote`]s instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedForm {
    pub source_file: String,
    pub page_index: usize,
    pub form_type: FormType,
    pub fields: BTreeMap<FieldName, Decimal>,
    /// Per-field adapter confidence, kept for observability.
    pub confidences: BTreeMap<FieldName, f32>,
    pub notes: Vec<ExtractionNote>,
}

/// Run the form's question battery against the page.
pub async fn extract(page: &RawPage, form_type: FormType, qa: &dyn DocumentQa) -> ExtractedForm {
    let mut form = ExtractedForm {
        source_file: page.source_file.clone(),
        page_index: page.page_index,
        form_type,
        fields: BTreeMap::new(),
        confidences: BTreeMap::new(),
        notes: Vec::new(),
    };

    for fq in questions_for(form_type) {
        match qa.ask(&page.image, fq.question).await {
            Ok(answer) if answer.is_none_answer() => {
                form.note(fq.field, "no answer from document-QA");
            }
            Ok(answer) => match parse_amount(&answer.text) {
                Some(amount) => {
                    debug!(
                        "{} page {}: {} = {} (confidence {:.2})",
                        page.source_file, page.page_index, fq.field, amount, answer.confidence
                    );
                    form.fields.insert(fq.field, amount);
                    form.confidences.insert(fq.field, answer.confidence);
                }
                None => {
                    warn!(
                        "{} page {}: unparseable {} answer {:?}",
                        page.source_file, page.page_index, fq.field, answer.text
                    );
                    form.note(
                        fq.field,
                        format!("answer {:?} is not a non-negative amount", answer.text),
                    );
                }
            },
            Err(e) => {
                warn!(
                    "{} page {}: QA failed for {}: {e}",
                    page.source_file, page.page_index, fq.field
                );
                form.note(fq.field, format!("document-QA call failed: {e}"));
            }
        }
    }

    form
}

impl ExtractedForm {
    fn note(&mut self, field: FieldName, reason: impl Into<String>) {
        self.notes.push(ExtractionNote {
            source_file: self.source_file.clone(),
            page_index: self.page_index,
            field,
            reason: reason.into(),
        });
    }

    /// Value of `field` if it was extracted.
    pub fn field(&self, field: FieldName) -> Option<Decimal> {
        self.fields.get(&field).copied()
    }
}

// Currency symbols, thousands separators, and stray letters ("USD", "approx")
// all show up in model answers for printed amounts.
static RE_AMOUNT_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[$,A-Za-z\s]").unwrap());

/// Parse a model answer into a non-negative decimal amount.
///
/// Strips currency symbols, thousands separators, and letters, then parses
/// the remainder exactly. Negative amounts are rejected: none of the
/// supported boxes can legitimately hold one, and a minus sign usually means
/// the model read the wrong cell.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned = RE_AMOUNT_NOISE.replace_all(text, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    match Decimal::from_str(cleaned) {
        Ok(d) if d.is_sign_negative() => None,
        Ok(d) => Some(d),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::{QaAnswer, QaError};
    use async_trait::async_trait;
    use edgequake_llm::ImageData;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_plain_amount() {
        assert_eq!(parse_amount("48500.00"), Some(dec!(48500.00)));
    }

    #[test]
    fn parse_strips_currency_noise() {
        assert_eq!(parse_amount("$48,500.00"), Some(dec!(48500.00)));
        assert_eq!(parse_amount("48,500.00 USD"), Some(dec!(48500.00)));
        assert_eq!(parse_amount(" $1,234 "), Some(dec!(1234)));
    }

    #[test]
    fn parse_rejects_negative() {
        assert_eq!(parse_amount("-120.00"), None);
        assert_eq!(parse_amount("$-1"), None);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_amount("not an amount"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("12.34.56"), None);
    }

    #[test]
    fn question_tables_match_form_types() {
        assert_eq!(questions_for(FormType::W2).len(), 2);
        assert_eq!(questions_for(FormType::Nec1099).len(), 1);
        assert_eq!(questions_for(FormType::Int1099).len(), 1);
        assert!(questions_for(FormType::Unknown).is_empty());
    }

    /// Answers box-1 questions with a fixed reply, box-2 with garbage.
    struct HalfBrokenQa;

    #[async_trait]
    impl DocumentQa for HalfBrokenQa {
        async fn ask(&self, _image: &ImageData, question: &str) -> Result<QaAnswer, QaError> {
            if question.contains("box 1") {
                Ok(QaAnswer {
                    text: "$50,000.00".into(),
                    confidence: 0.91,
                })
            } else {
                Ok(QaAnswer {
                    text: "see instructions".into(),
                    confidence: 0.4,
                })
            }
        }
    }

    #[tokio::test]
    async fn partial_extraction_keeps_valid_fields() {
        let page = RawPage {
            source_file: "w2.pdf".into(),
            page_index: 0,
            image: ImageData::new(String::new(), "image/png"),
        };
        let form = extract(&page, FormType::W2, &HalfBrokenQa).await;

        assert_eq!(form.field(FieldName::Wages), Some(dec!(50000.00)));
        assert_eq!(form.field(FieldName::FederalWithheld), None);
        assert_eq!(form.notes.len(), 1);
        assert_eq!(form.notes[0].field, FieldName::FederalWithheld);
        assert!((form.confidences[&FieldName::Wages] - 0.91).abs() < 1e-6);
    }
}

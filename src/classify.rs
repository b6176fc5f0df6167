//! Page classification: is this page a processable tax form, and which one?
//!
//! The classifier asks a small fixed battery of questions and applies a
//! deterministic decision policy on the answers:
//!
//! 1. The instructional/blank filter runs first and wins outright above its
//!    threshold. Misreading an instruction sheet as a real form corrupts the
//!    aggregated totals; skipping a real form only degrades them.
//! 2. Otherwise the highest-confidence form-identity answer above the
//!    identity threshold wins. Ties go to the fixed precedence order
//!    W-2 → 1099-NEC → 1099-INT, so reruns are reproducible.
//! 3. Adapter failures and sub-threshold answers both yield
//!    `Unknown` / not processable — never a request-level error. One bad
//!    page must not abort the batch.

use crate::config::ProcessingConfig;
use crate::pipeline::RawPage;
use crate::prompts::{
    INSTRUCTIONAL_PAGE_QUESTION, INT_IDENTITY_QUESTION, NEC_IDENTITY_QUESTION,
    W2_IDENTITY_QUESTION,
};
use crate::qa::DocumentQa;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// The closed set of recognised form types.
///
/// Adding a form type means extending this enum, its identity question in
/// [`crate::prompts`], and its field table in [`crate::extract`] — a data
/// change, not a redesign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FormType {
    #[serde(rename = "W-2")]
    W2,
    #[serde(rename = "1099-NEC")]
    Nec1099,
    #[serde(rename = "1099-INT")]
    Int1099,
    #[serde(rename = "unknown")]
    Unknown,
}

impl FormType {
    /// Recognised form types in tie-break precedence order (earlier wins).
    pub const PRECEDENCE: [FormType; 3] = [FormType::W2, FormType::Nec1099, FormType::Int1099];
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormType::W2 => "W-2",
            FormType::Nec1099 => "1099-NEC",
            FormType::Int1099 => "1099-INT",
            FormType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Outcome of classifying one page. Every [`RawPage`] yields exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageClassification {
    pub source_file: String,
    pub page_index: usize,
    pub form_type: FormType,
    /// Whether the page may be handed to the field extractor.
    pub processable: bool,
    /// Confidence of the winning signal (identity answer, or the
    /// instructional filter when that is what decided).
    pub confidence: f32,
}

impl PageClassification {
    fn unknown(page: &RawPage, confidence: f32) -> Self {
        Self {
            source_file: page.source_file.clone(),
            page_index: page.page_index,
            form_type: FormType::Unknown,
            processable: false,
            confidence,
        }
    }
}

/// Classify one page. Pure given the adapter's answers; no other side effects.
pub async fn classify(
    page: &RawPage,
    qa: &dyn DocumentQa,
    config: &ProcessingConfig,
) -> PageClassification {
    // Filtering takes priority over identification.
    match qa.ask(&page.image, INSTRUCTIONAL_PAGE_QUESTION).await {
        Ok(answer) if answer.is_affirmative() && answer.confidence > config.instructional_threshold => {
            info!(
                "{} page {}: instructional/blank (confidence {:.2}), excluded",
                page.source_file, page.page_index, answer.confidence
            );
            return PageClassification::unknown(page, answer.confidence);
        }
        Ok(_) => {}
        Err(e) => {
            // A dead adapter cannot identify the form either; classify
            // unknown without burning three more calls.
            warn!(
                "{} page {}: instructional check failed ({e}), page excluded",
                page.source_file, page.page_index
            );
            return PageClassification::unknown(page, 0.0);
        }
    }

    let identity_questions: [(FormType, &str); 3] = [
        (FormType::W2, W2_IDENTITY_QUESTION),
        (FormType::Nec1099, NEC_IDENTITY_QUESTION),
        (FormType::Int1099, INT_IDENTITY_QUESTION),
    ];

    // Iterating in precedence order and replacing only on strictly greater
    // confidence gives the tie-break for free.
    let mut best: Option<(FormType, f32)> = None;
    for (form, question) in identity_questions {
        match qa.ask(&page.image, question).await {
            Ok(answer) if answer.is_affirmative() => {
                debug!(
                    "{} page {}: {} identity YES (confidence {:.2})",
                    page.source_file, page.page_index, form, answer.confidence
                );
                if best.map_or(true, |(_, c)| answer.confidence > c) {
                    best = Some((form, answer.confidence));
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "{} page {}: {} identity question failed: {e}",
                    page.source_file, page.page_index, form
                );
            }
        }
    }

    match best {
        Some((form, confidence)) if confidence > config.identity_threshold => {
            info!(
                "{} page {}: classified {} (confidence {:.2})",
                page.source_file, page.page_index, form, confidence
            );
            PageClassification {
                source_file: page.source_file.clone(),
                page_index: page.page_index,
                form_type: form,
                processable: true,
                confidence,
            }
        }
        Some((_, confidence)) => PageClassification::unknown(page, confidence),
        None => PageClassification::unknown(page, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::{QaAnswer, QaError};
    use async_trait::async_trait;
    use edgequake_llm::ImageData;
    use std::collections::HashMap;

    /// Scripted adapter: maps a question substring to a fixed answer.
    /// Unmatched questions answer `NO | 0.9`.
    struct ScriptedQa {
        answers: HashMap<&'static str, QaAnswer>,
        fail_all: bool,
    }

    impl ScriptedQa {
        fn new(entries: &[(&'static str, &str, f32)]) -> Self {
            let answers = entries
                .iter()
                .map(|(key, text, conf)| {
                    (
                        *key,
                        QaAnswer {
                            text: text.to_string(),
                            confidence: *conf,
                        },
                    )
                })
                .collect();
            Self {
                answers,
                fail_all: false,
            }
        }
    }

    #[async_trait]
    impl DocumentQa for ScriptedQa {
        async fn ask(&self, _image: &ImageData, question: &str) -> Result<QaAnswer, QaError> {
            if self.fail_all {
                return Err(QaError::Provider {
                    detail: "scripted outage".into(),
                });
            }
            for (key, answer) in &self.answers {
                if question.contains(key) {
                    return Ok(answer.clone());
                }
            }
            Ok(QaAnswer {
                text: "NO".into(),
                confidence: 0.9,
            })
        }
    }

    fn page() -> RawPage {
        RawPage {
            source_file: "w2.pdf".into(),
            page_index: 0,
            image: ImageData::new(String::new(), "image/png"),
        }
    }

    fn config() -> ProcessingConfig {
        ProcessingConfig::default()
    }

    #[tokio::test]
    async fn instructional_page_is_excluded() {
        let qa = ScriptedQa::new(&[
            ("instructions", "YES", 0.8),
            ("W-2", "YES", 0.99), // must not matter
        ]);
        let result = classify(&page(), &qa, &config()).await;
        assert_eq!(result.form_type, FormType::Unknown);
        assert!(!result.processable);
    }

    #[tokio::test]
    async fn instructional_signal_at_threshold_does_not_exclude() {
        // "exceeds" the threshold means strictly greater.
        let qa = ScriptedQa::new(&[("instructions", "YES", 0.5), ("W-2", "YES", 0.9)]);
        let result = classify(&page(), &qa, &config()).await;
        assert_eq!(result.form_type, FormType::W2);
        assert!(result.processable);
    }

    #[tokio::test]
    async fn highest_confidence_identity_wins() {
        let qa = ScriptedQa::new(&[
            ("instructions", "NO", 0.9),
            ("W-2", "YES", 0.6),
            ("1099-INT", "YES", 0.8),
        ]);
        let result = classify(&page(), &qa, &config()).await;
        assert_eq!(result.form_type, FormType::Int1099);
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn ties_break_by_precedence() {
        let qa = ScriptedQa::new(&[
            ("instructions", "NO", 0.9),
            ("W-2", "YES", 0.7),
            ("1099-NEC", "YES", 0.7),
            ("1099-INT", "YES", 0.7),
        ]);
        let result = classify(&page(), &qa, &config()).await;
        assert_eq!(result.form_type, FormType::W2);
    }

    #[tokio::test]
    async fn sub_threshold_identity_is_unknown() {
        let qa = ScriptedQa::new(&[("instructions", "NO", 0.9), ("W-2", "YES", 0.2)]);
        let result = classify(&page(), &qa, &config()).await;
        assert_eq!(result.form_type, FormType::Unknown);
        assert!(!result.processable);
    }

    #[tokio::test]
    async fn adapter_outage_yields_unknown_not_error() {
        let mut qa = ScriptedQa::new(&[]);
        qa.fail_all = true;
        let result = classify(&page(), &qa, &config()).await;
        assert_eq!(result.form_type, FormType::Unknown);
        assert!(!result.processable);
        assert_eq!(result.confidence, 0.0);
    }
}

//! Question batteries and the QA system prompt.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the classifier's decision policy and the
//!    extractor's field tables reference these constants; rewording a
//!    question happens in exactly one place.
//!
//! 2. **Testability** — unit tests can match scripted answers against the
//!    same constants the pipeline sends, without a live model.
//!
//! Adding a new form type means adding an identity question here plus a row
//! in [`crate::extract::questions_for`] — a data change, not a structural one.

/// System prompt establishing the answer wire format.
///
/// The model must reply with a single line `ANSWER | CONFIDENCE`. Everything
/// the pipeline trusts is re-validated on our side ([`crate::qa`] parses the
/// confidence, [`crate::extract::parse_amount`] parses the number), so a
/// model that ignores the format degrades to a low-confidence answer rather
/// than corrupting totals.
pub const QA_SYSTEM_PROMPT: &str = r#"You are a document analyst reading a scanned US tax form page.

You will be asked one question about the page image. Reply with EXACTLY one line in the format:

ANSWER | CONFIDENCE

Rules:
- ANSWER is the shortest faithful answer. For yes/no questions answer YES or NO.
  For amount questions answer the amount exactly as printed (e.g. 48,500.00).
- CONFIDENCE is a number between 0.0 and 1.0 reflecting how certain you are.
- If the requested value is not visible on the page, answer: NONE | 0.0
- Do not add commentary, units, or extra lines."#;

// ── Classification battery ───────────────────────────────────────────────

/// Filtering question, asked first. A confident YES here overrides any
/// form-identity answer: an instruction sheet misread as a W-2 corrupts the
/// totals, a skipped real form merely degrades them.
pub const INSTRUCTIONAL_PAGE_QUESTION: &str =
    "Is this page blank, or an instructions/information page rather than a filled-in tax form?";

/// Identity question for Form W-2.
pub const W2_IDENTITY_QUESTION: &str = "Is this a Form W-2, Wage and Tax Statement?";

/// Identity question for Form 1099-NEC.
pub const NEC_IDENTITY_QUESTION: &str = "Is this a Form 1099-NEC, Nonemployee Compensation?";

/// Identity question for Form 1099-INT.
pub const INT_IDENTITY_QUESTION: &str = "Is this a Form 1099-INT, Interest Income?";

// ── Field extraction battery ─────────────────────────────────────────────

pub const W2_WAGES_QUESTION: &str =
    "What is the amount in box 1, wages, tips, other compensation?";

pub const W2_WITHHELD_QUESTION: &str =
    "What is the amount in box 2, federal income tax withheld?";

pub const NEC_COMPENSATION_QUESTION: &str =
    "What is the amount in box 1, nonemployee compensation?";

pub const INT_INTEREST_QUESTION: &str = "What is the amount in box 1, interest income?";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_states_wire_format() {
        assert!(QA_SYSTEM_PROMPT.contains("ANSWER | CONFIDENCE"));
        assert!(QA_SYSTEM_PROMPT.contains("NONE | 0.0"));
    }

    #[test]
    fn field_questions_name_their_boxes() {
        for q in [
            W2_WAGES_QUESTION,
            W2_WITHHELD_QUESTION,
            NEC_COMPENSATION_QUESTION,
            INT_INTEREST_QUESTION,
        ] {
            assert!(q.contains("box"), "question should anchor on a box: {q}");
        }
    }
}

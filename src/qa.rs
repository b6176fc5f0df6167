//! Document-QA adapter: one typed `ask(image, question)` call.
//!
//! The rest of the pipeline never talks to a model directly — it talks to
//! [`DocumentQa`]. The production implementation [`VisionQa`] drives an
//! `edgequake_llm` vision provider; tests substitute scripted
//! implementations. Empty answers and low confidence are *valid* responses
//! here, not errors: the classifier and extractor decide what to do with an
//! answer they cannot trust.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from vision APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s, totalling < 4 s of back-off per question.

use crate::config::ProcessingConfig;
use crate::prompts::QA_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One answer from the document-QA capability.
#[derive(Debug, Clone, PartialEq)]
pub struct QaAnswer {
    /// Best-effort answer text. May be empty or `NONE` when the value is
    /// not visible on the page.
    pub text: String,
    /// Model self-assessed confidence in `[0.0, 1.0]`.
    pub confidence: f32,
}

impl QaAnswer {
    /// True when the model explicitly declined to answer.
    pub fn is_none_answer(&self) -> bool {
        let t = self.text.trim();
        t.is_empty() || t.eq_ignore_ascii_case("none")
    }

    /// True for an affirmative yes/no reply.
    pub fn is_affirmative(&self) -> bool {
        let t = self.text.trim();
        t.eq_ignore_ascii_case("yes") || t.to_ascii_lowercase().starts_with("yes")
    }
}

/// Failure of a single adapter call, after retries.
///
/// Never fatal for the request: a classifier seeing this marks the page
/// unknown, an extractor marks the field absent.
#[derive(Debug, Clone, Error)]
pub enum QaError {
    #[error("QA call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("QA provider error: {detail}")]
    Provider { detail: String },
}

/// External question-answering capability over a page image.
#[async_trait]
pub trait DocumentQa: Send + Sync {
    /// Ask one natural-language question about the page image.
    async fn ask(&self, image: &ImageData, question: &str) -> Result<QaAnswer, QaError>;
}

/// Production [`DocumentQa`] backed by an `edgequake_llm` vision provider.
///
/// Each question becomes one chat completion: the system prompt fixes the
/// `ANSWER | CONFIDENCE` wire format, the user turn carries the question
/// text plus the page PNG. The reply is parsed leniently — a model that
/// drops the confidence field yields confidence 0.0, which downstream
/// policy treats as "do not trust".
pub struct VisionQa {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl VisionQa {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ProcessingConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }
}

#[async_trait]
impl DocumentQa for VisionQa {
    async fn ask(&self, image: &ImageData, question: &str) -> Result<QaAnswer, QaError> {
        let messages = vec![
            ChatMessage::system(QA_SYSTEM_PROMPT),
            ChatMessage::user_with_images(question, vec![image.clone()]),
        ];

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            // One line of answer; generous headroom for sloppy models.
            max_tokens: Some(64),
            ..Default::default()
        };

        let mut last_err: Option<QaError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "QA retry {}/{} after {}ms for question {:?}",
                    attempt, self.max_retries, backoff, question
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&options));
            match timeout(Duration::from_secs(self.api_timeout_secs), call).await {
                Ok(Ok(response)) => {
                    let answer = parse_answer(&response.content);
                    debug!(
                        "QA {:?} → {:?} (confidence {:.2})",
                        question, answer.text, answer.confidence
                    );
                    return Ok(answer);
                }
                Ok(Err(e)) => {
                    last_err = Some(QaError::Provider {
                        detail: format!("{e}"),
                    });
                }
                Err(_) => {
                    last_err = Some(QaError::Timeout {
                        secs: self.api_timeout_secs,
                    });
                }
            }
        }

        Err(last_err.unwrap_or(QaError::Provider {
            detail: "unknown error".into(),
        }))
    }
}

/// Parse a raw model reply into a [`QaAnswer`].
///
/// Expected format is `ANSWER | CONFIDENCE`. A reply without a parseable
/// confidence keeps its text but gets confidence 0.0 — the answer stays
/// visible for observability while failing every trust threshold.
pub fn parse_answer(raw: &str) -> QaAnswer {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    if let Some((text, conf)) = line.rsplit_once('|') {
        if let Ok(c) = conf.trim().parse::<f32>() {
            return QaAnswer {
                text: text.trim().to_string(),
                confidence: c.clamp(0.0, 1.0),
            };
        }
    }

    QaAnswer {
        text: line.trim().to_string(),
        confidence: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_well_formed_answer() {
        let a = parse_answer("48,500.00 | 0.92");
        assert_eq!(a.text, "48,500.00");
        assert!((a.confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn parse_none_answer() {
        let a = parse_answer("NONE | 0.0");
        assert!(a.is_none_answer());
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn parse_missing_confidence_is_untrusted() {
        let a = parse_answer("YES");
        assert_eq!(a.text, "YES");
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn parse_clamps_out_of_range_confidence() {
        assert_eq!(parse_answer("YES | 3.0").confidence, 1.0);
        assert_eq!(parse_answer("YES | -1").confidence, 0.0);
    }

    #[test]
    fn parse_skips_leading_blank_lines() {
        let a = parse_answer("\n\nNO | 0.8\n");
        assert_eq!(a.text, "NO");
        assert!(!a.is_affirmative());
    }

    #[test]
    fn affirmative_detection() {
        assert!(parse_answer("YES | 0.9").is_affirmative());
        assert!(parse_answer("Yes, it is | 0.9").is_affirmative());
        assert!(!parse_answer("NO | 0.9").is_affirmative());
    }
}

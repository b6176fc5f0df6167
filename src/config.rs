//! Configuration for tax-document processing.
//!
//! Every knob lives in [`ProcessingConfig`], built via its builder. Keeping
//! them in one struct makes it trivial to share a config across page tasks,
//! log it, and diff two runs to understand why their estimates differ.

use crate::error::TaxDocError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for one processing run.
///
/// Built via [`ProcessingConfig::builder()`] or [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use taxdoc::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .concurrency(2)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 200.
    ///
    /// Scanned tax forms carry small box labels and fine print; 200 DPI keeps
    /// them legible to the model without producing oversized uploads.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// A safety cap independent of DPI so an oversized scan cannot exhaust
    /// memory or blow past API upload limits.
    pub max_rendered_pixels: u32,

    /// Number of page tasks in flight at once. Default: 4.
    ///
    /// Each page asks the QA capability several questions, so the effective
    /// request rate is a multiple of this. Lower it on 429 responses.
    pub concurrency: usize,

    /// Model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for QA completions. Default: 0.0.
    ///
    /// Reading numbers off a form is transcription; any creativity is error.
    pub temperature: f32,

    /// Maximum retry attempts on a transient QA failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Confidence above which the "instructional/blank page" signal wins and
    /// the page is excluded outright. Default: 0.5.
    pub instructional_threshold: f32,

    /// Minimum confidence for a form-identity answer to be accepted.
    /// Below it the page is classified unknown. Default: 0.35.
    pub identity_threshold: f32,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-QA-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Whole-request deadline in seconds, spanning every page task.
    /// Default: 600.
    pub request_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 2000,
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_retries: 3,
            retry_backoff_ms: 500,
            instructional_threshold: 0.5,
            identity_threshold: 0.35,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            request_timeout_secs: 600,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("instructional_threshold", &self.instructional_threshold)
            .field("identity_threshold", &self.identity_threshold)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn instructional_threshold(mut self, t: f32) -> Self {
        self.config.instructional_threshold = t;
        self
    }

    pub fn identity_threshold(mut self, t: f32) -> Self {
        self.config.identity_threshold = t;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, TaxDocError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(TaxDocError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(TaxDocError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        for (name, t) in [
            ("instructional_threshold", c.instructional_threshold),
            ("identity_threshold", c.identity_threshold),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(TaxDocError::InvalidConfig(format!(
                    "{name} must be within [0.0, 1.0], got {t}"
                )));
            }
        }
        if c.request_timeout_secs == 0 {
            return Err(TaxDocError::InvalidConfig(
                "request_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = ProcessingConfig::builder().build().expect("valid defaults");
        assert_eq!(c.dpi, 200);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.instructional_threshold, 0.5);
    }

    #[test]
    fn builder_clamps_dpi_and_concurrency() {
        let c = ProcessingConfig::builder()
            .dpi(10_000)
            .concurrency(0)
            .build()
            .expect("clamped values build");
        assert_eq!(c.dpi, 400);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let err = ProcessingConfig::builder()
            .identity_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, TaxDocError::InvalidConfig(_)));
    }
}

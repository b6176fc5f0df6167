//! Request orchestration: from submitted PDFs to a [`TaxReturnOutput`].
//!
//! ## Shape of a request
//!
//! ```text
//! validate ─▶ resolve/render/encode ─▶ classify+extract per page ─▶ aggregate
//!                                      (fan-out, bounded)           (barrier)
//!                                                                      │
//!                               render summary doc ◀─ format ◀─ compute tax
//! ```
//!
//! Page tasks are independent and fan out through `buffer_unordered`,
//! bounded by the configured concurrency so the QA capability's rate limits
//! are respected. Aggregation is a strict barrier: totals are computed only
//! once every page task has completed or definitively failed. A global
//! request deadline covers the whole fan-out; hitting it drops the stream,
//! which cancels in-flight tasks cooperatively (nothing is persisted, so
//! there is nothing to roll back).
//!
//! Errors local to one page or one field are absorbed into the output;
//! only request validation, provider setup, and rule-table defects are
//! fatal.

use crate::aggregate::{aggregate, TaxProfile};
use crate::classify::{classify, PageClassification};
use crate::config::ProcessingConfig;
use crate::error::{PageFailure, TaxDocError};
use crate::extract::{extract, ExtractedForm};
use crate::output::{ProcessingStats, TaxReturnOutput};
use crate::pipeline::{encode, input, render, RawPage};
use crate::qa::{DocumentQa, VisionQa};
use crate::summary::{DocumentDetail, DocumentRenderer, SummarySlots};
use crate::tax::{compute, FilingStatus, TaxYearRules};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// The caller's request parameters, as received from the client boundary.
#[derive(Debug, Clone)]
pub struct TaxRequest {
    /// Filing status string, case-insensitive (see [`FilingStatus::parse`]).
    pub filing_status: String,
    /// Number of dependents; must be non-negative.
    pub num_dependents: i64,
}

/// Process a batch of tax documents (paths or URLs) end to end.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(TaxReturnOutput)` on success, even if some pages or fields could not
/// be read (check `output.notes` and `output.failures`).
///
/// # Errors
/// Returns `Err(TaxDocError)` only for request-level defects: invalid
/// filing status or dependent count, no documents, no usable pages at all,
/// provider not configured, rule-table defects, or the global deadline.
pub async fn process_documents(
    inputs: &[String],
    request: &TaxRequest,
    renderer: Option<&dyn DocumentRenderer>,
    config: &ProcessingConfig,
) -> Result<TaxReturnOutput, TaxDocError> {
    let total_start = Instant::now();

    // Validation fails the whole request before any page is touched.
    let (filing_status, dependents) = validate_request(inputs, request)?;
    info!(
        "Processing {} documents (status {}, {} dependents)",
        inputs.len(),
        filing_status,
        dependents
    );

    let provider = resolve_provider(config)?;
    let qa: Arc<dyn DocumentQa> = Arc::new(VisionQa::new(provider, config));

    let render_start = Instant::now();
    let (pages, failures) = load_pages(inputs, config).await;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    if pages.is_empty() {
        let first_error = failures
            .first()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no pages rendered".to_string());
        return Err(TaxDocError::AllPagesFailed {
            total: failures.len(),
            first_error,
        });
    }

    let mut output = run_pipeline(pages, &qa, filing_status, dependents, renderer, config).await?;
    output.failures.extend(failures);
    output.stats.failed_pages = output.failures.len();
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Process pre-rasterised pages with a caller-supplied QA adapter.
///
/// The page-loading stages need pdfium and a vision provider; everything
/// from classification onwards does not. Exposing this seam keeps the whole
/// decision pipeline testable without either.
pub async fn process_pages(
    pages: Vec<RawPage>,
    qa: &Arc<dyn DocumentQa>,
    request: &TaxRequest,
    renderer: Option<&dyn DocumentRenderer>,
    config: &ProcessingConfig,
) -> Result<TaxReturnOutput, TaxDocError> {
    let total_start = Instant::now();
    let filing_status = FilingStatus::parse(&request.filing_status)?;
    let dependents = validate_dependents(request.num_dependents)?;
    if pages.is_empty() {
        return Err(TaxDocError::NoDocuments);
    }

    let mut output = run_pipeline(pages, qa, filing_status, dependents, renderer, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

// ── Internal stages ──────────────────────────────────────────────────────

fn validate_request(
    inputs: &[String],
    request: &TaxRequest,
) -> Result<(FilingStatus, u32), TaxDocError> {
    if inputs.is_empty() {
        return Err(TaxDocError::NoDocuments);
    }
    let status = FilingStatus::parse(&request.filing_status)?;
    let dependents = validate_dependents(request.num_dependents)?;
    Ok((status, dependents))
}

fn validate_dependents(value: i64) -> Result<u32, TaxDocError> {
    u32::try_from(value).map_err(|_| TaxDocError::InvalidDependents { value })
}

/// Resolve, rasterise, and encode every submitted document.
///
/// Failures here are per-document or per-page: an unreadable PDF excludes
/// its pages and records a failure, it never aborts the batch.
async fn load_pages(
    inputs: &[String],
    config: &ProcessingConfig,
) -> (Vec<RawPage>, Vec<PageFailure>) {
    let mut pages = Vec::new();
    let mut failures = Vec::new();

    for raw_input in inputs {
        let resolved = match input::resolve_document(raw_input, config.download_timeout_secs).await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("{raw_input}: unusable document: {e}");
                failures.push(PageFailure::DocumentUnreadable {
                    file: raw_input.clone(),
                    detail: e.to_string(),
                });
                continue;
            }
        };
        let name = resolved.display_name();

        let rendered = match render::render_document(resolved.path(), config).await {
            Ok(r) => r,
            Err(e) => {
                warn!("{name}: render failed: {e}");
                failures.push(PageFailure::DocumentUnreadable {
                    file: name,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        for (idx, detail) in rendered.failed {
            failures.push(PageFailure::RenderFailed {
                file: name.clone(),
                page: idx,
                detail,
            });
        }

        for (idx, image) in rendered.pages {
            match encode::encode_page(&image) {
                Ok(data) => pages.push(RawPage {
                    source_file: name.clone(),
                    page_index: idx,
                    image: data,
                }),
                Err(e) => failures.push(PageFailure::RenderFailed {
                    file: name.clone(),
                    page: idx,
                    detail: format!("image encoding failed: {e}"),
                }),
            }
        }
    }

    (pages, failures)
}

/// One page task: classify, and extract only when processable.
struct PageOutcome {
    classification: PageClassification,
    form: Option<ExtractedForm>,
}

/// Fan out page tasks, join at the aggregation barrier, compute and format.
async fn run_pipeline(
    pages: Vec<RawPage>,
    qa: &Arc<dyn DocumentQa>,
    filing_status: FilingStatus,
    dependents: u32,
    renderer: Option<&dyn DocumentRenderer>,
    config: &ProcessingConfig,
) -> Result<TaxReturnOutput, TaxDocError> {
    let total_pages = pages.len();
    let qa_start = Instant::now();

    let fan_out = stream::iter(pages.into_iter().map(|page| {
        let qa = Arc::clone(qa);
        let config = config.clone();
        async move {
            let classification = classify(&page, qa.as_ref(), &config).await;
            let form = if classification.processable {
                Some(extract(&page, classification.form_type, qa.as_ref()).await)
            } else {
                None
            };
            PageOutcome {
                classification,
                form,
            }
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect::<Vec<PageOutcome>>();

    // Aggregation barrier: every page task completes (or the deadline hits)
    // before any total is computed.
    let mut outcomes = timeout(
        Duration::from_secs(config.request_timeout_secs),
        fan_out,
    )
    .await
    .map_err(|_| TaxDocError::RequestTimeout {
        secs: config.request_timeout_secs,
    })?;
    let qa_duration_ms = qa_start.elapsed().as_millis() as u64;

    // Completion order is nondeterministic; sort for reproducible output.
    outcomes.sort_by(|a, b| {
        (&a.classification.source_file, a.classification.page_index)
            .cmp(&(&b.classification.source_file, b.classification.page_index))
    });

    let forms: Vec<ExtractedForm> = outcomes.iter().filter_map(|o| o.form.clone()).collect();
    let classifications: Vec<PageClassification> =
        outcomes.iter().map(|o| o.classification.clone()).collect();
    let skipped_pages = classifications.iter().filter(|c| !c.processable).count();
    debug!(
        "{} pages classified: {} extractable, {} skipped",
        total_pages,
        forms.len(),
        skipped_pages
    );

    let profile = aggregate(&forms, filing_status, dependents);

    let rules = TaxYearRules::year_2024();
    let summary = compute(&profile, &rules)?;

    let (summary_document, render_error) = render_summary(renderer, &profile, &summary);

    let notes: Vec<_> = forms.iter().flat_map(|f| f.notes.clone()).collect();
    let documents: Vec<DocumentDetail> = forms.iter().map(DocumentDetail::from).collect();

    let message = status_message(forms.len(), total_pages, notes.len());
    info!("{message}");

    Ok(TaxReturnOutput {
        message,
        summary_rounded: summary.rounded(),
        summary,
        documents,
        classifications,
        sources: profile.sources.clone(),
        notes,
        failures: Vec::new(),
        summary_document,
        render_error,
        stats: ProcessingStats {
            total_pages,
            extracted_pages: forms.len(),
            skipped_pages,
            failed_pages: 0,
            render_duration_ms: 0,
            qa_duration_ms,
            total_duration_ms: 0,
        },
    })
}

/// Best-effort document rendering: a failure here never loses the numbers.
fn render_summary(
    renderer: Option<&dyn DocumentRenderer>,
    profile: &TaxProfile,
    summary: &crate::tax::TaxSummary,
) -> (Option<std::path::PathBuf>, Option<String>) {
    let Some(renderer) = renderer else {
        return (None, None);
    };
    let slots = SummarySlots::project(profile, summary);
    match renderer.render(&slots) {
        Ok(path) => (Some(path), None),
        Err(e) => {
            warn!("Summary document rendering failed: {e}");
            (None, Some(e.to_string()))
        }
    }
}

fn status_message(extracted: usize, total: usize, note_count: usize) -> String {
    if extracted == 0 {
        format!("No recognisable tax forms found among {total} pages; totals are zero.")
    } else if note_count == 0 {
        format!("Processed {extracted} of {total} pages successfully.")
    } else {
        format!(
            "Processed {extracted} of {total} pages; {note_count} field(s) could not be read."
        )
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed
///    and configured the provider entirely; used as-is. Useful in tests or
///    behind caching/rate-limiting middleware.
/// 2. **Named provider + model** (`config.provider_name`) — reads the
///    corresponding API key from the environment.
/// 3. **Environment pair** (`TAXDOC_LLM_PROVIDER` + `TAXDOC_MODEL`) —
///    honoured before full auto-detection so an execution-environment
///    choice wins even when multiple API keys are present.
/// 4. **Full auto-detection** — the factory scans known API key variables
///    and picks the first available provider.
fn resolve_provider(config: &ProcessingConfig) -> Result<Arc<dyn LLMProvider>, TaxDocError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("TAXDOC_LLM_PROVIDER"),
        std::env::var("TAXDOC_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TaxDocError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                 Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TaxDocError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TaxDocError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependents_must_be_non_negative() {
        assert!(matches!(
            validate_dependents(-1),
            Err(TaxDocError::InvalidDependents { value: -1 })
        ));
        assert_eq!(validate_dependents(0).unwrap(), 0);
        assert_eq!(validate_dependents(4).unwrap(), 4);
    }

    #[test]
    fn empty_batch_fails_validation() {
        let request = TaxRequest {
            filing_status: "single".into(),
            num_dependents: 0,
        };
        let err = validate_request(&[], &request).unwrap_err();
        assert!(matches!(err, TaxDocError::NoDocuments));
    }

    #[test]
    fn status_messages_reflect_outcome() {
        assert!(status_message(0, 3, 0).contains("No recognisable"));
        assert!(status_message(2, 3, 0).contains("2 of 3"));
        assert!(status_message(2, 3, 1).contains("could not be read"));
    }
}

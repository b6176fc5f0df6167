//! CLI binary for taxdoc.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessingConfig` and prints the resulting estimate.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use taxdoc::{
    process_documents, MarkdownRenderer, ProcessingConfig, TaxRequest, TaxReturnOutput,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Single W-2, single filer
  taxdoc w2_2024.pdf --filing-status single

  # Multiple forms, married filing jointly, two dependents
  taxdoc w2_a.pdf w2_b.pdf 1099_int.pdf \
      --filing-status married_jointly --dependents 2

  # Write the draft summary document next to the output
  taxdoc w2.pdf --filing-status single -o tax_summary.md

  # Structured JSON for downstream tooling
  taxdoc w2.pdf --filing-status single --json > result.json

  # Use a specific model
  taxdoc --model gpt-4.1 --provider openai w2.pdf --filing-status single

FILING STATUSES:
  single, married_jointly (mfj), married_separately (mfs),
  head_of_household (hoh)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY        OpenAI API key
  ANTHROPIC_API_KEY     Anthropic API key
  GEMINI_API_KEY        Google Gemini API key
  TAXDOC_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  TAXDOC_MODEL          Override model ID

SETUP:
  1. Set API key:   export OPENAI_API_KEY=sk-...
  2. Run:           taxdoc w2.pdf --filing-status single

NOTE:
  The output is a DRAFT ESTIMATE for 2024 federal income tax, not a
  filing. Verify every amount against the source documents.
"#;

/// Estimate 2024 US federal income tax from scanned W-2 / 1099 PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "taxdoc",
    version,
    about = "Estimate 2024 US federal income tax from scanned W-2 / 1099 PDFs",
    long_about = "Reads scanned tax forms (W-2, 1099-NEC, 1099-INT) with a vision \
document-QA model, aggregates wages, withholding, interest and nonemployee \
compensation, and computes a draft 2024 federal income tax estimate using \
the standard deduction and marginal brackets.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs (one per document).
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Filing status: single, married_jointly, married_separately, head_of_household.
    #[arg(short = 's', long, env = "TAXDOC_FILING_STATUS")]
    filing_status: String,

    /// Number of dependents.
    #[arg(short, long, env = "TAXDOC_DEPENDENTS", default_value_t = 0)]
    dependents: i64,

    /// Write the draft summary document to this path (Markdown).
    #[arg(short, long, env = "TAXDOC_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "TAXDOC_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "TAXDOC_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama."
    )]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "TAXDOC_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of concurrent QA page tasks.
    #[arg(short, long, env = "TAXDOC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per QA call on provider failure.
    #[arg(long, env = "TAXDOC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Output the full structured result as JSON instead of a report.
    #[arg(long, env = "TAXDOC_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TAXDOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the final numbers.
    #[arg(short, long, env = "TAXDOC_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "TAXDOC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-QA-call timeout in seconds.
    #[arg(long, env = "TAXDOC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Whole-request deadline in seconds.
    #[arg(long, env = "TAXDOC_REQUEST_TIMEOUT", default_value_t = 600)]
    request_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let request = TaxRequest {
        filing_status: cli.filing_status.clone(),
        num_dependents: cli.dependents,
    };

    let renderer = cli.output.as_ref().map(MarkdownRenderer::new);
    let output = process_documents(
        &cli.inputs,
        &request,
        renderer
            .as_ref()
            .map(|r| r as &dyn taxdoc::DocumentRenderer),
        &config,
    )
    .await
    .context("Processing failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_report(&output, cli.quiet)?;
    }

    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli) -> Result<ProcessingConfig> {
    let mut config = ProcessingConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .request_timeout_secs(cli.request_timeout)
        .build()
        .context("Invalid configuration")?;

    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();

    Ok(config)
}

/// Human-readable report on stdout.
fn print_report(output: &TaxReturnOutput, quiet: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let s = &output.summary_rounded;

    writeln!(out, "{}", bold("DRAFT 2024 Federal Income Tax Estimate"))?;
    writeln!(out)?;
    writeln!(out, "  Gross income:        ${}", s.gross_income)?;
    writeln!(out, "  Standard deduction:  ${}", s.standard_deduction)?;
    writeln!(out, "  Taxable income:      ${}", s.taxable_income)?;
    writeln!(out, "  Calculated tax:      ${}", s.calculated_tax)?;
    writeln!(out, "  Total withheld:      ${}", s.total_withheld)?;
    writeln!(out)?;
    if s.tax_due_or_refund.is_sign_negative() {
        writeln!(
            out,
            "  {}",
            green(&format!("Estimated refund:    ${}", -s.tax_due_or_refund))
        )?;
    } else {
        writeln!(
            out,
            "  {}",
            yellow(&format!("Estimated tax due:   ${}", s.tax_due_or_refund))
        )?;
    }

    if quiet {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(
        out,
        "{} {}  {}",
        if output.failures.is_empty() && output.notes.is_empty() {
            green("✔")
        } else {
            yellow("⚠")
        },
        output.message,
        dim(&format!("{}ms", output.stats.total_duration_ms)),
    )?;

    for doc in &output.documents {
        writeln!(
            out,
            "  {} {} page {}  ({})",
            green("✓"),
            doc.source_file,
            doc.page_index + 1,
            doc.form_type
        )?;
    }
    for note in &output.notes {
        writeln!(
            out,
            "  {} {} page {}: {} — {}",
            yellow("⚠"),
            note.source_file,
            note.page_index + 1,
            note.field,
            note.reason
        )?;
    }
    for failure in &output.failures {
        writeln!(out, "  {} {}", red("✗"), failure)?;
    }

    if let Some(ref path) = output.summary_document {
        writeln!(out, "\nSummary document: {}", bold(&path.display().to_string()))?;
    } else if let Some(ref err) = output.render_error {
        writeln!(out, "\n{}", red(&format!("Summary document failed: {err}")))?;
    }

    writeln!(
        out,
        "\n{}",
        dim("Draft estimate only — verify all amounts before filing.")
    )?;

    Ok(())
}

//! CLI binary for edgequake-docsum.
//!
//! A thin shim over the streaming API: flags map to `AnalysisConfig` and
//! `LlmSettings`, progress events drive the bar, and the final response is
//! printed as text, JSON or the raw event lines.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docsum::config::DEFAULT_MODEL;
use edgequake_docsum::{
    analyze_stream, AnalysisConfig, AnalysisResponse, LlmSettings, ProgressEvent,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # Readable summary on stdout
  docsum quarterly.pdf

  # Structured JSON response to a file
  docsum --json deck.pptx -o deck.summary.json

  # Progress events as NDJSON (one JSON object per line)
  docsum --events memo.docx

  # Keyword mind map as Mermaid text
  docsum --mindmap memo.docx -o memo.mmd

  # Any OpenAI-compatible endpoint
  docsum --base-url http://localhost:11434/v1 --model qwen2.5 notes.md

  # A named edgequake-llm provider (key read from its own env var)
  docsum --provider anthropic --model claude-sonnet-4-20250514 report.pdf

SUPPORTED FORMATS:
  .pdf   one page unit per physical page (needs pdfium)
  .pptx  one page unit per slide
  .docx  paragraphs grouped into ~1200-character units
  .txt   lines grouped into ~1500-character units
  .md    same as .txt

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      API key for the OpenAI-compatible endpoint
  OPENAI_BASE_URL     Endpoint base URL (default https://api.openai.com/v1)
  DOCSUM_MODEL        Chat model ID
  DOCSUM_PROVIDER     edgequake-llm provider name, used when no API key is set
  PDFIUM_LIB_PATH     Path to libpdfium; otherwise the system library is used
  RUST_LOG            Overrides the log filter
"#;

/// Summarize documents page by page with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docsum",
    version,
    about = "Summarize PDF, DOCX, PPTX and text documents page by page with an LLM",
    long_about = "Split a document into pages, skip cover/TOC/blank pages, summarize every \
page into cited bullets and build a document-level summary. Works with OpenAI or any \
OpenAI-compatible endpoint, or any provider supported by edgequake-llm.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to summarize (.pdf, .docx, .pptx, .txt, .md).
    input: PathBuf,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "DOCSUM_OUTPUT")]
    output: Option<PathBuf>,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Chat model ID.
    #[arg(long, env = "DOCSUM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama, …) used
    /// when no API key is given.
    #[arg(long, env = "DOCSUM_PROVIDER")]
    provider: Option<String>,

    /// Maximum concurrent page summarization calls.
    #[arg(short, long, env = "DOCSUM_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Characters of page text sent to the model per page.
    #[arg(long, env = "DOCSUM_PAGE_CHARS", default_value_t = 4000)]
    page_chars: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DOCSUM_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// LLM temperature (0.0–2.0). Provider default when unset.
    #[arg(long, env = "DOCSUM_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max completion tokens per call. Provider default when unset.
    #[arg(long, env = "DOCSUM_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "DOCSUM_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print progress events as NDJSON instead of a summary.
    #[arg(long, env = "DOCSUM_EVENTS", conflicts_with = "json")]
    events: bool,

    /// Print the final response as JSON.
    #[arg(long, env = "DOCSUM_JSON")]
    json: bool,

    /// Print only the Mermaid mind map.
    #[arg(long, env = "DOCSUM_MINDMAP", conflicts_with_all = ["json", "events"])]
    mindmap: bool,

    /// Keywords extracted per page; 0 disables them.
    #[arg(long, env = "DOCSUM_KEYWORDS", default_value_t = 8)]
    keywords: usize,

    /// Disable progress bar.
    #[arg(long, env = "DOCSUM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSUM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSUM_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar carries the feedback while it is shown; keep library logs quiet.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.events;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;
    let settings = LlmSettings::new(cli.api_key.clone().unwrap_or_default())
        .with_base_url(cli.base_url.clone().unwrap_or_default())
        .with_model(cli.model.clone());

    let start = Instant::now();
    let mut events = analyze_stream(&cli.input, &settings, &config)
        .await
        .with_context(|| format!("Cannot analyze {}", cli.input.display()))?;

    let bar = if show_progress {
        Some(progress_bar())
    } else {
        None
    };
    let mut sink = open_sink(cli.output.as_ref())?;

    // ── Drain events ─────────────────────────────────────────────────────
    let mut terminal = None;
    while let Some(event) = events.next().await {
        if let Some(ref bar) = bar {
            bar.set_position(event.percent() as u64);
            bar.set_message(event.message().to_string());
        }
        if cli.events {
            sink.write_all(event.to_ndjson().as_bytes())
                .context("Failed to write event")?;
            sink.flush().ok();
        }
        if event.is_terminal() {
            terminal = Some(event);
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let response = match terminal {
        Some(ProgressEvent::Result { data, .. }) => *data,
        Some(ProgressEvent::Error { message, .. }) => {
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), message);
            }
            anyhow::bail!("Analysis failed");
        }
        _ => anyhow::bail!("Analysis ended without a result"),
    };

    // ── Output ───────────────────────────────────────────────────────────
    if !cli.events {
        let rendered = if cli.json {
            serde_json::to_string_pretty(&response).context("Failed to serialise response")?
        } else if cli.mindmap {
            response.mindmap_mermaid.clone()
        } else {
            render_text(&response)
        };
        sink.write_all(rendered.as_bytes())
            .context("Failed to write output")?;
        if !rendered.ends_with('\n') {
            sink.write_all(b"\n").ok();
        }
    }
    sink.flush().context("Failed to flush output")?;

    if !cli.quiet {
        eprintln!(
            "{} {} pages ({} skipped)  {}",
            green("✔"),
            bold(&response.total_pages.to_string()),
            response.skipped_pages(),
            dim(&format!("{:.1}s", start.elapsed().as_secs_f64())),
        );
        if let Some(ref path) = cli.output {
            eprintln!("   → {}", bold(&path.display().to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .concurrency(cli.concurrency)
        .page_char_budget(cli.page_chars)
        .keywords_per_page(cli.keywords)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.clone());
    }

    builder.build().context("Invalid configuration")
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
    bar.set_style(style);
    bar.set_prefix("Analyzing");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn open_sink(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(io::BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Plain-text rendering of a response.
fn render_text(response: &AnalysisResponse) -> String {
    let mut out = String::new();
    let global = &response.global_summary;

    let _ = writeln!(
        out,
        "# Summary  ({} pages, {} skipped, language: {})\n",
        response.total_pages,
        response.skipped_pages(),
        response.language
    );
    let _ = writeln!(out, "## Overview");
    for bullet in &global.bullets {
        let _ = writeln!(out, "- {bullet}");
    }
    for (title, body) in [
        ("Key conclusions", &global.expansions.key_conclusions),
        ("Core data", &global.expansions.core_data),
        ("Risks and actions", &global.expansions.risks_and_actions),
    ] {
        let _ = writeln!(out, "\n## {title}\n{body}");
    }

    let _ = writeln!(out, "\n## Pages");
    for page in &response.page_summaries {
        let _ = writeln!(out, "\n### Page {} [{}]", page.page_number, page.classification);
        for bullet in &page.bullets {
            let _ = writeln!(out, "{bullet}");
        }
        if !page.keywords.is_empty() {
            let _ = writeln!(out, "Keywords: {}", page.keywords.join(", "));
        }
    }

    let _ = writeln!(
        out,
        "\n## Mind map\n```mermaid\n{}\n```",
        response.mindmap_mermaid
    );
    out
}

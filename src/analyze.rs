//! Eager (whole-document) analysis entry points.
//!
//! These wait for the full pipeline and return the final
//! [`AnalysisResponse`]. Stage transitions go to
//! [`AnalysisConfig::progress_callback`] when one is set. Use
//! [`crate::stream::analyze_stream`] to observe progress as events instead.
//!
//! The pipeline core in [`run_pipeline`] is shared with the streaming API so
//! both paths produce identical responses.

use crate::classify::{classify_page, ClassifiedPage};
use crate::config::{AnalysisConfig, LlmSettings};
use crate::engine::SummaryEngine;
use crate::error::DigestError;
use crate::output::{AnalysisResponse, PageContent, PageSummary};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::llm::ChatBackend;
use crate::mindmap;
use crate::pipeline::{keywords, language, parse};
use crate::progress::{AnalysisProgressCallback, NoopProgressCallback, Stage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// A document to analyze, in any of the forms the library accepts.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    /// A local file; the extension selects the parser.
    Path(PathBuf),
    /// An in-memory upload with its original file name.
    Upload { bytes: Vec<u8>, filename: String },
    /// Pre-split pages, for callers with their own extraction.
    Pages(Vec<PageContent>),
}

/// Input that passed validation and is ready for the parser.
pub(crate) struct PreparedInput {
    source: PreparedSource,
    /// File stem of the original name; the mind map falls back to it.
    name: String,
}

enum PreparedSource {
    File(ResolvedInput),
    Pages(Vec<PageContent>),
}

/// Name used when the input carries no file name.
const UNNAMED_DOCUMENT: &str = "Document";

fn file_stem(name: &Path) -> String {
    name.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNNAMED_DOCUMENT.to_string())
}

/// Validate and stage an input. Every input error surfaces here.
pub(crate) fn prepare_input(
    input: DocumentInput,
    config: &AnalysisConfig,
) -> Result<PreparedInput, DigestError> {
    let prepared = match input {
        DocumentInput::Path(path) => PreparedInput {
            name: file_stem(&path),
            source: PreparedSource::File(input::resolve_local(path)?),
        },
        DocumentInput::Upload { bytes, filename } => PreparedInput {
            name: file_stem(Path::new(&filename)),
            source: PreparedSource::File(input::write_upload(
                &bytes,
                &filename,
                config.max_upload_bytes,
            )?),
        },
        DocumentInput::Pages(pages) => PreparedInput {
            name: UNNAMED_DOCUMENT.to_string(),
            source: PreparedSource::Pages(pages),
        },
    };
    Ok(prepared)
}

/// Run parse → classify → page summaries → global summary → mind map.
///
/// Reports every non-terminal stage to `report`. The caller reports the
/// terminal stage.
pub(crate) async fn run_pipeline(
    input: PreparedInput,
    engine: &SummaryEngine,
    report: &dyn AnalysisProgressCallback,
) -> Result<AnalysisResponse, DigestError> {
    let start = Instant::now();
    report.on_stage(&Stage::Started);

    // ── Step 1: Parse ────────────────────────────────────────────────────
    report.on_stage(&Stage::Parsing);
    let pages = match input.source {
        PreparedSource::File(resolved) => {
            parse::parse_pages(resolved.path(), resolved.extension()).await?
        }
        PreparedSource::Pages(pages) => pages,
    };
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(DigestError::EmptyDocument);
    }
    let language = language::detect_language(
        &pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    );

    // ── Step 2: Classify ─────────────────────────────────────────────────
    report.on_stage(&Stage::Classifying);
    let classified: Vec<ClassifiedPage> = pages
        .iter()
        .map(|p| classify_page(p.page_number, &p.text))
        .collect();
    let total = classified.len();
    let skipped = classified.iter().filter(|p| p.should_skip()).count();
    info!(
        "Classified {} pages ({} skipped), language {}",
        total, skipped, language
    );
    let keywords_per_page = engine.config().keywords_per_page;
    let page_keywords: Vec<Vec<String>> = classified
        .iter()
        .map(|p| {
            if p.should_skip() {
                Vec::new()
            } else {
                keywords::extract_keywords(&p.text, keywords_per_page)
            }
        })
        .collect();

    // ── Step 3: Page summaries ───────────────────────────────────────────
    report.on_stage(&Stage::SummarizingPages { done: 0, total });
    let results = engine
        .summarize_pages(&classified, |done| {
            report.on_stage(&Stage::SummarizingPages { done, total })
        })
        .await?;

    // ── Step 4: Global summary ───────────────────────────────────────────
    report.on_stage(&Stage::SummarizingGlobal);
    let global_summary = engine.summarize_global(&results).await?;

    // ── Step 5: Mind map ─────────────────────────────────────────────────
    let title = mindmap::infer_doc_title(&pages, &input.name);
    let doc_title = mindmap::select_root_label(&page_keywords, &title);
    let mindmap_mermaid = mindmap::build_mermaid_mindmap(
        &doc_title,
        &page_keywords,
        mindmap::DEFAULT_BRANCHES,
        mindmap::DEFAULT_RELATED,
    );

    info!(
        "Analysis complete: {} pages in {}ms",
        total,
        start.elapsed().as_millis()
    );

    Ok(AnalysisResponse {
        language,
        total_pages: total,
        page_summaries: results
            .into_iter()
            .zip(page_keywords)
            .map(|(result, keywords)| PageSummary::new(result, keywords))
            .collect(),
        global_summary,
        system_prompt: engine.system_prompt().to_string(),
        doc_title,
        mindmap_mermaid,
    })
}

/// Analyze a local document with per-request credentials.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docsum::{analyze, AnalysisConfig, LlmSettings};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = LlmSettings::new(std::env::var("OPENAI_API_KEY")?);
/// let response = analyze("deck.pptx", &settings, &AnalysisConfig::default()).await?;
/// for bullet in &response.global_summary.bullets {
///     println!("{bullet}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn analyze(
    path: impl AsRef<Path>,
    settings: &LlmSettings,
    config: &AnalysisConfig,
) -> Result<AnalysisResponse, DigestError> {
    let input = prepare_input(DocumentInput::Path(path.as_ref().to_path_buf()), config)?;
    let engine = SummaryEngine::from_settings(settings, config.clone())?;
    run_eager(input, engine).await
}

/// Analyze an in-memory upload.
///
/// The bytes are staged in a managed temp file named after `filename`'s
/// extension and removed on return.
pub async fn analyze_bytes(
    bytes: &[u8],
    filename: &str,
    settings: &LlmSettings,
    config: &AnalysisConfig,
) -> Result<AnalysisResponse, DigestError> {
    let input = prepare_input(
        DocumentInput::Upload {
            bytes: bytes.to_vec(),
            filename: filename.to_string(),
        },
        config,
    )?;
    let engine = SummaryEngine::from_settings(settings, config.clone())?;
    run_eager(input, engine).await
}

/// Analyze any input with an explicit chat backend.
pub async fn analyze_with_backend(
    input: DocumentInput,
    backend: Arc<dyn ChatBackend>,
    config: &AnalysisConfig,
) -> Result<AnalysisResponse, DigestError> {
    let input = prepare_input(input, config)?;
    run_eager(input, SummaryEngine::new(backend, config.clone())).await
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    path: impl AsRef<Path>,
    settings: &LlmSettings,
    config: &AnalysisConfig,
) -> Result<AnalysisResponse, DigestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DigestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(path, settings, config))
}

async fn run_eager(
    input: PreparedInput,
    engine: SummaryEngine,
) -> Result<AnalysisResponse, DigestError> {
    let callback = engine.config().progress_callback.clone();
    let report: &dyn AnalysisProgressCallback = match callback {
        Some(ref cb) => cb.as_ref(),
        None => &NoopProgressCallback,
    };

    let result = run_pipeline(input, &engine, report).await;
    match result {
        Ok(_) => report.on_stage(&Stage::Completed),
        Err(ref e) => {
            error!("Analysis failed: {}", e);
            report.on_stage(&Stage::Failed);
        }
    }
    result
}

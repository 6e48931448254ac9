//! # edgequake-docsum
//!
//! Summarize PDF, DOCX, PPTX and plain-text documents page by page with an
//! LLM, then synthesize a document-level summary.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Input      validate the name, stage uploads in a temp file
//!  ├─ 2. Parse      split into page units (pdfium / zip+XML / lines)
//!  ├─ 3. Classify   cover, toc, blank and image-only pages skip the LLM
//!  ├─ 4. Pages      3–5 cited bullets per page, bounded concurrency
//!  ├─ 5. Global     5–7 overview bullets + three expansion paragraphs
//!  ├─ 6. Mind map   page keywords → Mermaid mindmap text
//!  └─ 7. Output     AnalysisResponse, or a stream of progress events
//! ```
//!
//! Every page bullet carries its citation, `〔p.N〕• …`, so each line of the
//! global summary can be traced back to a page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docsum::{analyze, AnalysisConfig, LlmSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = LlmSettings::new(std::env::var("OPENAI_API_KEY")?)
//!         .with_model("gpt-5-mini-2025-08-07");
//!     let response = analyze("quarterly.pdf", &settings, &AnalysisConfig::default()).await?;
//!     for page in &response.page_summaries {
//!         for bullet in &page.bullets {
//!             println!("{bullet}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docsum` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docsum = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod mindmap;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, analyze_bytes, analyze_sync, analyze_with_backend, DocumentInput};
pub use classify::{classify_page, Classification, ClassifiedPage};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, LengthBand, LlmSettings};
pub use engine::SummaryEngine;
pub use error::{DigestError, ShapeError};
pub use mindmap::build_mermaid_mindmap;
pub use output::{
    AnalysisResponse, GlobalSummary, GlobalSummaryExpansions, PageContent, PageSummary,
    PageSummaryResult,
};
pub use pipeline::keywords::extract_keywords;
pub use pipeline::llm::{ChatBackend, OpenAiCompatClient, ProviderBackend};
pub use progress::{
    AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, ProgressEvent, Stage,
};
pub use stream::{analyze_stream, analyze_stream_bytes, analyze_stream_with_backend, EventStream};

//! Result types produced by the summary engine and the analysis pipeline.

use crate::classify::Classification;
use serde::{Deserialize, Serialize};

/// Raw text of one page unit as produced by a parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    /// 1-indexed page (or chunk) number.
    pub page_number: usize,
    pub text: String,
}

impl PageContent {
    pub fn new(page_number: usize, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// Summary of one page, produced exactly once per input page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummaryResult {
    pub page_number: usize,
    pub classification: Classification,
    /// Citation-prefixed bullets, `〔p.N〕• …`.
    pub bullets: Vec<String>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

/// The three prose paragraphs that accompany the overview bullets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSummaryExpansions {
    pub key_conclusions: String,
    pub core_data: String,
    pub risks_and_actions: String,
}

/// Document-level synthesis derived from every page bullet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSummary {
    /// 5–7 overview bullets.
    pub bullets: Vec<String>,
    pub expansions: GlobalSummaryExpansions,
}

/// Per-page entry of the final response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page_number: usize,
    pub classification: Classification,
    pub bullets: Vec<String>,
    /// Most frequent terms of the page text; empty for skipped pages.
    pub keywords: Vec<String>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

impl PageSummary {
    pub fn new(result: PageSummaryResult, keywords: Vec<String>) -> Self {
        Self {
            page_number: result.page_number,
            classification: result.classification,
            bullets: result.bullets,
            keywords,
            skipped: result.skipped,
            skip_reason: result.skip_reason,
        }
    }
}

/// Final response of a successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Detected language tag (`zh`, `en`, `ja`, `ko`).
    pub language: String,
    pub total_pages: usize,
    pub page_summaries: Vec<PageSummary>,
    pub global_summary: GlobalSummary,
    /// System prompt the summaries were generated with.
    pub system_prompt: String,
    /// Root label of the mind map.
    pub doc_title: String,
    /// Mermaid `mindmap` text built from the page keywords.
    pub mindmap_mermaid: String,
}

impl AnalysisResponse {
    /// Number of pages that bypassed the LLM.
    pub fn skipped_pages(&self) -> usize {
        self.page_summaries.iter().filter(|p| p.skipped).count()
    }
}

//! Page classification: decide which pages are worth an LLM call.
//!
//! Cover pages, tables of contents, blank/watermark-only pages and image-only
//! pages carry nothing a summary can use. Classifying them up front saves one
//! LLM call per page and keeps their bullets honest: the skip reason is used
//! verbatim instead of whatever the model would invent.
//!
//! Rules are checked in a fixed order and the first match wins. A short page 1
//! would otherwise match both `cover` and `blank`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Skip category assigned to a page before summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Normal,
    Toc,
    Cover,
    Blank,
    PureImage,
}

impl Classification {
    /// Wire label, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Normal => "normal",
            Classification::Toc => "toc",
            Classification::Cover => "cover",
            Classification::Blank => "blank",
            Classification::PureImage => "pure_image",
        }
    }

    /// Pages in a skip category bypass the LLM.
    pub fn is_skip(&self) -> bool {
        !matches!(self, Classification::Normal)
    }

    /// Bracketed reason used as the sole bullet of a skipped page.
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self {
            Classification::Normal => None,
            Classification::Toc => Some("〈本頁跳過（目錄）〉"),
            Classification::Cover => Some("〈本頁跳過（封面）〉"),
            Classification::Blank => Some("〈本頁跳過（空白/水印）〉"),
            Classification::PureImage => Some("〈本頁跳過（純圖片）〉"),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page with its classification. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedPage {
    pub page_number: usize,
    pub text: String,
    pub classification: Classification,
    pub skip_reason: Option<String>,
}

impl ClassifiedPage {
    /// True when the engine must not call the LLM for this page.
    pub fn should_skip(&self) -> bool {
        self.classification.is_skip()
    }
}

const TOC_KEYWORDS: &[&str] = &["目錄", "目录", "contents", "content"];
const COVER_KEYWORDS: &[&str] = &["報告", "企畫", "簡報", "計畫", "Proposal", "Report"];

/// Only the first few lines are searched for a TOC heading.
const TOC_HEADING_WINDOW: usize = 6;

static RE_DOT_LEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}\s*\d+$").unwrap());
static RE_TRAILING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s\d+$").unwrap());

/// Classify one page. Pure and deterministic.
pub fn classify_page(page_number: usize, text: &str) -> ClassifiedPage {
    let stripped = text.trim();
    let lines = non_empty_lines(stripped);

    let classification = if is_toc(&lines) {
        Classification::Toc
    } else if is_cover(&lines, page_number) {
        Classification::Cover
    } else if is_blank(stripped) {
        Classification::Blank
    } else if stripped.is_empty() {
        Classification::PureImage
    } else {
        Classification::Normal
    };

    ClassifiedPage {
        page_number,
        text: stripped.to_string(),
        classification,
        skip_reason: classification.skip_reason().map(str::to_string),
    }
}

fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_toc(lines: &[&str]) -> bool {
    if lines.is_empty() {
        return false;
    }
    let has_keyword = lines.iter().take(TOC_HEADING_WINDOW).any(|line| {
        let lower = line.to_lowercase();
        TOC_KEYWORDS.iter().any(|kw| lower.contains(kw))
    });
    if !has_keyword {
        return false;
    }
    let numbered = lines
        .iter()
        .filter(|line| RE_DOT_LEADER.is_match(line) || RE_TRAILING_NUMBER.is_match(line))
        .count();
    numbered >= (lines.len() / 3).max(2)
}

fn is_cover(lines: &[&str], page_number: usize) -> bool {
    if page_number != 1 {
        return false;
    }
    match lines.first() {
        None => true,
        Some(first) => lines.len() <= 4 && COVER_KEYWORDS.iter().any(|kw| first.contains(kw)),
    }
}

/// Non-empty text with at most four alphanumeric characters: page numbers,
/// watermarks, stray symbols.
fn is_blank(stripped: &str) -> bool {
    !stripped.is_empty() && stripped.chars().filter(|c| c.is_alphanumeric()).count() <= 4
}

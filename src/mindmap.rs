//! Mermaid mind map built from page keywords.
//!
//! The root is the document's name. The most frequent keywords across pages
//! become branches. Under each branch go the keywords it shares a page with.
//!
//! ```text
//! mindmap
//!   root)Report(
//!     revenue
//!       margins
//!       overseas
//!     inventory
//! ```
//!
//! Output is plain Mermaid text; rendering it is left to the caller.

use crate::output::PageContent;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Branches under the root.
pub const DEFAULT_BRANCHES: usize = 8;
/// Leaves under each branch.
pub const DEFAULT_RELATED: usize = 5;

const LABEL_LIMIT: usize = 40;
const TITLE_LIMIT: usize = 80;
/// Shorter candidate titles are passed over.
const MIN_TITLE_CHARS: usize = 4;

static RE_PRIMARY_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9\-_/]*").unwrap());

/// Collapse whitespace, cap the length, and replace characters Mermaid reads
/// as node syntax.
pub fn sanitize_label(text: &str, limit: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped = if limit > 0 && collapsed.chars().count() > limit {
        let head: String = collapsed.chars().take(limit - 1).collect();
        format!("{}…", head.trim_end())
    } else {
        collapsed
    };
    capped
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '(' => '（',
            ')' => '）',
            '[' => '［',
            ']' => '］',
            '{' => '｛',
            '}' => '｝',
            other => other,
        })
        .collect()
}

/// First line of the document long enough to serve as a title, else `fallback`.
pub fn infer_doc_title(pages: &[PageContent], fallback: &str) -> String {
    pages
        .iter()
        .flat_map(|p| p.text.lines())
        .map(|line| sanitize_label(line, TITLE_LIMIT))
        .find(|candidate| candidate.chars().count() >= MIN_TITLE_CHARS)
        .unwrap_or_else(|| sanitize_label(fallback, TITLE_LIMIT))
}

/// Root label: the title's first Latin token (preferring the keyword
/// spelling when one matches), else the top keyword, else the title.
pub fn select_root_label(page_keywords: &[Vec<String>], title: &str) -> String {
    if let Some(token) = RE_PRIMARY_TOKEN.find(title) {
        let token = sanitize_label(token.as_str(), LABEL_LIMIT);
        let lower = token.to_lowercase();
        return page_keywords
            .iter()
            .flatten()
            .find(|kw| kw.to_lowercase() == lower)
            .map(|kw| sanitize_label(kw, LABEL_LIMIT))
            .unwrap_or(token);
    }
    match top_keywords(page_keywords, 1).first() {
        Some(top) => sanitize_label(top, LABEL_LIMIT),
        None => sanitize_label(title, LABEL_LIMIT),
    }
}

/// Render the mind map as Mermaid `mindmap` text.
pub fn build_mermaid_mindmap(
    root_label: &str,
    page_keywords: &[Vec<String>],
    branches: usize,
    related_per_branch: usize,
) -> String {
    let mut lines = vec![
        "mindmap".to_string(),
        format!("  root){}(", sanitize_label(root_label, LABEL_LIMIT)),
    ];
    for keyword in top_keywords(page_keywords, branches) {
        lines.push(format!("    {}", sanitize_label(&keyword, LABEL_LIMIT)));
        for leaf in related_keywords(&keyword, page_keywords, related_per_branch) {
            lines.push(format!("      {}", sanitize_label(&leaf, LABEL_LIMIT)));
        }
    }
    lines.join("\n")
}

/// Keywords by the number of pages listing them, ties in first-seen order.
fn top_keywords(page_keywords: &[Vec<String>], top_k: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let terms = page_keywords
        .iter()
        .flatten()
        .map(|kw| kw.trim())
        .filter(|kw| !kw.is_empty());
    for (pos, kw) in terms.enumerate() {
        counts.entry(kw).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(kw, (count, first))| (kw, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(top_k)
        .map(|(kw, ..)| kw.to_string())
        .collect()
}

/// Other keywords of the pages that list `focus`, deduplicated.
fn related_keywords(focus: &str, page_keywords: &[Vec<String>], max_items: usize) -> Vec<String> {
    let focus_lower = focus.to_lowercase();
    let mut seen = HashSet::new();
    let mut related = Vec::new();

    for kws in page_keywords {
        if !kws.iter().any(|kw| kw.trim().to_lowercase() == focus_lower) {
            continue;
        }
        for kw in kws.iter().map(|kw| kw.trim()).filter(|kw| !kw.is_empty()) {
            let lower = kw.to_lowercase();
            if lower == focus_lower || !seen.insert(lower) {
                continue;
            }
            related.push(kw.to_string());
            if related.len() >= max_items {
                return related;
            }
        }
    }
    related
}

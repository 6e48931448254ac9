//! Post-processing: enforce the output shape the model is asked for but not
//! guaranteed to produce.
//!
//! The model may return bullets that are too long, too short, numbered,
//! already cited, or littered with ellipses. Every rule here is a small pure
//! function so each can be tested on its own and the engine simply chains
//! them:
//!
//! 1. Strip ellipses (`..`, `…`) and leading list markers or echoed citations
//! 2. Fit the text into a [`LengthBand`]: pad below `min`, truncate above `max`
//! 3. Prefix the page citation `〔p.N〕• `
//!
//! The fallback path derives bullets from the raw page text and never fails.

use crate::config::LengthBand;
use once_cell::sync::Lazy;
use regex::Regex;

/// Page summaries keep at most this many bullets.
pub const MAX_PAGE_BULLETS: usize = 5;
/// Fewer usable model bullets than this triggers the local fallback.
pub const MIN_PAGE_BULLETS: usize = 3;
/// The fallback emits at most this many chunks.
pub const MAX_FALLBACK_BULLETS: usize = 4;
/// Global overview bounds.
pub const MIN_OVERVIEW_BULLETS: usize = 5;
pub const MAX_OVERVIEW_BULLETS: usize = 7;

/// Appended until a too-short bullet reaches the band minimum.
pub const PAD_FILLER: &str = "（詳見原文）";
/// Sole fallback bullet for a page with no usable text.
pub const CONTENT_TOO_SHORT: &str = "無法解析頁面內容（內容過短）";
/// Pads a global overview that came back with fewer than five bullets.
pub const OVERVIEW_PLACEHOLDER: &str = "（待補要點）";
/// Stands in for an expansion paragraph the model did not return.
pub const EXPANSION_PLACEHOLDER: &str = "（待補充）";
/// Used when a skipped page somehow carries no reason.
pub const DEFAULT_SKIP_REASON: &str = "〈本頁跳過〉";

/// How far back (in chars) truncation may move to reach a word boundary.
const WORD_BACKOFF_WINDOW: usize = 15;

// ── Rule 1: Strip ellipses and leading markers ──────────────────────────────

static RE_ELLIPSIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}|…+|⋯+").unwrap());
static RE_LEADING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:〔p\.\d+〕\s*)?(?:[-*•·●▪]+|\d{1,2}[.)、])?\s*").unwrap()
});

/// Remove ellipsis runs anywhere in the text.
pub fn strip_ellipsis(text: &str) -> String {
    RE_ELLIPSIS.replace_all(text, "").trim().to_string()
}

/// Remove ellipses, a leading list marker, and an echoed page citation.
pub fn clean_bullet_text(text: &str) -> String {
    let s = strip_ellipsis(text);
    RE_LEADING_MARKER.replace(&s, "").trim().to_string()
}

// ── Rule 2: Fit into a length band ──────────────────────────────────────────

/// Cut `text` to at most `limit` chars, ending with a closing mark.
///
/// Keeps `limit - 1` chars, backing off to a word boundary when the cut would
/// split a space-separated word, then appends `。` (or `.` after ASCII).
pub fn truncate_with_mark(text: &str, limit: usize) -> String {
    let stripped = text.trim();
    if stripped.chars().count() <= limit {
        return stripped.to_string();
    }

    let keep = limit.saturating_sub(1);
    let mut cut: String = stripped.chars().take(keep).collect();

    let splits_word = stripped
        .chars()
        .nth(keep)
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && cut.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if splits_word {
        if let Some(pos) = cut.rfind(char::is_whitespace) {
            if pos > 0 && cut[pos..].chars().count() <= WORD_BACKOFF_WINDOW {
                cut.truncate(pos);
            }
        }
    }

    let body = cut.trim_end_matches(|c: char| c.is_whitespace() || "，、,;；:：.。".contains(c));
    let mark = match body.chars().last() {
        Some(c) if c.is_ascii() => '.',
        _ => '。',
    };
    format!("{body}{mark}")
}

/// Append [`PAD_FILLER`] until the text reaches `min` chars.
pub fn pad_to_min(text: &str, min: usize) -> String {
    let mut out = text.trim().to_string();
    while out.chars().count() < min {
        out.push_str(PAD_FILLER);
    }
    out
}

/// Pad to the band minimum, then truncate to the band maximum.
pub fn fit_band(text: &str, band: LengthBand) -> String {
    truncate_with_mark(&pad_to_min(text, band.min), band.max)
}

// ── Rule 3: Citation prefix ─────────────────────────────────────────────────

/// Prefix a bullet with its page citation.
pub fn cite(page_number: usize, text: &str) -> String {
    format!("〔p.{page_number}〕• {}", text.trim())
}

/// The citation token every bullet of page `page_number` starts with.
pub fn citation_token(page_number: usize) -> String {
    format!("〔p.{page_number}〕•")
}

// ── Composite shapers ───────────────────────────────────────────────────────

/// Clean, fit, and cite the model's bullets, keeping at most five.
///
/// The caller decides whether the result is long enough to keep.
pub fn shape_model_bullets(page_number: usize, raw: &[String], band: LengthBand) -> Vec<String> {
    raw.iter()
        .map(|b| clean_bullet_text(b))
        .filter(|b| !b.is_empty())
        .take(MAX_PAGE_BULLETS)
        .map(|b| cite(page_number, &fit_band(&b, band)))
        .collect()
}

/// The single bullet of a page that bypassed the LLM.
pub fn skip_bullet(page_number: usize, reason: Option<&str>, band: LengthBand) -> String {
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_SKIP_REASON);
    cite(page_number, &fit_band(reason, band))
}

/// Derive bullets from the page text alone.
///
/// Non-empty lines are concatenated greedily until a chunk reaches the band
/// minimum; at most [`MAX_FALLBACK_BULLETS`] chunks are kept. A trailing
/// short chunk is kept (and padded). Always returns at least one bullet.
pub fn fallback_bullets(page_number: usize, text: &str, band: LengthBand) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in text.lines().map(strip_ellipsis).filter(|l| !l.is_empty()) {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&line);
        if current.chars().count() >= band.min {
            chunks.push(std::mem::take(&mut current));
            if chunks.len() == MAX_FALLBACK_BULLETS {
                break;
            }
        }
    }
    if !current.is_empty() && chunks.len() < MAX_FALLBACK_BULLETS {
        chunks.push(current);
    }

    if chunks.is_empty() {
        return vec![cite(page_number, &fit_band(CONTENT_TOO_SHORT, band))];
    }
    chunks
        .iter()
        .map(|chunk| cite(page_number, &fit_band(chunk, band)))
        .collect()
}

/// Clean and fit overview bullets: at most seven, padded to five.
pub fn shape_overview(raw: &[String], band: LengthBand) -> Vec<String> {
    let mut bullets: Vec<String> = raw
        .iter()
        .map(|b| clean_bullet_text(b))
        .filter(|b| !b.is_empty())
        .take(MAX_OVERVIEW_BULLETS)
        .map(|b| fit_band(&b, band))
        .collect();
    while bullets.len() < MIN_OVERVIEW_BULLETS {
        bullets.push(OVERVIEW_PLACEHOLDER.to_string());
    }
    bullets
}

/// Fit one expansion paragraph; a missing one becomes the placeholder.
pub fn shape_expansion(raw: Option<&str>, band: LengthBand) -> String {
    let text = raw.map(strip_ellipsis).unwrap_or_default();
    if text.is_empty() {
        fit_band(EXPANSION_PLACEHOLDER, band)
    } else {
        fit_band(&text, band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAND: LengthBand = LengthBand::new(6, 40);

    #[test]
    fn truncates_200_chars_to_119_plus_mark() {
        let input: String = "測".repeat(200);
        let out = truncate_with_mark(&input, 120);
        assert_eq!(out.chars().count(), 120);
        assert!(out.starts_with(&"測".repeat(119)));
        assert!(out.ends_with('。'));
    }

    #[test]
    fn ascii_truncation_uses_period() {
        let input = "x".repeat(200);
        let out = truncate_with_mark(&input, 120);
        assert_eq!(out.chars().count(), 120);
        assert!(out.ends_with('.'));
    }

    #[test]
    fn truncation_backs_off_to_word_boundary() {
        let out = truncate_with_mark("Revenue grew strongly across all regions", 20);
        assert_eq!(out, "Revenue grew.");
    }

    #[test]
    fn short_text_untouched_by_truncation() {
        assert_eq!(truncate_with_mark("  營收成長  ", 10), "營收成長");
    }

    #[test]
    fn truncation_never_doubles_the_mark() {
        let out = truncate_with_mark("Acme Holdings Inc. and partners", 19);
        assert_eq!(out, "Acme Holdings Inc.");
        assert!(!out.contains(".."));

        let out = truncate_with_mark("營收成長。毛利持平", 6);
        assert_eq!(out, "營收成長。");
    }

    #[test]
    fn strip_ellipsis_removes_runs() {
        assert_eq!(strip_ellipsis("成長……持續...中"), "成長持續中");
    }

    #[test]
    fn clean_bullet_drops_markers_and_citations() {
        assert_eq!(clean_bullet_text("1. 營收成長"), "營收成長");
        assert_eq!(clean_bullet_text("〔p.3〕• 毛利下滑"), "毛利下滑");
        assert_eq!(clean_bullet_text("- cost down"), "cost down");
        assert_eq!(clean_bullet_text("2024 revenue up"), "2024 revenue up");
    }

    #[test]
    fn pad_reaches_minimum() {
        let out = fit_band("短", BAND);
        assert!(out.chars().count() >= BAND.min);
        assert!(out.starts_with('短'));
    }

    #[test]
    fn cite_formats_token() {
        assert_eq!(cite(3, "毛利率提升"), "〔p.3〕• 毛利率提升");
        assert!(cite(12, "x").starts_with(&citation_token(12)));
    }

    #[test]
    fn model_bullets_capped_at_five() {
        let raw: Vec<String> = (1..=8).map(|i| format!("第{i}項重點內容說明")).collect();
        let out = shape_model_bullets(4, &raw, BAND);
        assert_eq!(out.len(), MAX_PAGE_BULLETS);
        assert!(out.iter().all(|b| b.starts_with("〔p.4〕•")));
    }

    #[test]
    fn model_bullets_drop_empty_entries() {
        let raw = vec!["".to_string(), "……".to_string(), "有效的要點內容".to_string()];
        assert_eq!(shape_model_bullets(1, &raw, BAND).len(), 1);
    }

    #[test]
    fn fallback_never_empty_for_empty_text() {
        let out = fallback_bullets(9, "", BAND);
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("〔p.9〕•"));
        assert!(out[0].contains("內容過短"));
    }

    #[test]
    fn fallback_chunks_lines_greedily() {
        let text = "第一行\n第二行內容\n第三行比較長的內容\n短\n另一段落文字";
        let out = fallback_bullets(2, text, BAND);
        assert_eq!(out[0], "〔p.2〕• 第一行 第二行內容");
        assert!(out.len() <= MAX_FALLBACK_BULLETS);
        assert!(out.iter().all(|b| b.starts_with("〔p.2〕•")));
    }

    #[test]
    fn fallback_caps_at_four_chunks() {
        let text = (0..20)
            .map(|i| format!("這是第 {i} 行足夠長的內容"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(fallback_bullets(1, &text, BAND).len(), MAX_FALLBACK_BULLETS);
    }

    #[test]
    fn skip_bullet_uses_reason_verbatim() {
        let out = skip_bullet(2, Some("〈本頁跳過（空白/水印）〉"), BAND);
        assert_eq!(out, "〔p.2〕• 〈本頁跳過（空白/水印）〉");
        let default = skip_bullet(2, None, BAND);
        assert!(default.contains(DEFAULT_SKIP_REASON));
    }

    #[test]
    fn overview_padded_to_five_and_capped_at_seven() {
        let few = vec!["營收創新高".to_string(), "成本下降一成".to_string()];
        let out = shape_overview(&few, LengthBand::new(2, 35));
        assert_eq!(out.len(), MIN_OVERVIEW_BULLETS);
        assert_eq!(out[4], OVERVIEW_PLACEHOLDER);

        let many: Vec<String> = (0..12).map(|i| format!("結論 {i}")).collect();
        assert_eq!(shape_overview(&many, LengthBand::new(2, 35)).len(), MAX_OVERVIEW_BULLETS);
    }

    #[test]
    fn missing_expansion_becomes_placeholder() {
        let out = shape_expansion(None, LengthBand::new(4, 120));
        assert!(out.starts_with(EXPANSION_PLACEHOLDER));
        let long = "甲".repeat(300);
        assert_eq!(shape_expansion(Some(&long), LengthBand::new(4, 120)).chars().count(), 120);
    }
}

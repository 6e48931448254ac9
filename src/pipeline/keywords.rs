//! Frequency-ranked keywords per page.
//!
//! Tokens come from three kinds of runs:
//!
//! * Latin words (`[A-Za-z][A-Za-z'-]+`), lowercased
//! * Han text, split into overlapping two-character terms since CJK prose
//!   carries no word separators; a two-character run is taken whole
//! * Katakana and Hangul runs of two or more characters, taken whole
//!
//! Stop words are dropped, then terms are ranked by count with ties broken
//! by first appearance, so the output is deterministic.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Default number of keywords kept per page.
pub const DEFAULT_TOP_K: usize = 8;

static RE_LATIN_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z'\-]+").unwrap());
static RE_CJK_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\p{Han}{2,}|[\p{Katakana}ー]{2,}|\p{Hangul}{2,}").unwrap()
});

static EN_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "an", "of", "to", "in", "and", "is", "are", "for", "on", "with", "as", "by",
        "this", "that", "be", "or", "it", "from", "at", "than", "into", "about", "can", "will",
        "not", "no", "yes", "we", "you", "your", "our", "their", "they", "them", "its", "these",
        "those", "more", "most", "such", "via", "per", "me", "my", "us", "him", "his", "her",
        "hers", "who", "whom", "whose", "which", "what", "when", "where", "why", "how", "any",
        "some", "none", "both", "each", "either", "neither", "another", "other", "others",
        "all", "few", "many", "much", "several", "less", "least", "enough", "own", "do",
        "does", "did", "done", "am", "was", "were", "been", "being", "have", "has", "had",
        "would", "should", "could", "might", "must", "shall", "may", "also", "too", "very",
        "just", "only", "even", "ever", "never", "always", "often", "already", "still", "yet",
        "again", "though", "although", "however", "therefore", "thus", "because", "since",
        "so", "if", "then", "unless", "until", "while", "whether", "every", "between", "among",
        "across", "through", "within", "without", "under", "over", "above", "below", "before",
        "after", "around", "near", "against", "upon", "off", "out", "up", "down", "back",
        "here", "there", "please", "etc", "eg", "ie", "vs", "ok",
    ]
    .into_iter()
    .collect()
});

/// Whole CJK terms that carry no topic.
static CJK_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "我們", "你們", "他們", "它們", "她們", "這些", "那些", "這個", "那個", "因為", "所以",
        "因此", "然而", "但是", "如果", "而且", "並且", "或者", "以及", "雖然", "即使", "此外",
        "另外", "其中", "目前", "現在", "以上", "以下", "之前", "之後", "例如", "比如", "關於",
        "對於", "根據", "依照", "按照", "部分", "許多", "一些", "如下", "參考", "附錄", "備註",
    ]
    .into_iter()
    .collect()
});

/// Function characters; a two-character term containing one is dropped.
const CJK_STOP_CHARS: &str =
    "的了是在和與与及並并也就還而被把於对對由或之其各每這这那個个我你他她它們们嗎吗呢吧啊第頁页章節节";

/// The `top_k` most frequent keywords of `text`.
pub fn extract_keywords(text: &str, top_k: usize) -> Vec<String> {
    if top_k == 0 {
        return Vec::new();
    }

    // term -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, term) in tokenize(text).into_iter().enumerate() {
        counts.entry(term).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(term, (count, first))| (term, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(top_k).map(|(term, ..)| term).collect()
}

/// Split text into candidate terms, in reading order, stop words removed.
fn tokenize(text: &str) -> Vec<String> {
    let mut spans: Vec<(usize, Vec<String>)> = Vec::new();

    for m in RE_LATIN_WORD.find_iter(text) {
        let word = m.as_str().trim_matches(|c: char| c == '\'' || c == '-').to_lowercase();
        if word.chars().count() > 1 && !EN_STOP_WORDS.contains(word.as_str()) {
            spans.push((m.start(), vec![word]));
        }
    }

    for m in RE_CJK_RUN.find_iter(text) {
        let run: Vec<char> = m.as_str().chars().collect();
        let han_run = run.first().is_some_and(|c| is_han(*c));
        let terms: Vec<String> = if han_run && run.len() > 2 {
            run.windows(2).map(|w| w.iter().collect()).collect()
        } else {
            vec![m.as_str().to_string()]
        };
        let kept: Vec<String> = terms.into_iter().filter(|t| !is_cjk_stop(t)).collect();
        spans.push((m.start(), kept));
    }

    spans.sort_by_key(|(start, _)| *start);
    spans.into_iter().flat_map(|(_, terms)| terms).collect()
}

fn is_han(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

fn is_cjk_stop(term: &str) -> bool {
    CJK_STOP_WORDS.contains(term) || term.chars().any(|c| CJK_STOP_CHARS.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_terms_ranked_by_frequency() {
        let text = "Revenue grew. Revenue margins and the revenue outlook; margins improved.";
        assert_eq!(extract_keywords(text, 3), vec!["revenue", "margins", "grew"]);
    }

    #[test]
    fn chinese_text_yields_two_character_terms() {
        let text = "本季營收較去年同期成長\n營收成長來自海外市場";
        assert_eq!(extract_keywords(text, 3), vec!["營收", "成長", "本季"]);
    }

    #[test]
    fn function_characters_are_filtered() {
        let keywords = extract_keywords("我們的產品", 10);
        assert!(keywords.iter().all(|k| !k.contains('的')), "{keywords:?}");
        assert!(!keywords.contains(&"我們".to_string()));
        assert!(keywords.contains(&"產品".to_string()));
    }

    #[test]
    fn katakana_and_hangul_runs_are_whole_terms() {
        let keywords = extract_keywords("サーバー の 設定 / 서버 설정 서버", 5);
        assert_eq!(keywords[0], "서버");
        assert!(keywords.contains(&"サーバー".to_string()));
    }

    #[test]
    fn single_letters_and_stop_words_dropped() {
        assert!(extract_keywords("a I the of and 1 2 3", 8).is_empty());
    }

    #[test]
    fn top_k_zero_disables() {
        assert!(extract_keywords("revenue revenue", 0).is_empty());
    }
}

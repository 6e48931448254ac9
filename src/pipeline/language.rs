//! Script-count language detection for response metadata.
//!
//! The tag never steers summarization; prompts are fixed. A cheap character
//! census over the head of the document is enough.

/// Only the head of the document is sampled.
const SAMPLE_CHARS: usize = 5000;

#[derive(Debug, Default)]
struct ScriptCounts {
    letters: usize,
    han: usize,
    kana: usize,
    hangul: usize,
}

fn census(sample: impl Iterator<Item = char>) -> ScriptCounts {
    let mut counts = ScriptCounts::default();
    for c in sample {
        match c as u32 {
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => counts.han += 1,
            0x3040..=0x30FF => counts.kana += 1,
            0xAC00..=0xD7A3 | 0x1100..=0x11FF | 0x3130..=0x318F => counts.hangul += 1,
            _ => {}
        }
        if c.is_alphabetic() {
            counts.letters += 1;
        }
    }
    counts
}

/// Detect the dominant language: `zh`, `ja`, `ko` or `en`.
pub fn detect_language(text: &str) -> String {
    let counts = census(
        text.chars()
            .take(SAMPLE_CHARS)
            .filter(|c| !c.is_control()),
    );
    let letters = counts.letters;

    let tag = if letters == 0 {
        "en"
    } else if counts.kana >= 5 && counts.kana * 10 >= letters {
        "ja"
    } else if counts.hangul > 0 && counts.han < counts.hangul * 4 && counts.hangul * 5 >= letters {
        "ko"
    } else if counts.han * 5 >= letters {
        "zh"
    } else {
        "en"
    };
    tag.to_string()
}

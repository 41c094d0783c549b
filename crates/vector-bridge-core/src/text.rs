//! Text quality filter and display cleanup.
//!
//! Passages in the index come from PDF extraction and carry typical
//! extraction damage: characters stacked vertically by broken table
//! layouts, syllables split apart by spaces, and words repeated by
//! overlapping text runs. [`is_noise`] rejects passages that are mostly
//! garbage; [`clean_for_display`] repairs the rest before they are shown.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Thresholds for [`is_noise`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseThresholds {
    /// Passages shorter than this many characters (after trimming) are noise.
    pub min_chars: usize,
    /// Passages whose share of single-syllable tokens exceeds this are noise.
    pub max_single_char_ratio: f64,
}

impl Default for NoiseThresholds {
    fn default() -> Self {
        Self {
            min_chars: 25,
            max_single_char_ratio: 0.30,
        }
    }
}

/// True for a precomposed Hangul syllable (U+AC00..=U+D7A3).
pub fn is_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Decide whether extracted passage text is unusable.
///
/// Empty and short passages are noise, as are passages where too many
/// whitespace-separated tokens are a lone syllable (the signature of
/// extraction that split every character apart).
pub fn is_noise(text: &str, thresholds: &NoiseThresholds) -> bool {
    let t = text.trim();
    if t.is_empty() || t.chars().count() < thresholds.min_chars {
        return true;
    }

    let mut total = 0usize;
    let mut singles = 0usize;
    for token in t.split_whitespace() {
        total += 1;
        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if is_syllable(c) {
                singles += 1;
            }
        }
    }
    if total == 0 {
        return true;
    }

    singles as f64 / total as f64 > thresholds.max_single_char_ratio
}

/// Canonicalize query text: NFC normalization, whitespace runs collapsed
/// to one space, and surrounding whitespace trimmed.
pub fn normalize_query(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

static VERTICAL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*[가-힣A-Za-z]\*\*(?:<br>|\n)+").expect("valid regex"));

static CHOPPED_3: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[가-힣]\b(?:\s+\b[가-힣]\b){2}").expect("valid regex")
});

static CHOPPED_2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[가-힣]\b\s+\b[가-힣]\b").expect("valid regex"));

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[가-힣A-Za-z]{2,}\b").expect("valid regex"));

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Clean retrieved passage text for display.
///
/// Applies, in order: removal of emphasis-wrapped characters stacked with
/// line breaks, rejoining of 3- then 2-syllable runs split by spaces,
/// collapsing of immediately repeated words, and whitespace collapsing.
/// The passes repeat until the text stops changing, so the function is
/// idempotent: `clean_for_display(clean_for_display(s)) == clean_for_display(s)`.
pub fn clean_for_display(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = clean_once(&current);
        // every pass only ever removes characters
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_once(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let s = VERTICAL_TOKEN.replace_all(text, "");
    let s = join_chopped_syllables(&s);
    let s = collapse_repeated_words(&s);
    MULTI_SPACE.replace_all(&s, " ").trim().to_string()
}

fn join_chopped_syllables(text: &str) -> String {
    let strip = |caps: &regex::Captures<'_>| -> String {
        caps[0].chars().filter(|c| !c.is_whitespace()).collect()
    };
    let s = CHOPPED_3.replace_all(text, strip);
    CHOPPED_2.replace_all(&s, strip).into_owned()
}

/// Drop every word that repeats the word right before it, when only
/// whitespace separates the two.
fn collapse_repeated_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut prev: Option<(usize, &str)> = None; // (end offset, word)

    for m in WORD.find_iter(text) {
        if let Some((prev_end, prev_word)) = prev {
            let gap = &text[prev_end..m.start()];
            if prev_word == m.as_str() && !gap.is_empty() && gap.chars().all(char::is_whitespace) {
                // skip the gap and the duplicate, keep comparing against the kept word
                out.push_str(&text[cursor..prev_end]);
                cursor = m.end();
                prev = Some((m.end(), prev_word));
                continue;
            }
        }
        prev = Some((m.end(), m.as_str()));
    }
    out.push_str(&text[cursor..]);
    out
}

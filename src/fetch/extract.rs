//! Text extraction from raw reference extracts.

const DEFINITION_MAX_CHARS: usize = 240;
const SENTENCE_TERMINATORS: [char; 4] = ['。', '.', '!', '?'];
const EXAMPLE_MAX_WORDS: usize = 30;
/// Han text packs far more meaning per character than space-separated scripts.
const DENSE_SCRIPT_MAX_CHARS: usize = 40;

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Leading sentence of `text`, without its terminator, capped at 240 characters.
///
/// The first character never counts as a terminator, so a segment is never empty
/// unless the input is.
pub fn extract_sentence(text: &str) -> String {
    let normalized = normalize_text(text);
    let sentence: String = normalized
        .chars()
        .enumerate()
        .take_while(|(i, c)| *i == 0 || !SENTENCE_TERMINATORS.contains(c))
        .take(DEFINITION_MAX_CHARS)
        .map(|(_, c)| c)
        .collect();
    sentence.trim().to_string()
}

/// Short example phrase: the first 30 words, and at most 40 characters for Chinese.
pub fn extract_example(text: &str, lang: &str) -> String {
    let normalized = normalize_text(text);
    let candidate = normalized
        .split(' ')
        .take(EXAMPLE_MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    if is_dense_script(lang) {
        candidate.chars().take(DENSE_SCRIPT_MAX_CHARS).collect()
    } else {
        candidate
    }
}

fn is_dense_script(lang: &str) -> bool {
    lang.split('-')
        .next()
        .is_some_and(|primary| primary.eq_ignore_ascii_case("zh"))
}

use once_cell::sync::Lazy;
use regex::Regex;

// ASCII word class on purpose: accented letters are stripped along with punctuation.
static NON_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9_\s]").expect("static pattern")
});

/// Lowercases `text` and removes every character that is neither an ASCII
/// word character nor whitespace. "Convert-IA" becomes "convertia".
pub fn normalize(text: &str) -> String {
    NON_WORD.replace_all(&text.to_lowercase(), "").into_owned()
}

pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

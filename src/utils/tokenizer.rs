use regex::Regex;
use std::sync::OnceLock;

/// Maximum token length to store in the index.
/// Longer runs are almost always hashes, base64 or URLs glued together.
const MAX_TOKEN_LENGTH: usize = 64;

/// Turns document or query text into an ordered token sequence.
///
/// Implementations must be deterministic: the same text always yields the
/// same tokens, since query terms are looked up with the tokenizer that built
/// the index.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("valid regex"))
}

/// Lowercases and splits on anything that is not an ASCII letter or digit
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTokenizer;

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        word_regex()
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|t| t.len() <= MAX_TOKEN_LENGTH)
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokenize() {
        let tokens = SimpleTokenizer.tokenize("Cat, dog!  BIRD-42");
        assert_eq!(tokens, vec!["cat", "dog", "bird", "42"]);
    }

    #[test]
    fn test_order_and_duplicates_preserved() {
        let tokens = SimpleTokenizer.tokenize("a b a");
        assert_eq!(tokens, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_long_tokens_dropped() {
        let long = "x".repeat(MAX_TOKEN_LENGTH + 1);
        let tokens = SimpleTokenizer.tokenize(&format!("keep {long}"));
        assert_eq!(tokens, vec!["keep"]);
    }

    #[test]
    fn test_punctuation_only() {
        assert!(SimpleTokenizer.tokenize("... --- !!!").is_empty());
    }
}

//! # Text Normalizer
//!
//! Deterministic cleaning applied to every record before encoding. The
//! training transformation stage and the inference service both hold a
//! `TextNormalizer`, so the two paths can never drift apart.

use std::collections::HashSet;

use regex::Regex;

use crate::error::Result;
use crate::text::stopwords::ENGLISH_STOPWORDS;

/// Canonicalizes raw text into a space-separated sequence of content words.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    re_bracketed: Regex,
    re_url: Regex,
    re_html: Regex,
    re_mention: Regex,
    re_punct: Regex,
    re_newline: Regex,
    re_digit_word: Regex,
    stopwords: HashSet<&'static str>,
}

impl TextNormalizer {
    /// Constructs a normalizer with pre-compiled patterns.
    ///
    /// # Errors
    ///
    /// Returns `HatewatchError::RegexError` if any pattern fails to compile
    /// (should never happen with the static patterns defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_bracketed: Regex::new(r"\[.*?\]")?,
            re_url: Regex::new(r"https?://\S+|www\.\S+")?,
            re_html: Regex::new(r"<.*?>+")?,
            re_mention: Regex::new(r"@\w+")?,
            re_punct: Regex::new(r"[[:punct:]]")?,
            re_newline: Regex::new(r"[\r\n]+")?,
            re_digit_word: Regex::new(r"\w*\d\w*")?,
            stopwords: ENGLISH_STOPWORDS.iter().copied().collect(),
        })
    }

    /// Normalize a single text.
    ///
    /// Steps, in order: lowercase, drop `[...]` spans, URLs, HTML tags,
    /// `@mentions`, ASCII punctuation, newlines, words containing digits and
    /// stop words, then collapse whitespace. The result may be empty.
    ///
    /// # Examples
    /// ```
    /// use hatewatch_core::text::TextNormalizer;
    ///
    /// let normalizer = TextNormalizer::new().unwrap();
    /// let cleaned = normalizer.normalize("RT @user: You are SO stupid!!! http://t.co/x1");
    /// assert_eq!(cleaned, "rt stupid");
    /// ```
    pub fn normalize(&self, text: &str) -> String {
        let text = text.to_lowercase();
        let text = self.re_bracketed.replace_all(&text, "");
        let text = self.re_url.replace_all(&text, "");
        let text = self.re_html.replace_all(&text, "");
        let text = self.re_mention.replace_all(&text, "");
        let text = self.re_punct.replace_all(&text, "");
        let text = self.re_newline.replace_all(&text, " ");
        let text = self.re_digit_word.replace_all(&text, "");

        text.split_whitespace()
            .filter(|word| !self.stopwords.contains(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn normalize_all<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        texts.into_iter().map(|text| self.normalize(text)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new().unwrap()
    }

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        assert_eq!(normalizer().normalize("Hello, WORLD!"), "hello world");
    }

    #[test]
    fn test_strips_urls_mentions_and_html() {
        let cleaned = normalizer()
            .normalize("@bob look <b>here</b> https://example.com/a?b=1 www.spam.org now");
        assert_eq!(cleaned, "look");
    }

    #[test]
    fn test_strips_bracketed_spans() {
        assert_eq!(normalizer().normalize("[removed] trash talk"), "trash talk");
    }

    #[test]
    fn test_drops_words_with_digits() {
        assert_eq!(normalizer().normalize("abc123 fine 2day ok"), "fine ok");
    }

    #[test]
    fn test_newlines_separate_words() {
        assert_eq!(normalizer().normalize("first\nsecond\r\nthird"), "first second third");
    }

    #[test]
    fn test_removes_stopwords() {
        assert_eq!(normalizer().normalize("you are the worst"), "worst");
    }

    #[test]
    fn test_may_produce_empty_string() {
        assert_eq!(normalizer().normalize("!!! @someone 123"), "");
        assert_eq!(normalizer().normalize(""), "");
    }

    #[test]
    fn test_is_deterministic() {
        let n = normalizer();
        let input = "RT @x: Some &amp; TEXT\nwith http://a.b stuff";
        assert_eq!(n.normalize(input), n.normalize(input));
        assert_eq!(n.normalize(input), n.clone().normalize(input));
    }

    #[test]
    fn test_normalize_all_keeps_alignment() {
        let cleaned = normalizer().normalize_all(["good day", "!!!", "bad day"]);
        assert_eq!(cleaned, vec!["good day", "", "bad day"]);
    }
}

//! # Sequence Encoder
//!
//! Word-level tokenizer that turns normalized text into fixed-length id
//! vectors. Backed by a HuggingFace `tokenizers` word-level model so the
//! vocabulary, padding and truncation settings persist together in one
//! `tokenizer.json`.

use std::collections::HashMap;
use std::path::Path;

use tokenizers::models::ModelWrapper;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer as HfTokenizer,
    TruncationDirection, TruncationParams,
};

use crate::config::EncoderConfig;
use crate::error::{HatewatchError, Result};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

/// Reversible text → fixed-length id vector encoder with a fitted vocabulary.
#[derive(Clone)]
pub struct SequenceEncoder {
    inner: HfTokenizer,
    max_len: usize,
}

impl std::fmt::Debug for SequenceEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceEncoder")
            .field("vocab_size", &self.vocab_size())
            .field("max_len", &self.max_len)
            .finish()
    }
}

impl SequenceEncoder {
    /// Fit a vocabulary on already-normalized texts.
    ///
    /// Words are ranked by frequency, ties broken lexicographically, and the
    /// vocabulary is capped at `config.max_words` entries including `[PAD]`
    /// (id 0) and `[UNK]` (id 1).
    pub fn fit<'a>(
        texts: impl IntoIterator<Item = &'a str>,
        config: &EncoderConfig,
    ) -> Result<Self> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for text in texts {
            for word in text.split_whitespace() {
                *counts.entry(word).or_default() += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|(word, _)| *word != PAD_TOKEN && *word != UNK_TOKEN)
            .collect();
        ranked.sort_by(|(a_word, a_count), (b_word, b_count)| {
            b_count.cmp(a_count).then_with(|| a_word.cmp(b_word))
        });

        let capacity = config.max_words.saturating_sub(2);
        let mut vocab: HashMap<String, u32> = HashMap::with_capacity(capacity + 2);
        vocab.insert(PAD_TOKEN.to_string(), PAD_ID);
        vocab.insert(UNK_TOKEN.to_string(), UNK_ID);
        for (offset, (word, _)) in ranked.into_iter().take(capacity).enumerate() {
            vocab.insert(word.to_string(), offset as u32 + 2);
        }

        Self::from_vocab(vocab, config.max_len)
    }

    /// Build an encoder from an explicit word → id map.
    pub fn from_vocab(vocab: HashMap<String, u32>, max_len: usize) -> Result<Self> {
        if max_len == 0 {
            return Err(HatewatchError::Config {
                reason: "encoder max_len must be positive".into(),
            });
        }
        if vocab.get(PAD_TOKEN) != Some(&PAD_ID) || vocab.get(UNK_TOKEN) != Some(&UNK_ID) {
            return Err(HatewatchError::Tokenizer(format!(
                "vocabulary must map {PAD_TOKEN} to {PAD_ID} and {UNK_TOKEN} to {UNK_ID}"
            )));
        }

        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token(UNK_TOKEN.to_string())
            .build()
            .map_err(|e| HatewatchError::Tokenizer(e.to_string()))?;

        let mut inner = HfTokenizer::new(ModelWrapper::WordLevel(model));
        inner.with_pre_tokenizer(PreTokenizerWrapper::WhitespaceSplit(WhitespaceSplit));
        inner
            .with_truncation(Some(TruncationParams {
                direction: TruncationDirection::Left,
                max_length: max_len,
                ..Default::default()
            }))
            .map_err(|e| HatewatchError::Tokenizer(e.to_string()))?;
        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(max_len),
            direction: PaddingDirection::Left,
            pad_id: PAD_ID,
            pad_token: PAD_TOKEN.to_string(),
            ..Default::default()
        }));

        Ok(Self { inner, max_len })
    }

    /// Load a persisted `tokenizer.json` unchanged.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = HfTokenizer::from_file(path).map_err(|e| {
            HatewatchError::Tokenizer(format!("failed to load {}: {e}", path.display()))
        })?;

        let max_len = match inner.get_padding().map(|p| &p.strategy) {
            Some(PaddingStrategy::Fixed(len)) => *len,
            _ => {
                return Err(HatewatchError::Tokenizer(format!(
                    "{} has no fixed-length padding",
                    path.display()
                )));
            }
        };

        Ok(Self { inner, max_len })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.inner.save(path, true).map_err(|e| {
            HatewatchError::Tokenizer(format!("failed to save {}: {e}", path.display()))
        })
    }

    /// Encode one normalized text into exactly `max_len` ids.
    ///
    /// Short inputs are left-padded with [`PAD_ID`]; long inputs keep their
    /// last `max_len` words. Empty text encodes to all padding.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| HatewatchError::Tokenizer(e.to_string()))?;
        let ids = encoding.get_ids();
        if ids.len() != self.max_len {
            return Err(HatewatchError::Tokenizer(format!(
                "encoded length {} does not match max_len {}",
                ids.len(),
                self.max_len
            )));
        }
        Ok(ids.to_vec())
    }

    pub fn encode_all<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<u32>>> {
        texts.iter().map(|text| self.encode(text.as_ref())).collect()
    }

    pub fn token_id(&self, word: &str) -> Option<u32> {
        self.inner.token_to_id(word)
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_len: usize) -> EncoderConfig {
        EncoderConfig::default().with_max_len(max_len)
    }

    #[test]
    fn test_fit_ranks_by_frequency_then_word() {
        let encoder =
            SequenceEncoder::fit(["hate hate idiot", "sunny idiot hate", "apple"], &config(4))
                .unwrap();

        assert_eq!(encoder.token_id(PAD_TOKEN), Some(PAD_ID));
        assert_eq!(encoder.token_id(UNK_TOKEN), Some(UNK_ID));
        assert_eq!(encoder.token_id("hate"), Some(2));
        assert_eq!(encoder.token_id("idiot"), Some(3));
        assert_eq!(encoder.token_id("apple"), Some(4));
        assert_eq!(encoder.token_id("sunny"), Some(5));
        assert_eq!(encoder.vocab_size(), 6);
    }

    #[test]
    fn test_encode_left_pads() {
        let encoder = SequenceEncoder::fit(["good day"], &config(4)).unwrap();
        let ids = encoder.encode("good day").unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(&ids[..2], &[PAD_ID, PAD_ID]);
        assert_eq!(ids[2], encoder.token_id("good").unwrap());
        assert_eq!(ids[3], encoder.token_id("day").unwrap());
    }

    #[test]
    fn test_encode_keeps_last_words_when_truncating() {
        let encoder = SequenceEncoder::fit(["a b c d e"], &config(2)).unwrap();
        let ids = encoder.encode("a b c d e").unwrap();
        assert_eq!(
            ids,
            vec![encoder.token_id("d").unwrap(), encoder.token_id("e").unwrap()]
        );
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let encoder = SequenceEncoder::fit(["known"], &config(2)).unwrap();
        let ids = encoder.encode("mystery known").unwrap();
        assert_eq!(ids, vec![UNK_ID, encoder.token_id("known").unwrap()]);
    }

    #[test]
    fn test_empty_text_encodes_to_padding() {
        let encoder = SequenceEncoder::fit(["something"], &config(3)).unwrap();
        assert_eq!(encoder.encode("").unwrap(), vec![PAD_ID; 3]);
    }

    #[test]
    fn test_vocabulary_cap() {
        let cfg = config(3).with_max_words(3);
        let encoder = SequenceEncoder::fit(["x x y z"], &cfg).unwrap();
        assert_eq!(encoder.vocab_size(), 3);
        assert_eq!(encoder.token_id("x"), Some(2));
        assert_eq!(encoder.token_id("y"), None);
    }

    #[test]
    fn test_save_and_load_preserve_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");

        let encoder = SequenceEncoder::fit(["stupid idiot", "lovely day"], &config(5)).unwrap();
        encoder.save(&path).unwrap();
        let loaded = SequenceEncoder::load(&path).unwrap();

        assert_eq!(loaded.max_len(), 5);
        assert_eq!(loaded.vocab_size(), encoder.vocab_size());
        assert_eq!(
            loaded.encode("lovely idiot").unwrap(),
            encoder.encode("lovely idiot").unwrap()
        );
    }

    #[test]
    fn test_rejects_vocab_without_reserved_ids() {
        let vocab = HashMap::from([("word".to_string(), 0u32)]);
        assert!(SequenceEncoder::from_vocab(vocab, 4).is_err());
    }
}

//! Keyword predictor used to exercise the pipeline without numerical training.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};

use hatewatch_core::error::{HatewatchError, Result};
use hatewatch_core::model::{Predictor, PredictorBackend, TrainingReport};
use hatewatch_core::text::PAD_ID;
use serde::{Deserialize, Serialize};

/// Flags ids that only ever appear in abusive training rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordPredictor {
    vocab_size: usize,
    flagged: BTreeSet<u32>,
    #[serde(skip)]
    gate: Option<Arc<Barrier>>,
    #[serde(skip)]
    fail: bool,
}

impl KeywordPredictor {
    pub fn with_flagged(vocab_size: usize, flagged: impl IntoIterator<Item = u32>) -> Self {
        Self {
            vocab_size,
            flagged: flagged.into_iter().collect(),
            gate: None,
            fail: false,
        }
    }
}

impl Predictor for KeywordPredictor {
    fn fit(&mut self, inputs: &[Vec<u32>], labels: &[u8]) -> Result<TrainingReport> {
        if let Some(gate) = &self.gate {
            // signal that the fit started, then wait to be released
            gate.wait();
            gate.wait();
        }
        if self.fail {
            return Err(HatewatchError::Candle("fit refused".into()));
        }

        let mut positive = BTreeSet::new();
        let mut negative = BTreeSet::new();
        for (ids, &label) in inputs.iter().zip(labels) {
            let bucket = if label == 1 { &mut positive } else { &mut negative };
            bucket.extend(ids.iter().copied().filter(|&id| id != PAD_ID));
        }
        self.flagged = positive.difference(&negative).copied().collect();

        Ok(TrainingReport {
            epochs: 1,
            samples: inputs.len(),
            final_loss: 0.0,
        })
    }

    fn predict(&self, inputs: &[Vec<u32>]) -> Result<Vec<f32>> {
        Ok(inputs
            .iter()
            .map(|ids| {
                if ids.iter().any(|id| self.flagged.contains(id)) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect())
    }

    fn input_vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        fs::write(path, json)
            .map_err(|e| HatewatchError::io(format!("failed to write {}", path.display()), e))
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeywordBackend {
    gate: Option<Arc<Barrier>>,
    fail: bool,
}

impl KeywordBackend {
    /// Every `fit` rendezvous twice with the holder of `gate`.
    pub fn gated(gate: Arc<Barrier>) -> Self {
        Self {
            gate: Some(gate),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            gate: None,
            fail: true,
        }
    }
}

impl PredictorBackend for KeywordBackend {
    type Model = KeywordPredictor;

    fn create(&self, vocab_size: usize, _max_len: usize) -> Result<KeywordPredictor> {
        Ok(KeywordPredictor {
            vocab_size,
            flagged: BTreeSet::new(),
            gate: self.gate.clone(),
            fail: self.fail,
        })
    }

    fn load(&self, path: &Path) -> Result<KeywordPredictor> {
        let bytes = fs::read(path).map_err(|e| HatewatchError::corrupt(path, e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| HatewatchError::corrupt(path, e.to_string()))
    }
}

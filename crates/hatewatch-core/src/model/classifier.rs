//! # Candle Text Classifier
//!
//! Embedding → masked mean pooling → linear head → sigmoid. Padding ids are
//! excluded from the pooled average, so an all-padding input scores from the
//! head bias alone.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Embedding, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use oorandom::Rand64;
use safetensors::SafeTensors;
use tracing::{debug, info};

use crate::config::ClassifierConfig;
use crate::error::{HatewatchError, Result};
use crate::model::predictor::{Predictor, PredictorBackend, TrainingReport};
use crate::sampling;
use crate::text::PAD_ID;

const EMBEDDING_WEIGHT: &str = "embedding.weight";
const HEAD_WEIGHT: &str = "head.weight";
const HEAD_BIAS: &str = "head.bias";
const PREDICT_BATCH: usize = 256;

/// Trainable bag-of-embeddings binary classifier.
pub struct CandleClassifier {
    varmap: VarMap,
    embedding: Embedding,
    head: Linear,
    vocab_size: usize,
    config: ClassifierConfig,
    device: Device,
}

impl CandleClassifier {
    /// Build a classifier with seeded initial weights.
    pub fn new(vocab_size: usize, config: &ClassifierConfig, device: &Device) -> Result<Self> {
        let mut classifier = Self::build(vocab_size, config, device)?;
        classifier.seed_weights()?;
        Ok(classifier)
    }

    fn build(vocab_size: usize, config: &ClassifierConfig, device: &Device) -> Result<Self> {
        if vocab_size == 0 || config.embedding_dim == 0 {
            return Err(HatewatchError::Config {
                reason: "classifier needs a non-empty vocabulary and embedding".into(),
            });
        }
        if config.batch_size == 0 || config.epochs == 0 {
            return Err(HatewatchError::Config {
                reason: format!(
                    "classifier needs at least one epoch and a non-empty batch (epochs {}, batch size {})",
                    config.epochs, config.batch_size
                ),
            });
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let embedding = candle_nn::embedding(vocab_size, config.embedding_dim, vb.pp("embedding"))?;
        let head = candle_nn::linear(config.embedding_dim, 1, vb.pp("head"))?;

        Ok(Self {
            varmap,
            embedding,
            head,
            vocab_size,
            config: config.clone(),
            device: device.clone(),
        })
    }

    fn seed_weights(&mut self) -> Result<()> {
        let dim = self.config.embedding_dim;
        let mut rng = Rand64::new(self.config.seed as u128);

        let embedding = sampling::uniform(&mut rng, self.vocab_size * dim, 0.05);
        let limit = (6.0 / (dim + 1) as f64).sqrt();
        let head = sampling::uniform(&mut rng, dim, limit);

        self.varmap.set_one(
            EMBEDDING_WEIGHT,
            Tensor::from_vec(embedding, (self.vocab_size, dim), &self.device)?,
        )?;
        self.varmap
            .set_one(HEAD_WEIGHT, Tensor::from_vec(head, (1, dim), &self.device)?)?;
        self.varmap
            .set_one(HEAD_BIAS, Tensor::zeros(1, DType::F32, &self.device)?)?;
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    /// Ids, padding mask `(rows, len, 1)` and non-padding counts `(rows, 1)`.
    fn batch_tensors<R: AsRef<[u32]>>(
        &self,
        rows: &[R],
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let seq_len = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if seq_len == 0 {
            return Err(HatewatchError::Candle("empty input batch".into()));
        }

        let mut ids = Vec::with_capacity(rows.len() * seq_len);
        let mut mask = Vec::with_capacity(rows.len() * seq_len);
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.as_ref();
            if row.len() != seq_len {
                return Err(HatewatchError::Candle(format!(
                    "ragged batch: expected {seq_len} ids, got {}",
                    row.len()
                )));
            }
            let mut count = 0usize;
            for &id in row {
                if id as usize >= self.vocab_size {
                    return Err(HatewatchError::Candle(format!(
                        "id {id} outside vocabulary of {}",
                        self.vocab_size
                    )));
                }
                let keep = id != PAD_ID;
                count += keep as usize;
                ids.push(id);
                mask.push(if keep { 1.0f32 } else { 0.0 });
            }
            counts.push(count.max(1) as f32);
        }

        let n = rows.len();
        Ok((
            Tensor::from_vec(ids, (n, seq_len), &self.device)?,
            Tensor::from_vec(mask, (n, seq_len, 1), &self.device)?,
            Tensor::from_vec(counts, (n, 1), &self.device)?,
        ))
    }

    fn logits(&self, ids: &Tensor, mask: &Tensor, counts: &Tensor) -> candle_core::Result<Tensor> {
        let embedded = self.embedding.forward(ids)?;
        let pooled = embedded.broadcast_mul(mask)?.sum(1)?.broadcast_div(counts)?;
        self.head.forward(&pooled)?.squeeze(1)
    }

    fn fit_batches(&mut self, inputs: &[Vec<u32>], labels: &[u8]) -> Result<f64> {
        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: self.config.learning_rate,
                ..Default::default()
            },
        )?;
        let mut rng = Rand64::new(self.config.seed.wrapping_add(1) as u128);
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut epoch_loss = f64::NAN;

        for epoch in 0..self.config.epochs {
            sampling::shuffle(&mut order, &mut rng);
            let mut total = 0.0f64;
            let mut batches = 0usize;

            for chunk in order.chunks(self.config.batch_size) {
                let rows: Vec<&[u32]> = chunk.iter().map(|&i| inputs[i].as_slice()).collect();
                let targets: Vec<f32> = chunk.iter().map(|&i| labels[i] as f32).collect();

                let (ids, mask, counts) = self.batch_tensors(&rows)?;
                let targets = Tensor::from_vec(targets, chunk.len(), &self.device)?;
                let logits = self.logits(&ids, &mask, &counts)?;
                let loss = bce_with_logits(&logits, &targets)?;
                optimizer.backward_step(&loss)?;

                total += loss.to_scalar::<f32>()? as f64;
                batches += 1;
            }

            epoch_loss = total / batches.max(1) as f64;
            debug!(epoch = epoch + 1, loss = epoch_loss, "epoch complete");
        }

        Ok(epoch_loss)
    }
}

/// Numerically stable `mean(max(z, 0) - z * y + ln(1 + e^-|z|))`.
fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let positive = logits.relu()?;
    let agreement = logits.mul(targets)?;
    let tail = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    positive.sub(&agreement)?.add(&tail)?.mean_all()
}

fn sigmoid(logits: &Tensor) -> candle_core::Result<Tensor> {
    logits.neg()?.exp()?.affine(1.0, 1.0)?.recip()
}

impl Predictor for CandleClassifier {
    fn fit(&mut self, inputs: &[Vec<u32>], labels: &[u8]) -> Result<TrainingReport> {
        if inputs.is_empty() || inputs.len() != labels.len() {
            return Err(HatewatchError::Training {
                reason: format!(
                    "cannot fit on {} inputs with {} labels",
                    inputs.len(),
                    labels.len()
                ),
            });
        }

        let final_loss = self
            .fit_batches(inputs, labels)
            .map_err(|e| HatewatchError::Training {
                reason: format!("classifier failed to fit: {e}"),
            })?;

        info!(
            samples = inputs.len(),
            epochs = self.config.epochs,
            final_loss,
            "classifier fitted"
        );

        Ok(TrainingReport {
            epochs: self.config.epochs,
            samples: inputs.len(),
            final_loss,
        })
    }

    fn predict(&self, inputs: &[Vec<u32>]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(PREDICT_BATCH) {
            let (ids, mask, counts) = self.batch_tensors(chunk)?;
            let probabilities = sigmoid(&self.logits(&ids, &mask, &counts)?)?;
            scores.extend(probabilities.to_vec1::<f32>()?);
        }
        Ok(scores)
    }

    fn input_vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.varmap.save(path).map_err(|e| HatewatchError::Candle(format!(
            "failed to save weights to {}: {e}",
            path.display()
        )))
    }
}

/// Builds and restores [`CandleClassifier`]s on the CPU.
#[derive(Debug, Clone)]
pub struct CandleBackend {
    config: ClassifierConfig,
    device: Device,
}

impl CandleBackend {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            device: Device::Cpu,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}

impl PredictorBackend for CandleBackend {
    type Model = CandleClassifier;

    fn create(&self, vocab_size: usize, _max_len: usize) -> Result<CandleClassifier> {
        CandleClassifier::new(vocab_size, &self.config, &self.device)
    }

    /// Restore a classifier, reading its shape from the weights file itself so
    /// that a bundle stays loadable after the configured embedding size changes.
    fn load(&self, path: &Path) -> Result<CandleClassifier> {
        let bytes = std::fs::read(path).map_err(|e| {
            HatewatchError::io(format!("failed to read weights {}", path.display()), e)
        })?;
        let (vocab_size, embedding_dim) = {
            let tensors = SafeTensors::deserialize(&bytes)
                .map_err(|e| HatewatchError::corrupt(path, e.to_string()))?;
            let view = tensors
                .tensor(EMBEDDING_WEIGHT)
                .map_err(|e| HatewatchError::corrupt(path, e.to_string()))?;
            match view.shape() {
                [vocab, dim] => (*vocab, *dim),
                other => {
                    return Err(HatewatchError::corrupt(
                        path,
                        format!("{EMBEDDING_WEIGHT} has shape {other:?}"),
                    ));
                }
            }
        };

        let config = ClassifierConfig {
            embedding_dim,
            ..self.config.clone()
        };
        let mut classifier = CandleClassifier::build(vocab_size, &config, &self.device)?;
        classifier
            .varmap
            .load(path)
            .map_err(|e| HatewatchError::corrupt(path, e.to_string()))?;
        Ok(classifier)
    }
}

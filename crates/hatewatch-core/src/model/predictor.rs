//! Seams between the pipeline and the numerical model.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HatewatchError, Result};
use crate::label::ABUSIVE_THRESHOLD;

/// Binary classifier over fixed-length id vectors.
///
/// Scores are probabilities in `[0, 1]` that the input is abusive.
pub trait Predictor: Send + Sync {
    /// Fit on encoded inputs with `0`/`1` labels.
    fn fit(&mut self, inputs: &[Vec<u32>], labels: &[u8]) -> Result<TrainingReport>;

    /// Score each encoded input.
    fn predict(&self, inputs: &[Vec<u32>]) -> Result<Vec<f32>>;

    /// Size of the id space this predictor was built for. Must equal the
    /// vocabulary size of the encoder it is paired with.
    fn input_vocab_size(&self) -> usize;

    /// Persist parameters to a single file.
    fn save(&self, path: &Path) -> Result<()>;

    /// Score a labeled set: accuracy at [`ABUSIVE_THRESHOLD`], mean binary
    /// cross-entropy, and the confusion matrix.
    fn evaluate(&self, inputs: &[Vec<u32>], labels: &[u8]) -> Result<EvaluationScore> {
        let scores = self.predict(inputs)?;
        EvaluationScore::from_predictions(&scores, labels)
    }
}

/// Creates fresh predictors and restores persisted ones.
pub trait PredictorBackend: Send + Sync {
    type Model: Predictor;

    fn create(&self, vocab_size: usize, max_len: usize) -> Result<Self::Model>;

    fn load(&self, path: &Path) -> Result<Self::Model>;
}

/// Summary of a `fit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub samples: usize,
    pub final_loss: f64,
}

/// Counts of predictions against ground truth at [`ABUSIVE_THRESHOLD`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn correct(&self) -> usize {
        self.true_negative + self.true_positive
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[[{} {}] [{} {}]]",
            self.true_negative, self.false_positive, self.false_negative, self.true_positive
        )
    }
}

/// Held-out performance of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub accuracy: f64,
    pub loss: f64,
    pub confusion: ConfusionMatrix,
}

impl EvaluationScore {
    /// Compute accuracy, mean binary cross-entropy and the confusion matrix.
    pub fn from_predictions(scores: &[f32], labels: &[u8]) -> Result<Self> {
        if scores.len() != labels.len() {
            return Err(HatewatchError::Evaluation {
                reason: format!(
                    "{} predictions for {} labels",
                    scores.len(),
                    labels.len()
                ),
            });
        }
        if scores.is_empty() {
            return Err(HatewatchError::Evaluation {
                reason: "cannot score an empty test set".into(),
            });
        }

        const EPS: f64 = 1e-7;
        let mut confusion = ConfusionMatrix::default();
        let mut loss = 0.0f64;

        for (&score, &label) in scores.iter().zip(labels) {
            let predicted = score > ABUSIVE_THRESHOLD;
            match (label == 1, predicted) {
                (false, false) => confusion.true_negative += 1,
                (false, true) => confusion.false_positive += 1,
                (true, false) => confusion.false_negative += 1,
                (true, true) => confusion.true_positive += 1,
            }

            let p = (score as f64).clamp(EPS, 1.0 - EPS);
            loss -= if label == 1 { p.ln() } else { (1.0 - p).ln() };
        }

        let total = confusion.total() as f64;
        Ok(Self {
            accuracy: confusion.correct() as f64 / total,
            loss: loss / total,
            confusion,
        })
    }
}

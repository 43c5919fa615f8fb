//! Fits the encoder and the predictor and persists them as one bundle.

use std::path::PathBuf;

use hatewatch_core::config::{EncoderConfig, VocabularyPolicy};
use hatewatch_core::error::{HatewatchError, Result, Stage};
use hatewatch_core::model::{ModelBundle, Predictor, PredictorBackend};
use hatewatch_core::text::SequenceEncoder;
use tracing::{info, warn};

use crate::artifacts::{ModelArtifact, TransformedArtifact};
use crate::data::{self, LabeledRecord};

pub const BUNDLE_DIRNAME: &str = "model";
pub const X_TEST_FILENAME: &str = "x_test.csv";
pub const Y_TEST_FILENAME: &str = "y_test.csv";

pub struct ModelTrainer<'a, B: PredictorBackend> {
    encoder: &'a EncoderConfig,
    backend: &'a B,
    stage_dir: PathBuf,
}

impl<'a, B: PredictorBackend> ModelTrainer<'a, B> {
    pub fn new(encoder: &'a EncoderConfig, backend: &'a B, stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder,
            backend,
            stage_dir: stage_dir.into(),
        }
    }

    pub fn train(&self, transformed: TransformedArtifact) -> Result<ModelArtifact> {
        let train = read_split(&transformed.train_path)?;
        let test = read_split(&transformed.test_path)?;
        if train.is_empty() {
            return Err(HatewatchError::Training {
                reason: format!("{} has no records", transformed.train_path.display()),
            });
        }

        let encoder = self.fit_encoder(&train)?;
        let texts: Vec<&str> = train.iter().map(|record| record.text.as_str()).collect();
        let labels: Vec<u8> = train.iter().map(|record| record.label).collect();
        let inputs = encoder.encode_all(&texts).map_err(training)?;

        let mut predictor = self
            .backend
            .create(encoder.vocab_size(), encoder.max_len())
            .map_err(training)?;
        let report = predictor.fit(&inputs, &labels).map_err(training)?;
        info!(
            epochs = report.epochs,
            samples = report.samples,
            final_loss = report.final_loss,
            vocab_size = encoder.vocab_size(),
            "predictor fitted"
        );

        let bundle = ModelBundle::create(self.stage_dir.join(BUNDLE_DIRNAME), &predictor, &encoder)
            .map_err(training)?;

        let x_test_path = self.stage_dir.join(X_TEST_FILENAME);
        let y_test_path = self.stage_dir.join(Y_TEST_FILENAME);
        data::write_test_set(&x_test_path, &y_test_path, &test).map_err(training)?;

        info!(bundle = %bundle.dir().display(), test = test.len(), "candidate model saved");
        Ok(ModelArtifact {
            bundle,
            x_test_path,
            y_test_path,
        })
    }

    fn fit_encoder(&self, train: &[LabeledRecord]) -> Result<SequenceEncoder> {
        match &self.encoder.vocabulary {
            VocabularyPolicy::FitOnTrainSplit => SequenceEncoder::fit(
                train.iter().map(|record| record.text.as_str()),
                self.encoder,
            )
            .map_err(training),
            VocabularyPolicy::Reuse { tokenizer_path } => {
                if !tokenizer_path.is_file() {
                    return Err(HatewatchError::missing(Stage::Training, tokenizer_path));
                }
                let encoder = SequenceEncoder::load(tokenizer_path).map_err(training)?;
                if encoder.max_len() != self.encoder.max_len {
                    warn!(
                        configured = self.encoder.max_len,
                        persisted = encoder.max_len(),
                        "reused tokenizer keeps its own sequence length"
                    );
                }
                Ok(encoder)
            }
        }
    }
}

fn read_split(path: &std::path::Path) -> Result<Vec<LabeledRecord>> {
    if !path.is_file() {
        return Err(HatewatchError::missing(Stage::Training, path));
    }
    data::read_records(path).map_err(training)
}

fn training(err: HatewatchError) -> HatewatchError {
    match err {
        HatewatchError::Training { .. } | HatewatchError::MissingArtifact { .. } => err,
        other => HatewatchError::Training {
            reason: other.to_string(),
        },
    }
}

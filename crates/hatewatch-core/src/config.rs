//! # Pipeline Configuration
//!
//! Explicit configuration values for every stage of the training and serving
//! pipelines. Every component receives a constructed instance; nothing reads
//! global defaults behind the caller's back.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HatewatchError, Result};
use crate::model::EvaluationScore;

/// Top-level configuration shared by the trainer, the server and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory under which each training run gets its own timestamped folder.
    pub artifacts_root: PathBuf,
    pub dataset: DatasetConfig,
    pub split: SplitPolicy,
    pub encoder: EncoderConfig,
    pub classifier: ClassifierConfig,
    pub acceptance: AcceptancePolicy,
    pub registry: RegistryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from("artifacts"),
            dataset: DatasetConfig::default(),
            split: SplitPolicy::default(),
            encoder: EncoderConfig::default(),
            classifier: ClassifierConfig::default(),
            acceptance: AcceptancePolicy::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HatewatchError::io(format!("failed to read config {}", path.display()), e)
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_artifacts_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifacts_root = root.into();
        self
    }

    pub fn with_archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset.archive_path = path.into();
        self
    }

    pub fn with_registry_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.registry.dir = dir.into();
        self
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Reject configurations that would make a stage fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(HatewatchError::Config { reason });

        if !(self.split.test_ratio > 0.0 && self.split.test_ratio < 1.0) {
            return invalid(format!(
                "split.test_ratio must be in (0, 1), got {}",
                self.split.test_ratio
            ));
        }
        if self.encoder.max_len == 0 {
            return invalid("encoder.max_len must be positive".into());
        }
        if self.encoder.max_words < 3 {
            return invalid(format!(
                "encoder.max_words must leave room for padding, unknown and at least one word, got {}",
                self.encoder.max_words
            ));
        }
        if self.classifier.embedding_dim == 0
            || self.classifier.epochs == 0
            || self.classifier.batch_size == 0
        {
            return invalid(
                "classifier.embedding_dim, epochs and batch_size must be positive".into(),
            );
        }
        if !(self.classifier.learning_rate > 0.0) {
            return invalid(format!(
                "classifier.learning_rate must be positive, got {}",
                self.classifier.learning_rate
            ));
        }
        if self.registry.keep_versions < 2 {
            return invalid(format!(
                "registry.keep_versions must be at least 2, got {}",
                self.registry.keep_versions
            ));
        }
        for source in [&self.dataset.imbalanced, &self.dataset.raw] {
            if source.label_map.is_empty() {
                return invalid(format!("dataset source {} has no label map", source.file_name));
            }
            if source.label_map.values().any(|&label| label > 1) {
                return invalid(format!(
                    "dataset source {} maps onto a label outside {{0, 1}}",
                    source.file_name
                ));
            }
        }
        if self.dataset.imbalanced.file_name == self.dataset.raw.file_name {
            return invalid("dataset sources must use distinct file names".into());
        }
        Ok(())
    }
}

/// Location of the dataset archive and the layout of the files inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub archive_path: PathBuf,
    pub imbalanced: DatasetSource,
    pub raw: DatasetSource,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::from("data").join("dataset.zip"),
            imbalanced: DatasetSource {
                file_name: "imbalanced_data.csv".into(),
                text_column: "tweet".into(),
                label_column: "label".into(),
                label_map: BTreeMap::from([(0, 0), (1, 1)]),
            },
            raw: DatasetSource {
                file_name: "raw_data.csv".into(),
                text_column: "tweet".into(),
                label_column: "class".into(),
                // 0 = hate speech, 1 = offensive language, 2 = neither
                label_map: BTreeMap::from([(0, 1), (1, 1), (2, 0)]),
            },
        }
    }
}

/// One labeled CSV file inside the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSource {
    pub file_name: String,
    pub text_column: String,
    pub label_column: String,
    /// Maps the source's raw label values onto `0` (no hate) / `1` (abusive).
    pub label_map: BTreeMap<i64, u8>,
}

/// Reproducible train/test split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitPolicy {
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            test_ratio: 0.3,
            seed: 42,
        }
    }
}

/// How the trainer obtains the vocabulary for a new bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VocabularyPolicy {
    /// Fit a fresh vocabulary on the training split only.
    FitOnTrainSplit,
    /// Reuse a persisted `tokenizer.json` unchanged.
    Reuse { tokenizer_path: PathBuf },
}

/// Fixed-length sequence encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Vocabulary cap, including the padding and unknown tokens.
    pub max_words: usize,
    /// Every encoded sequence has exactly this many ids.
    pub max_len: usize,
    pub vocabulary: VocabularyPolicy,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_words: 50_000,
            max_len: 300,
            vocabulary: VocabularyPolicy::FitOnTrainSplit,
        }
    }
}

impl EncoderConfig {
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: VocabularyPolicy) -> Self {
        self.vocabulary = vocabulary;
        self
    }
}

/// Hyperparameters for the candle classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub embedding_dim: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seeds weight initialization and batch shuffling.
    pub seed: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 100,
            epochs: 10,
            batch_size: 128,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

/// Which evaluation number the acceptance decision compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMetric {
    Accuracy,
    Loss,
}

impl ComparisonMetric {
    pub fn value(&self, score: &EvaluationScore) -> f64 {
        match self {
            ComparisonMetric::Accuracy => score.accuracy,
            ComparisonMetric::Loss => score.loss,
        }
    }
}

/// Which way is "better" for the compared metric. Never inferred from the metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// What an exact tie between candidate and best model means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// The best model stays.
    #[default]
    Reject,
}

/// Champion/challenger acceptance rule.
///
/// A candidate replaces the best model only when it is strictly better.
/// Equal scores are settled by `ties`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptancePolicy {
    pub metric: ComparisonMetric,
    pub direction: Direction,
    pub ties: TiePolicy,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            metric: ComparisonMetric::Accuracy,
            direction: Direction::HigherIsBetter,
            ties: TiePolicy::Reject,
        }
    }
}

impl AcceptancePolicy {
    pub fn new(metric: ComparisonMetric, direction: Direction) -> Self {
        Self {
            metric,
            direction,
            ties: TiePolicy::default(),
        }
    }

    /// `true` iff `candidate` beats `best` in `direction`, with equal values
    /// decided by `ties`. NaN on either side never wins.
    pub fn is_strict_improvement(&self, candidate: f64, best: f64) -> bool {
        let ordering = match self.direction {
            Direction::HigherIsBetter => candidate.partial_cmp(&best),
            Direction::LowerIsBetter => best.partial_cmp(&candidate),
        };
        match ordering {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => match self.ties {
                TiePolicy::Reject => false,
            },
            Some(Ordering::Less) | None => false,
        }
    }

    pub fn prefers(&self, candidate: &EvaluationScore, best: &EvaluationScore) -> bool {
        self.is_strict_improvement(self.metric.value(candidate), self.metric.value(best))
    }
}

/// Where the promoted best model lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub dir: PathBuf,
    /// Number of promoted versions kept on disk, the current one included.
    pub keep_versions: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts").join("PredictModel"),
            keep_versions: 3,
        }
    }
}

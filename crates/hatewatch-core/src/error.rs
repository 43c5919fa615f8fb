use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage an error or artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ingestion,
    Transformation,
    Training,
    Evaluation,
    Promotion,
}

impl Stage {
    /// Human-readable stage name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingestion => "data ingestion",
            Stage::Transformation => "data transformation",
            Stage::Training => "model training",
            Stage::Evaluation => "model evaluation",
            Stage::Promotion => "model promotion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while training, promoting or serving a classifier.
#[derive(Debug, Error)]
pub enum HatewatchError {
    /// A required input file or archive does not exist.
    #[error("[{stage}] missing artifact: {}", path.display())]
    MissingArtifact {
        /// Stage that required the artifact.
        stage: Stage,
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// The dataset archive could not be extracted.
    #[error("[data ingestion] failed to extract {}: {reason}", path.display())]
    Ingestion { path: PathBuf, reason: String },

    /// Normalized records no longer line up with their labels, or a split is empty.
    #[error("[data transformation] {reason}")]
    Transformation { reason: String },

    /// The encoder or predictor failed to fit or persist.
    #[error("[model training] {reason}")]
    Training { reason: String },

    /// The acceptance decision could not be made.
    #[error("[model evaluation] {reason}")]
    Evaluation { reason: String },

    /// A request could not be classified.
    #[error("[inference] {reason}")]
    Inference { reason: String },

    /// A model bundle failed digest, manifest or pairing checks.
    #[error("corrupt model bundle at {}: {reason}", path.display())]
    CorruptModel { path: PathBuf, reason: String },

    /// Another training run holds the single-flight guard.
    #[error("a training run is already in progress")]
    TrainingInProgress,

    /// The best model changed between evaluation and promotion.
    #[error(
        "[model promotion] best model changed since evaluation (expected {}, found {})",
        expected.as_deref().unwrap_or("none"),
        found.as_deref().unwrap_or("none")
    )]
    PromotionConflict {
        expected: Option<String>,
        found: Option<String>,
    },

    /// Filesystem failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// HuggingFace tokenizers error.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Candle ML framework error.
    #[error("candle error: {0}")]
    Candle(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("regex compilation error: {0}")]
    RegexError(#[from] regex::Error),
}

impl HatewatchError {
    /// Wraps an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn missing(stage: Stage, path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            stage,
            path: path.into(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptModel {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<candle_core::Error> for HatewatchError {
    fn from(err: candle_core::Error) -> Self {
        Self::Candle(err.to_string())
    }
}

/// Result type alias for Hatewatch operations.
pub type Result<T> = std::result::Result<T, HatewatchError>;

//! # Hatewatch Core
//!
//! Shared domain of the Hatewatch abuse classifier: configuration, the text
//! normalizer and sequence encoder, the predictor seam with its candle
//! implementation, model bundles, the best-model registry, and the inference
//! service.
//!
//! ## Quick Start
//!
//! ```rust
//! use hatewatch_core::{Label, TextNormalizer};
//!
//! let normalizer = TextNormalizer::new().unwrap();
//! assert_eq!(normalizer.normalize("You are an IDIOT!!! http://t.co/x"), "idiot");
//!
//! assert_eq!(Label::from_score(0.9).to_string(), "hate and abusive");
//! assert_eq!(Label::from_score(0.5).to_string(), "no hate");
//! ```
pub mod config;
pub mod error;
pub mod inference;
pub mod label;
pub mod model;
pub mod sampling;
pub mod text;

// Re-export primary API
pub use config::{
    AcceptancePolicy, ClassifierConfig, ComparisonMetric, DatasetConfig, DatasetSource,
    Direction, EncoderConfig, PipelineConfig, RegistryConfig, SplitPolicy, TiePolicy,
    VocabularyPolicy,
};
pub use error::{HatewatchError, Result, Stage};
pub use inference::{InferenceService, ServingModel};
pub use label::{ABUSIVE_THRESHOLD, Label};
pub use model::{
    BundleManifest, CandleBackend, CandleClassifier, ConfusionMatrix, EvaluationScore,
    FileRecord, LoadedModel, ModelBundle, ModelRegistry, Predictor, PredictorBackend,
    TrainingReport,
};
pub use text::{SequenceEncoder, TextNormalizer};

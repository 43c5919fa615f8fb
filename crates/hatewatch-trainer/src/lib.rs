//! # Hatewatch Trainer
//!
//! The training pipeline: dataset ingestion, normalization and splitting,
//! candidate training, champion/challenger evaluation, and promotion into the
//! best-model registry. [`TrainingOrchestrator`] runs the stages in order.
pub mod artifacts;
pub mod data;
pub mod evaluation;
pub mod ingestion;
pub mod pipeline;
pub mod trainer;
pub mod transformation;

#[cfg(test)]
mod testing;

pub use artifacts::{
    ArtifactStore, EvaluationVerdict, ModelArtifact, RawArtifact, TransformedArtifact,
};
pub use data::LabeledRecord;
pub use evaluation::ModelEvaluation;
pub use ingestion::DataIngestion;
pub use pipeline::{TrainingOrchestrator, TrainingOutcome};
pub use trainer::ModelTrainer;
pub use transformation::DataTransformation;

//! # Hatewatch
//!
//! Classifies text as `"hate and abusive"` or `"no hate"`, and retrains the
//! classifier on demand, promoting a new model only when it beats the current
//! one on held-out data.
//!
//! ```no_run
//! use hatewatch::{CandleBackend, InferenceService, PipelineConfig, TextNormalizer};
//! use hatewatch::TrainingOrchestrator;
//!
//! let config = PipelineConfig::from_json_file("hatewatch.json").unwrap();
//! let backend = CandleBackend::new(config.classifier.clone());
//! let orchestrator = TrainingOrchestrator::from_config(config, backend.clone()).unwrap();
//! orchestrator.run().unwrap();
//!
//! let service = InferenceService::new(
//!     orchestrator.registry().clone(),
//!     backend,
//!     TextNormalizer::new().unwrap(),
//! );
//! println!("{}", service.classify("have a lovely day").unwrap());
//! ```
pub use hatewatch_core::*;
pub use hatewatch_trainer as trainer;
pub use hatewatch_trainer::{EvaluationVerdict, TrainingOrchestrator, TrainingOutcome};

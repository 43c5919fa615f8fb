pub mod bundle;
pub mod classifier;
pub mod predictor;
pub mod registry;

pub use bundle::{BundleManifest, FileRecord, LoadedModel, ModelBundle};
pub use classifier::{CandleBackend, CandleClassifier};
pub use predictor::{ConfusionMatrix, EvaluationScore, Predictor, PredictorBackend, TrainingReport};
pub use registry::ModelRegistry;

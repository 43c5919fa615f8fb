//! # Training Orchestrator
//!
//! Runs ingestion, transformation, training, evaluation and promotion in
//! order. Each stage receives the previous stage's artifact by value and
//! writes only into its own directory under the run. The first failure ends
//! the run; promotion happens only after an accepting verdict.
//!
//! A run holds the registry's file lock from start to finish, so orchestrators
//! in other processes sharing the same registry are turned away with
//! [`HatewatchError::TrainingInProgress`] instead of racing the promotion.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use hatewatch_core::config::PipelineConfig;
use hatewatch_core::error::{HatewatchError, Result, Stage};
use hatewatch_core::model::{ModelBundle, ModelRegistry, PredictorBackend};
use hatewatch_core::text::TextNormalizer;
use tracing::info;

use crate::artifacts::{ArtifactStore, EvaluationVerdict};
use crate::evaluation::ModelEvaluation;
use crate::ingestion::DataIngestion;
use crate::trainer::ModelTrainer;
use crate::transformation::DataTransformation;

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run_dir: PathBuf,
    pub verdict: EvaluationVerdict,
    /// The registry copy of the candidate, if it was promoted.
    pub promoted: Option<ModelBundle>,
}

/// Sequences the training stages. At most one run is in flight at a time.
pub struct TrainingOrchestrator<B: PredictorBackend> {
    config: PipelineConfig,
    backend: B,
    registry: ModelRegistry,
    normalizer: TextNormalizer,
    running: AtomicBool,
}

impl<B: PredictorBackend> TrainingOrchestrator<B> {
    pub fn new(config: PipelineConfig, backend: B, registry: ModelRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            registry,
            normalizer: TextNormalizer::new()?,
            running: AtomicBool::new(false),
        })
    }

    /// Build an orchestrator with a registry opened from `config.registry`.
    pub fn from_config(config: PipelineConfig, backend: B) -> Result<Self> {
        let registry = ModelRegistry::open(&config.registry)?;
        Self::new(config, backend, registry)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the whole pipeline once.
    ///
    /// Fails with [`HatewatchError::TrainingInProgress`] if another run, in
    /// this process or any other, is training against the same registry.
    pub fn run(&self) -> Result<TrainingOutcome> {
        let _guard = RunGuard::acquire(&self.running)?;
        let mut run_lock = self.registry.run_lock()?;
        let _run_lock = run_lock.try_write().map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock => HatewatchError::TrainingInProgress,
            _ => HatewatchError::io(
                format!("failed to lock registry {}", self.registry.root().display()),
                e,
            ),
        })?;

        let store = ArtifactStore::create(&self.config.artifacts_root)?;
        info!(run_id = store.run_id(), dir = %store.run_dir().display(), "training run started");

        let raw = DataIngestion::new(
            self.config.dataset.clone(),
            store.stage_dir(Stage::Ingestion)?,
        )
        .fetch()?;

        let transformed = DataTransformation::new(
            self.config.dataset.clone(),
            self.config.split,
            self.normalizer.clone(),
            store.stage_dir(Stage::Transformation)?,
        )
        .transform(raw)?;

        let candidate = ModelTrainer::new(
            &self.config.encoder,
            &self.backend,
            store.stage_dir(Stage::Training)?,
        )
        .train(transformed)?;

        let best = self.registry.current().map_err(|e| HatewatchError::Evaluation {
            reason: format!("best model is unreadable: {e}"),
        })?;
        let verdict = ModelEvaluation::new(
            self.config.acceptance,
            &self.backend,
            store.stage_dir(Stage::Evaluation)?,
        )
        .decide(&candidate, best.as_ref())?;

        let promoted = if verdict.is_model_accepted {
            Some(self.registry.promote(&candidate.bundle, best.as_ref())?)
        } else {
            info!("candidate rejected, best model unchanged");
            None
        };

        info!(
            run_id = store.run_id(),
            accepted = verdict.is_model_accepted,
            promoted = promoted.is_some(),
            "training run finished"
        );
        Ok(TrainingOutcome {
            run_dir: store.run_dir().to_path_buf(),
            verdict,
            promoted,
        })
    }
}

struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HatewatchError::TrainingInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordBackend;
    use hatewatch_core::config::{EncoderConfig, SplitPolicy};
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;
    use std::sync::{Arc, Barrier};
    use zip::write::SimpleFileOptions;

    fn write_dataset(path: &Path) {
        let mut imbalanced = String::from("id,label,tweet\n");
        let mut raw = String::from(",count,hate_speech,offensive_language,neither,class,tweet\n");
        for i in 0..10 {
            imbalanced.push_str(&format!("{i},1,you stupid idiot\n"));
            imbalanced.push_str(&format!("{},0,lovely sunny morning\n", i + 10));
            raw.push_str(&format!("{i},3,3,0,0,0,total trash idiot\n"));
            raw.push_str(&format!("{},3,0,0,3,2,lovely walk today\n", i + 10));
        }

        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in [("imbalanced_data.csv", imbalanced), ("raw_data.csv", raw)] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig::new()
            .with_artifacts_root(root.join("artifacts"))
            .with_archive_path(root.join("dataset.zip"))
            .with_registry_dir(root.join("artifacts").join("PredictModel"))
            .with_split(SplitPolicy {
                test_ratio: 0.25,
                seed: 42,
            })
            .with_encoder(EncoderConfig::default().with_max_len(8))
    }

    #[test]
    fn test_first_run_promotes_second_identical_run_does_not() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(&tmp.path().join("dataset.zip"));
        let orchestrator =
            TrainingOrchestrator::from_config(config(tmp.path()), KeywordBackend::default())
                .unwrap();

        let first = orchestrator.run().unwrap();
        assert!(first.verdict.is_model_accepted);
        assert!(first.verdict.best_score.is_none());
        let promoted = first.promoted.unwrap();
        assert_eq!(orchestrator.registry().current().unwrap(), Some(promoted.clone()));
        assert!(first
            .run_dir
            .join("ModelEvaluationArtifacts")
            .join("evaluation.json")
            .is_file());

        // same data and seed produce the same score, and ties are rejected
        let second = orchestrator.run().unwrap();
        assert!(!second.verdict.is_model_accepted);
        assert!(second.promoted.is_none());
        assert_ne!(first.run_dir, second.run_dir);
        assert_eq!(orchestrator.registry().current().unwrap(), Some(promoted));
    }

    #[test]
    fn test_missing_archive_aborts_without_promotion() {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator =
            TrainingOrchestrator::from_config(config(tmp.path()), KeywordBackend::default())
                .unwrap();

        assert!(matches!(
            orchestrator.run(),
            Err(HatewatchError::MissingArtifact {
                stage: Stage::Ingestion,
                ..
            })
        ));
        assert!(orchestrator.registry().current().unwrap().is_none());
        assert!(!orchestrator.is_running());
    }

    #[test]
    fn test_corrupt_pointer_aborts_run() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(&tmp.path().join("dataset.zip"));
        let orchestrator =
            TrainingOrchestrator::from_config(config(tmp.path()), KeywordBackend::default())
                .unwrap();
        fs::write(orchestrator.registry().root().join("CURRENT"), "v-gone").unwrap();

        assert!(matches!(
            orchestrator.run(),
            Err(HatewatchError::Evaluation { .. })
        ));
    }

    #[test]
    fn test_concurrent_run_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(&tmp.path().join("dataset.zip"));
        let gate = Arc::new(Barrier::new(2));
        let orchestrator = TrainingOrchestrator::from_config(
            config(tmp.path()),
            KeywordBackend::gated(Arc::clone(&gate)),
        )
        .unwrap();

        std::thread::scope(|scope| {
            let first = scope.spawn(|| orchestrator.run());

            gate.wait();
            assert!(orchestrator.is_running());
            assert!(matches!(
                orchestrator.run(),
                Err(HatewatchError::TrainingInProgress)
            ));
            gate.wait();

            assert!(first.join().unwrap().is_ok());
        });
        assert!(!orchestrator.is_running());
    }

    #[test]
    fn test_orchestrators_sharing_a_registry_do_not_overlap() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(&tmp.path().join("dataset.zip"));
        let gate = Arc::new(Barrier::new(2));
        let first = TrainingOrchestrator::from_config(
            config(tmp.path()),
            KeywordBackend::gated(Arc::clone(&gate)),
        )
        .unwrap();
        // separate registry handle, as a second process would have
        let second =
            TrainingOrchestrator::from_config(config(tmp.path()), KeywordBackend::default())
                .unwrap();

        std::thread::scope(|scope| {
            let running = scope.spawn(|| first.run());

            gate.wait();
            assert!(!second.is_running());
            assert!(matches!(
                second.run(),
                Err(HatewatchError::TrainingInProgress)
            ));
            gate.wait();

            assert!(running.join().unwrap().unwrap().promoted.is_some());
        });

        // the later run is judged against the first run's model, not an empty registry
        let later = second.run().unwrap();
        assert!(later.verdict.best_score.is_some());
        assert!(!later.verdict.is_model_accepted);
        assert_eq!(second.registry().versions().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path()).with_split(SplitPolicy {
            test_ratio: 1.5,
            seed: 1,
        });

        assert!(matches!(
            TrainingOrchestrator::from_config(config, KeywordBackend::default()),
            Err(HatewatchError::Config { .. })
        ));
    }
}

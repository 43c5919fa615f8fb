//! Per-run staging area and the artifacts passed between stages.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hatewatch_core::config::{ComparisonMetric, Direction};
use hatewatch_core::error::{HatewatchError, Result, Stage};
use hatewatch_core::model::{EvaluationScore, ModelBundle};
use serde::{Deserialize, Serialize};

/// Owns `<artifacts_root>/<run_id>/` and hands out one directory per stage.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    run_id: String,
    run_dir: PathBuf,
}

impl ArtifactStore {
    /// Create a fresh run directory under `root`.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let mut suffix = 0u32;
        let (run_id, run_dir) = loop {
            let run_id = if suffix == 0 {
                format!("run-{millis}")
            } else {
                format!("run-{millis}-{suffix}")
            };
            let run_dir = root.join(&run_id);
            if !run_dir.exists() {
                break (run_id, run_dir);
            }
            suffix += 1;
        };

        fs::create_dir_all(&run_dir).map_err(|e| {
            HatewatchError::io(format!("failed to create run dir {}", run_dir.display()), e)
        })?;
        Ok(Self { run_id, run_dir })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory for `stage`, created if missing.
    ///
    /// Promotion writes into the registry, not the run, so it has none.
    pub fn stage_dir(&self, stage: Stage) -> Result<PathBuf> {
        let name = stage_dir_name(stage).ok_or_else(|| HatewatchError::Config {
            reason: format!("[{stage}] has no run directory"),
        })?;
        let dir = self.run_dir.join(name);
        fs::create_dir_all(&dir).map_err(|e| {
            HatewatchError::io(
                format!("[{stage}] failed to create stage dir {}", dir.display()),
                e,
            )
        })?;
        Ok(dir)
    }
}

fn stage_dir_name(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Ingestion => Some("DataIngestionArtifacts"),
        Stage::Transformation => Some("DataTransformationArtifacts"),
        Stage::Training => Some("ModelTrainerArtifacts"),
        Stage::Evaluation => Some("ModelEvaluationArtifacts"),
        Stage::Promotion => None,
    }
}

/// Extracted dataset files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifact {
    pub imbalanced_data_path: PathBuf,
    pub raw_data_path: PathBuf,
}

/// Normalized `text,label` splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedArtifact {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

/// A trained candidate and the held-out test set it is judged on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub bundle: ModelBundle,
    pub x_test_path: PathBuf,
    pub y_test_path: PathBuf,
}

/// Outcome of the champion/challenger comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    pub is_model_accepted: bool,
    pub metric: ComparisonMetric,
    pub direction: Direction,
    pub candidate_score: EvaluationScore,
    pub best_score: Option<EvaluationScore>,
}

impl EvaluationVerdict {
    /// Write the verdict as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .map_err(|e| HatewatchError::io(format!("failed to write {}", path.display()), e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| HatewatchError::io(format!("failed to read {}", path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatewatch_core::model::ConfusionMatrix;

    #[test]
    fn test_runs_get_distinct_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let a = ArtifactStore::create(tmp.path()).unwrap();
        let b = ArtifactStore::create(tmp.path()).unwrap();

        assert_ne!(a.run_dir(), b.run_dir());
        assert!(a.run_dir().starts_with(tmp.path()));
    }

    #[test]
    fn test_stage_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(tmp.path()).unwrap();

        let first = store.stage_dir(Stage::Ingestion).unwrap();
        fs::write(first.join("marker"), b"x").unwrap();
        let second = store.stage_dir(Stage::Ingestion).unwrap();

        assert_eq!(first, second);
        assert!(second.join("marker").exists());
    }

    #[test]
    fn test_promotion_has_no_run_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(tmp.path()).unwrap();

        assert!(matches!(
            store.stage_dir(Stage::Promotion),
            Err(HatewatchError::Config { .. })
        ));
        assert_eq!(fs::read_dir(store.run_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_verdict_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("evaluation.json");
        let verdict = EvaluationVerdict {
            is_model_accepted: true,
            metric: ComparisonMetric::Accuracy,
            direction: Direction::HigherIsBetter,
            candidate_score: EvaluationScore {
                accuracy: 0.75,
                loss: 0.5,
                confusion: ConfusionMatrix {
                    true_negative: 1,
                    false_positive: 0,
                    false_negative: 1,
                    true_positive: 2,
                },
            },
            best_score: None,
        };

        verdict.save(&path).unwrap();
        assert_eq!(EvaluationVerdict::load(&path).unwrap(), verdict);
    }
}

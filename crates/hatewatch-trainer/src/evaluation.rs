//! # Model Evaluation
//!
//! Champion/challenger decision. The candidate and the current best model are
//! scored on the same held-out text, each through its own tokenizer, and the
//! candidate is accepted only if it is strictly better under the configured
//! [`AcceptancePolicy`]. A missing best model means the first run, which is
//! always accepted. A best model that exists but cannot be loaded is an error.

use std::path::PathBuf;

use hatewatch_core::config::AcceptancePolicy;
use hatewatch_core::error::{HatewatchError, Result};
use hatewatch_core::model::{EvaluationScore, ModelBundle, PredictorBackend};
use tracing::info;

use crate::artifacts::{EvaluationVerdict, ModelArtifact};
use crate::data;

pub const VERDICT_FILENAME: &str = "evaluation.json";

pub struct ModelEvaluation<'a, B: PredictorBackend> {
    policy: AcceptancePolicy,
    backend: &'a B,
    stage_dir: PathBuf,
}

impl<'a, B: PredictorBackend> ModelEvaluation<'a, B> {
    pub fn new(policy: AcceptancePolicy, backend: &'a B, stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            backend,
            stage_dir: stage_dir.into(),
        }
    }

    /// Decide whether `candidate` replaces `best`. Has no effect besides
    /// writing the verdict to `evaluation.json`.
    pub fn decide(
        &self,
        candidate: &ModelArtifact,
        best: Option<&ModelBundle>,
    ) -> Result<EvaluationVerdict> {
        let (texts, labels) = data::read_test_set(&candidate.x_test_path, &candidate.y_test_path)
            .map_err(|e| match e {
                HatewatchError::Evaluation { .. } => e,
                other => HatewatchError::Evaluation {
                    reason: format!("held-out test set is unreadable: {other}"),
                },
            })?;

        let candidate_score = self.score("candidate", &candidate.bundle, &texts, &labels)?;
        let best_score = match best {
            Some(bundle) => Some(self.score("best", bundle, &texts, &labels)?),
            None => None,
        };

        let is_model_accepted = match &best_score {
            None => {
                info!("no best model yet, accepting candidate");
                true
            }
            Some(best_score) => self.policy.prefers(&candidate_score, best_score),
        };

        let verdict = EvaluationVerdict {
            is_model_accepted,
            metric: self.policy.metric,
            direction: self.policy.direction,
            candidate_score,
            best_score,
        };
        info!(
            accepted = verdict.is_model_accepted,
            metric = ?verdict.metric,
            candidate = self.policy.metric.value(&verdict.candidate_score),
            best = ?verdict.best_score.as_ref().map(|s| self.policy.metric.value(s)),
            "evaluation verdict"
        );

        let path = self.stage_dir.join(VERDICT_FILENAME);
        verdict.save(&path)?;
        Ok(verdict)
    }

    fn score(
        &self,
        role: &str,
        bundle: &ModelBundle,
        texts: &[String],
        labels: &[u8],
    ) -> Result<EvaluationScore> {
        let loaded = bundle.load(self.backend).map_err(|e| HatewatchError::Evaluation {
            reason: format!("{role} model at {} could not be loaded: {e}", bundle.dir().display()),
        })?;
        let score = loaded
            .evaluate(texts, labels)
            .map_err(|e| HatewatchError::Evaluation {
                reason: format!("{role} model failed to score: {e}"),
            })?;
        info!(
            role,
            accuracy = score.accuracy,
            loss = score.loss,
            confusion = %score.confusion,
            "model scored"
        );
        Ok(score)
    }
}

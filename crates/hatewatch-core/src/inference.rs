//! # Inference Service
//!
//! Serves the promoted bundle. The model is loaded once, either eagerly at
//! startup or on the first request, and swapped only by an explicit
//! [`InferenceService::reload`] after a promotion.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::{HatewatchError, Result};
use crate::label::Label;
use crate::model::{LoadedModel, ModelRegistry, PredictorBackend};
use crate::text::TextNormalizer;

/// The model state a request runs against.
pub type ServingModel<M> = LoadedModel<M>;

/// Classifies free text with the current best model.
pub struct InferenceService<B: PredictorBackend> {
    registry: ModelRegistry,
    backend: B,
    normalizer: TextNormalizer,
    model: RwLock<Option<Arc<ServingModel<B::Model>>>>,
}

impl<B: PredictorBackend> InferenceService<B> {
    pub fn new(registry: ModelRegistry, backend: B, normalizer: TextNormalizer) -> Self {
        Self {
            registry,
            backend,
            normalizer,
            model: RwLock::new(None),
        }
    }

    /// Load the current best model if nothing is cached yet.
    pub fn load(&self) -> Result<Arc<ServingModel<B::Model>>> {
        if let Some(model) = self.cached()? {
            return Ok(model);
        }

        let mut slot = self.model.write().map_err(|_| poisoned())?;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = Arc::new(self.load_from_registry()?);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Replace the cached model with whatever the registry currently points at.
    ///
    /// On failure the previously cached model keeps serving.
    pub fn reload(&self) -> Result<Arc<ServingModel<B::Model>>> {
        let model = Arc::new(self.load_from_registry()?);
        let mut slot = self.model.write().map_err(|_| poisoned())?;
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn is_loaded(&self) -> bool {
        self.model.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Normalize `text` exactly as the transformation stage does.
    pub fn preprocess(&self, text: &str) -> String {
        self.normalizer.normalize(text)
    }

    /// Probability that `text` is abusive.
    pub fn score(&self, text: &str) -> Result<f32> {
        let model = self.load()?;
        let normalized = self.preprocess(text);
        let scores = model.scores(&[normalized.as_str()]).map_err(|e| {
            HatewatchError::Inference {
                reason: e.to_string(),
            }
        })?;
        scores
            .first()
            .copied()
            .ok_or_else(|| HatewatchError::Inference {
                reason: "predictor returned no score".into(),
            })
    }

    pub fn classify(&self, text: &str) -> Result<Label> {
        let score = self.score(text)?;
        let label = Label::from_score(score);
        debug!(score, label = %label, "classified text");
        Ok(label)
    }

    fn cached(&self) -> Result<Option<Arc<ServingModel<B::Model>>>> {
        let slot = self.model.read().map_err(|_| poisoned())?;
        Ok(slot.as_ref().map(Arc::clone))
    }

    fn load_from_registry(&self) -> Result<ServingModel<B::Model>> {
        let loaded = self
            .registry
            .load_current(&self.backend)
            .map_err(|e| HatewatchError::Inference {
                reason: format!("best model could not be loaded: {e}"),
            })?
            .ok_or_else(|| HatewatchError::Inference {
                reason: format!(
                    "no model has been promoted under {}",
                    self.registry.root().display()
                ),
            })?;
        info!(bundle = %loaded.bundle().dir().display(), "serving model loaded");
        Ok(loaded)
    }
}

fn poisoned() -> HatewatchError {
    HatewatchError::Inference {
        reason: "model lock poisoned".into(),
    }
}

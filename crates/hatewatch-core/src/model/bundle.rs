//! # Model Bundles
//!
//! A bundle is a directory holding a predictor's weights, the tokenizer it
//! was trained against, and a manifest with a digest of each. The bundle is
//! the only handle through which either file is reached, so a model and a
//! tokenizer from different vocabularies can never be paired by accident.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{HatewatchError, Result};
use crate::model::predictor::{EvaluationScore, Predictor, PredictorBackend};
use crate::text::SequenceEncoder;

pub const BUNDLE_VERSION: u32 = 1;
pub const MODEL_FILENAME: &str = "model.safetensors";
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";
pub const MANIFEST_FILENAME: &str = "bundle.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: u32,
    pub created_unix_timestamp: u64,
    pub vocab_size: usize,
    pub max_len: usize,
    pub model: FileRecord,
    pub tokenizer: FileRecord,
}

/// A persisted (model, tokenizer) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBundle {
    dir: PathBuf,
    manifest: BundleManifest,
}

impl ModelBundle {
    /// Persist `predictor` and `encoder` together under `dir`.
    ///
    /// The manifest is written last; a directory without one is not a bundle.
    pub fn create<P: Predictor + ?Sized>(
        dir: impl AsRef<Path>,
        predictor: &P,
        encoder: &SequenceEncoder,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        if predictor.input_vocab_size() != encoder.vocab_size() {
            return Err(HatewatchError::Training {
                reason: format!(
                    "predictor expects {} ids but tokenizer has {} entries",
                    predictor.input_vocab_size(),
                    encoder.vocab_size()
                ),
            });
        }

        fs::create_dir_all(dir).map_err(|e| {
            HatewatchError::io(format!("failed to create bundle dir {}", dir.display()), e)
        })?;

        let model_path = dir.join(MODEL_FILENAME);
        predictor.save(&model_path)?;
        let tokenizer_path = dir.join(TOKENIZER_FILENAME);
        encoder.save(&tokenizer_path)?;

        let manifest = BundleManifest {
            version: BUNDLE_VERSION,
            created_unix_timestamp: unix_timestamp(),
            vocab_size: encoder.vocab_size(),
            max_len: encoder.max_len(),
            model: file_record(&model_path)?,
            tokenizer: file_record(&tokenizer_path)?,
        };
        let manifest_path = dir.join(MANIFEST_FILENAME);
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&manifest_path, json).map_err(|e| {
            HatewatchError::io(format!("failed to write {}", manifest_path.display()), e)
        })?;

        debug!(dir = %dir.display(), vocab_size = manifest.vocab_size, "bundle written");
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    /// Open an existing bundle by reading its manifest. Does not hash the files.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILENAME);
        let content = fs::read_to_string(&manifest_path)
            .map_err(|e| HatewatchError::corrupt(dir, format!("unreadable manifest: {e}")))?;
        let manifest: BundleManifest = serde_json::from_str(&content)
            .map_err(|e| HatewatchError::corrupt(dir, format!("invalid manifest: {e}")))?;

        if manifest.version != BUNDLE_VERSION {
            return Err(HatewatchError::corrupt(
                dir,
                format!("unsupported bundle version {}", manifest.version),
            ));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(&self.manifest.model.filename)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.dir.join(&self.manifest.tokenizer.filename)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILENAME)
    }

    /// Check both files against the digests recorded in the manifest.
    pub fn verify(&self) -> Result<()> {
        for record in [&self.manifest.model, &self.manifest.tokenizer] {
            let path = self.dir.join(&record.filename);
            let actual = sha256_file(&path)
                .map_err(|e| HatewatchError::corrupt(&self.dir, e.to_string()))?;
            if actual != record.sha256 {
                return Err(HatewatchError::corrupt(
                    &self.dir,
                    format!("digest mismatch for {}", record.filename),
                ));
            }
        }
        Ok(())
    }

    /// Verify and load the pair. The encoder and predictor must agree with
    /// each other and with the manifest on vocabulary size.
    pub fn load<B: PredictorBackend>(&self, backend: &B) -> Result<LoadedModel<B::Model>> {
        self.verify()?;

        let encoder = SequenceEncoder::load(self.tokenizer_path())
            .map_err(|e| HatewatchError::corrupt(&self.dir, e.to_string()))?;
        let predictor = backend.load(&self.model_path())?;

        if encoder.vocab_size() != self.manifest.vocab_size
            || predictor.input_vocab_size() != self.manifest.vocab_size
        {
            return Err(HatewatchError::corrupt(
                &self.dir,
                format!(
                    "vocabulary mismatch: manifest {}, tokenizer {}, model {}",
                    self.manifest.vocab_size,
                    encoder.vocab_size(),
                    predictor.input_vocab_size()
                ),
            ));
        }
        if encoder.max_len() != self.manifest.max_len {
            return Err(HatewatchError::corrupt(
                &self.dir,
                format!(
                    "sequence length mismatch: manifest {}, tokenizer {}",
                    self.manifest.max_len,
                    encoder.max_len()
                ),
            ));
        }

        Ok(LoadedModel {
            encoder,
            predictor,
            bundle: self.clone(),
        })
    }
}

/// A bundle loaded into memory. Text is always encoded with the bundle's own tokenizer.
pub struct LoadedModel<M> {
    encoder: SequenceEncoder,
    predictor: M,
    bundle: ModelBundle,
}

impl<M: Predictor> LoadedModel<M> {
    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn encoder(&self) -> &SequenceEncoder {
        &self.encoder
    }

    pub fn predictor(&self) -> &M {
        &self.predictor
    }

    /// Score already-normalized texts.
    pub fn scores<S: AsRef<str>>(&self, normalized: &[S]) -> Result<Vec<f32>> {
        let encoded = self.encoder.encode_all(normalized)?;
        self.predictor.predict(&encoded)
    }

    /// Evaluate on already-normalized texts and their labels.
    pub fn evaluate<S: AsRef<str>>(&self, normalized: &[S], labels: &[u8]) -> Result<EvaluationScore> {
        let encoded = self.encoder.encode_all(normalized)?;
        self.predictor.evaluate(&encoded, labels)
    }
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| HatewatchError::io(format!("failed to open {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| HatewatchError::io(format!("failed to read {}", path.display()), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn file_record(path: &Path) -> Result<FileRecord> {
    let bytes = path
        .metadata()
        .map_err(|e| HatewatchError::io(format!("failed to stat {}", path.display()), e))?
        .len();
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| HatewatchError::Training {
            reason: format!("bundle file name is not valid UTF-8: {}", path.display()),
        })?
        .to_string();
    Ok(FileRecord {
        filename,
        sha256: sha256_file(path)?,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, EncoderConfig};
    use crate::model::classifier::CandleBackend;

    fn backend() -> CandleBackend {
        CandleBackend::new(ClassifierConfig {
            embedding_dim: 4,
            epochs: 1,
            batch_size: 2,
            learning_rate: 0.01,
            seed: 1,
        })
    }

    fn write_bundle(dir: &Path, corpus: &[&str]) -> ModelBundle {
        let encoder =
            SequenceEncoder::fit(corpus.iter().copied(), &EncoderConfig::default().with_max_len(4))
                .unwrap();
        let predictor = backend().create(encoder.vocab_size(), 4).unwrap();
        ModelBundle::create(dir, &predictor, &encoder).unwrap()
    }

    #[test]
    fn test_create_then_open() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = write_bundle(tmp.path(), &["stupid idiot", "lovely day"]);

        let opened = ModelBundle::open(tmp.path()).unwrap();
        assert_eq!(opened, bundle);
        assert!(opened.model_path().exists());
        assert!(opened.tokenizer_path().exists());
        assert!(opened.verify().is_ok());
    }

    #[test]
    fn test_load_scores_with_own_tokenizer() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = write_bundle(tmp.path(), &["stupid idiot", "lovely day"]);

        let loaded = bundle.load(&backend()).unwrap();
        assert_eq!(loaded.encoder().vocab_size(), bundle.manifest().vocab_size);
        let scores = loaded.scores(&["lovely idiot", ""]).unwrap();
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_tampered_tokenizer_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = write_bundle(tmp.path(), &["stupid idiot", "lovely day"]);

        std::fs::write(bundle.tokenizer_path(), b"{}").unwrap();
        assert!(matches!(
            bundle.verify(),
            Err(HatewatchError::CorruptModel { .. })
        ));
        assert!(bundle.load(&backend()).is_err());
    }

    #[test]
    fn test_swapped_tokenizer_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write_bundle(&tmp.path().join("a"), &["stupid idiot", "lovely day"]);
        let b = write_bundle(&tmp.path().join("b"), &["one two three four five six"]);

        std::fs::copy(b.tokenizer_path(), a.tokenizer_path()).unwrap();
        assert!(a.load(&backend()).is_err());
    }

    #[test]
    fn test_missing_manifest_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelBundle::open(tmp.path()),
            Err(HatewatchError::CorruptModel { .. })
        ));
    }

    #[test]
    fn test_mismatched_pair_cannot_be_bundled() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = SequenceEncoder::fit(["a b c"], &EncoderConfig::default().with_max_len(4))
            .unwrap();
        let predictor = backend().create(encoder.vocab_size() + 1, 4).unwrap();
        assert!(matches!(
            ModelBundle::create(tmp.path(), &predictor, &encoder),
            Err(HatewatchError::Training { .. })
        ));
    }
}

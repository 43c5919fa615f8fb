//! # Best-Model Registry
//!
//! Holds the currently promoted bundle at a well-known location.
//!
//! ```text
//! <dir>/CURRENT             name of the current version
//! <dir>/LOCK                held exclusively by the running training process
//! <dir>/versions/<version>/ immutable bundle copies
//! <dir>/.staging-<version>/ in-progress promotion, never read
//! ```
//!
//! Promotion copies into a staging directory, verifies it, renames it into
//! `versions/`, and only then swaps `CURRENT` with a rename. A reader either
//! sees the old pair or the new pair, never a mix.
//!
//! The in-process lock orders loads against promotions. Training runs in
//! different processes exclude each other through an OS file lock on `LOCK`
//! (see [`ModelRegistry::run_lock`]), and a promotion only lands if `CURRENT`
//! still names the model the candidate was compared against.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::error::{HatewatchError, Result, Stage};
use crate::model::bundle::{LoadedModel, MANIFEST_FILENAME, ModelBundle};
use crate::model::predictor::PredictorBackend;

const CURRENT_FILENAME: &str = "CURRENT";
const VERSIONS_DIR: &str = "versions";
const STAGING_PREFIX: &str = ".staging-";
const LOCK_FILENAME: &str = "LOCK";

/// Filesystem store for the promoted (model, tokenizer) pair.
///
/// Clones share one lock, so promotion excludes concurrent loads within a process.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
    keep_versions: usize,
    lock: Arc<RwLock<()>>,
}

impl ModelRegistry {
    pub fn open(config: &RegistryConfig) -> Result<Self> {
        let root = config.dir.clone();
        fs::create_dir_all(root.join(VERSIONS_DIR)).map_err(|e| {
            HatewatchError::io(format!("failed to create registry {}", root.display()), e)
        })?;
        Ok(Self {
            root,
            keep_versions: config.keep_versions.max(2),
            lock: Arc::new(RwLock::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The promoted bundle, or `None` if nothing has been promoted yet.
    ///
    /// A pointer to a missing or unreadable bundle is an error, not `None`.
    pub fn current(&self) -> Result<Option<ModelBundle>> {
        let _guard = self.read_guard()?;
        self.resolve_current()
    }

    /// Verify and load the promoted pair under the read lock.
    pub fn load_current<B: PredictorBackend>(
        &self,
        backend: &B,
    ) -> Result<Option<LoadedModel<B::Model>>> {
        let _guard = self.read_guard()?;
        match self.resolve_current()? {
            Some(bundle) => Ok(Some(bundle.load(backend)?)),
            None => Ok(None),
        }
    }

    /// Open the cross-process run lock for this registry.
    ///
    /// Callers hold `try_write()` on the returned lock for a whole training
    /// run; a `WouldBlock` error means another process is training against
    /// the same registry.
    pub fn run_lock(&self) -> Result<fd_lock::RwLock<File>> {
        let path = self.root.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| HatewatchError::io(format!("failed to open {}", path.display()), e))?;
        Ok(fd_lock::RwLock::new(file))
    }

    /// Atomically make a copy of `candidate` the current best model.
    ///
    /// `replacing` is the best model the candidate was evaluated against
    /// (`None` on the first run). If `CURRENT` names anything else by now the
    /// promotion is refused with [`HatewatchError::PromotionConflict`].
    ///
    /// On any failure the previous best model stays current and the staging
    /// directory is removed.
    pub fn promote(
        &self,
        candidate: &ModelBundle,
        replacing: Option<&ModelBundle>,
    ) -> Result<ModelBundle> {
        let _guard = self
            .lock
            .write()
            .map_err(|_| HatewatchError::Config {
                reason: "registry lock poisoned".into(),
            })?;

        let current = self.resolve_current()?;
        let found = current.as_ref().map(version_of);
        let expected = replacing.map(version_of);
        if found != expected {
            return Err(HatewatchError::PromotionConflict { expected, found });
        }

        let version = self.next_version_name();
        let staging = self.root.join(format!("{STAGING_PREFIX}{version}"));

        let staged = match self.stage(candidate, &staging) {
            Ok(bundle) => bundle,
            Err(err) => {
                remove_dir_quietly(&staging);
                return Err(err);
            }
        };
        drop(staged);

        let final_dir = self.root.join(VERSIONS_DIR).join(&version);
        if let Err(e) = fs::rename(&staging, &final_dir) {
            remove_dir_quietly(&staging);
            return Err(HatewatchError::io(
                format!("[{}] failed to publish {}", Stage::Promotion, final_dir.display()),
                e,
            ));
        }

        let pointer_tmp = self.root.join(format!("{CURRENT_FILENAME}.tmp"));
        let pointer = self.root.join(CURRENT_FILENAME);
        fs::write(&pointer_tmp, &version)
            .and_then(|_| fs::rename(&pointer_tmp, &pointer))
            .map_err(|e| {
                let _ = fs::remove_file(&pointer_tmp);
                HatewatchError::io(
                    format!("[{}] failed to update {}", Stage::Promotion, pointer.display()),
                    e,
                )
            })?;

        info!(version = %version, source = %candidate.dir().display(), "model promoted");
        self.prune(&version);

        ModelBundle::open(final_dir)
    }

    fn stage(&self, candidate: &ModelBundle, staging: &Path) -> Result<ModelBundle> {
        fs::create_dir_all(staging).map_err(|e| {
            HatewatchError::io(format!("failed to create {}", staging.display()), e)
        })?;

        let copies = [
            (candidate.model_path(), &candidate.manifest().model.filename),
            (candidate.tokenizer_path(), &candidate.manifest().tokenizer.filename),
        ];
        for (source, filename) in copies {
            fs::copy(&source, staging.join(filename)).map_err(|e| {
                HatewatchError::io(
                    format!("[{}] failed to copy {}", Stage::Promotion, source.display()),
                    e,
                )
            })?;
        }
        let manifest_path = candidate.manifest_path();
        fs::copy(&manifest_path, staging.join(MANIFEST_FILENAME)).map_err(|e| {
            HatewatchError::io(
                format!("[{}] failed to copy {}", Stage::Promotion, manifest_path.display()),
                e,
            )
        })?;

        let staged = ModelBundle::open(staging)?;
        staged.verify()?;
        Ok(staged)
    }

    fn resolve_current(&self) -> Result<Option<ModelBundle>> {
        let pointer = self.root.join(CURRENT_FILENAME);
        let version = match fs::read_to_string(&pointer) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HatewatchError::corrupt(&pointer, e.to_string())),
        };
        if version.is_empty() || version.contains(['/', '\\']) || version.starts_with('.') {
            return Err(HatewatchError::corrupt(
                &pointer,
                format!("invalid version name {version:?}"),
            ));
        }

        let dir = self.root.join(VERSIONS_DIR).join(&version);
        if !dir.is_dir() {
            return Err(HatewatchError::corrupt(
                &dir,
                "current version directory is missing",
            ));
        }
        ModelBundle::open(dir).map(Some)
    }

    fn read_guard(&self) -> Result<std::sync::RwLockReadGuard<'_, ()>> {
        self.lock.read().map_err(|_| HatewatchError::Config {
            reason: "registry lock poisoned".into(),
        })
    }

    fn next_version_name(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let versions = self.root.join(VERSIONS_DIR);
        let mut suffix = 0u32;
        loop {
            let name = format!("v{millis:015}-{suffix:03}");
            if !versions.join(&name).exists() {
                return name;
            }
            suffix += 1;
        }
    }

    fn version_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.root.join(VERSIONS_DIR)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Drop old versions beyond `keep_versions`. Never removes `current`.
    fn prune(&self, current: &str) {
        let names = self.version_names();
        let excess = names.len().saturating_sub(self.keep_versions);
        for name in names.iter().take(excess).filter(|name| name.as_str() != current) {
            let dir = self.root.join(VERSIONS_DIR).join(name);
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "failed to prune old model version");
            }
        }
    }

    /// Promoted versions on disk, oldest first.
    pub fn versions(&self) -> Vec<String> {
        self.version_names()
    }
}

fn version_of(bundle: &ModelBundle) -> String {
    bundle
        .dir()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn remove_dir_quietly(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to remove staging directory");
        }
    }
}

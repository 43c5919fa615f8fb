//! Dataset archive extraction.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use hatewatch_core::config::DatasetConfig;
use hatewatch_core::error::{HatewatchError, Result, Stage};
use tracing::{info, warn};

use crate::artifacts::RawArtifact;

const EXTRACT_DIR: &str = "feature_store";
const STAGING_DIR: &str = ".feature_store.partial";

/// Materializes the local dataset archive into the run's ingestion directory.
pub struct DataIngestion {
    config: DatasetConfig,
    stage_dir: PathBuf,
}

impl DataIngestion {
    pub fn new(config: DatasetConfig, stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            stage_dir: stage_dir.into(),
        }
    }

    /// Extract the archive and return the paths of both expected sources.
    ///
    /// Either both files are in place or nothing is left behind.
    pub fn fetch(&self) -> Result<RawArtifact> {
        let archive_path = &self.config.archive_path;
        if !archive_path.is_file() {
            return Err(HatewatchError::missing(Stage::Ingestion, archive_path));
        }
        fs::create_dir_all(&self.stage_dir).map_err(|e| {
            HatewatchError::io(
                format!("[{}] failed to create {}", Stage::Ingestion, self.stage_dir.display()),
                e,
            )
        })?;

        let staging = self.stage_dir.join(STAGING_DIR);
        remove_dir_if_exists(&staging)?;

        if let Err(err) = self.extract_into(&staging) {
            discard_staging(&staging);
            return Err(err);
        }

        let extracted = self.stage_dir.join(EXTRACT_DIR);
        let published = remove_dir_if_exists(&extracted).and_then(|_| {
            fs::rename(&staging, &extracted).map_err(|e| {
                HatewatchError::io(
                    format!("[{}] failed to publish {}", Stage::Ingestion, extracted.display()),
                    e,
                )
            })
        });
        if let Err(err) = published {
            discard_staging(&staging);
            return Err(err);
        }

        let artifact = RawArtifact {
            imbalanced_data_path: extracted.join(&self.config.imbalanced.file_name),
            raw_data_path: extracted.join(&self.config.raw.file_name),
        };
        info!(
            archive = %archive_path.display(),
            dir = %extracted.display(),
            "dataset extracted"
        );
        Ok(artifact)
    }

    fn extract_into(&self, staging: &Path) -> Result<()> {
        let archive_path = &self.config.archive_path;
        let corrupt = |reason: String| HatewatchError::Ingestion {
            path: archive_path.clone(),
            reason,
        };

        fs::create_dir_all(staging).map_err(|e| {
            HatewatchError::io(format!("failed to create {}", staging.display()), e)
        })?;
        let file = File::open(archive_path).map_err(|e| {
            HatewatchError::io(format!("failed to open {}", archive_path.display()), e)
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
            let relative = entry
                .enclosed_name()
                .map(|name| name.to_path_buf())
                .ok_or_else(|| corrupt(format!("unsafe entry path {:?}", entry.name())))?;
            let target = staging.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&target).map_err(|e| {
                    HatewatchError::io(format!("failed to create {}", target.display()), e)
                })?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    HatewatchError::io(format!("failed to create {}", parent.display()), e)
                })?;
            }
            let mut out = File::create(&target).map_err(|e| {
                HatewatchError::io(format!("failed to create {}", target.display()), e)
            })?;
            io::copy(&mut entry, &mut out)
                .map_err(|e| corrupt(format!("failed to extract {}: {e}", relative.display())))?;
        }

        for source in [&self.config.imbalanced, &self.config.raw] {
            if !staging.join(&source.file_name).is_file() {
                return Err(corrupt(format!(
                    "archive does not contain {}",
                    source.file_name
                )));
            }
        }
        Ok(())
    }
}

fn discard_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(dir = %staging.display(), error = %e, "failed to clean up partial extraction");
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            HatewatchError::io(format!("failed to remove {}", dir.display()), e)
        })?;
    }
    Ok(())
}

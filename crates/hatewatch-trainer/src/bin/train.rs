//! Runs one training pipeline pass and promotes the candidate if it wins.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hatewatch_core::config::PipelineConfig;
use hatewatch_core::model::CandleBackend;
use hatewatch_trainer::TrainingOrchestrator;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hatewatch-train")]
#[command(about = "Train a hate/abusive text classifier and promote it if it beats the current best")]
#[command(version)]
struct Cli {
    /// JSON pipeline configuration; missing fields take their defaults
    #[arg(short, long, env = "HATEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding per-run artifacts
    #[arg(long, env = "HATEWATCH_ARTIFACTS_ROOT")]
    artifacts_root: Option<PathBuf>,

    /// Dataset archive
    #[arg(short, long, env = "HATEWATCH_ARCHIVE")]
    archive: Option<PathBuf>,

    /// Best-model registry directory
    #[arg(long, env = "HATEWATCH_REGISTRY_DIR")]
    registry_dir: Option<PathBuf>,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::new(),
        };
        if let Some(root) = &self.artifacts_root {
            config = config.with_artifacts_root(root);
        }
        if let Some(archive) = &self.archive {
            config = config.with_archive_path(archive);
        }
        if let Some(dir) = &self.registry_dir {
            config = config.with_registry_dir(dir);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config()?;
    let backend = CandleBackend::new(config.classifier.clone());
    let orchestrator = TrainingOrchestrator::from_config(config, backend)
        .context("failed to set up training pipeline")?;

    let outcome = orchestrator.run().context("training pipeline failed")?;
    let verdict = &outcome.verdict;
    info!(
        run_dir = %outcome.run_dir.display(),
        accepted = verdict.is_model_accepted,
        candidate_accuracy = verdict.candidate_score.accuracy,
        best_accuracy = ?verdict.best_score.as_ref().map(|s| s.accuracy),
        "training finished"
    );
    match &outcome.promoted {
        Some(bundle) => println!("Model promoted to {}", bundle.dir().display()),
        None => println!("Candidate rejected; best model unchanged"),
    }
    Ok(())
}

//! Hatewatch HTTP Server
//!
//! `GET /train` runs the training pipeline, `POST /predict` classifies text
//! with the current best model.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use hatewatch_core::config::PipelineConfig;
use hatewatch_core::error::HatewatchError;
use hatewatch_core::model::{CandleBackend, EvaluationScore, ModelRegistry};
use hatewatch_core::text::TextNormalizer;
use hatewatch_core::{InferenceService, Label};
use hatewatch_trainer::TrainingOrchestrator;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser)]
#[command(name = "hatewatch-server")]
#[command(about = "Serve hate/abusive text classification over HTTP")]
#[command(version)]
struct Cli {
    /// JSON pipeline configuration; missing fields take their defaults
    #[arg(short, long, env = "HATEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(short = 'H', long, env = "HATEWATCH_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "HATEWATCH_PORT", default_value_t = 8080)]
    port: u16,
}

type Backend = CandleBackend;

struct AppState {
    orchestrator: TrainingOrchestrator<Backend>,
    inference: InferenceService<Backend>,
}

type SharedState = Arc<AppState>;

impl AppState {
    fn new(config: PipelineConfig) -> hatewatch_core::Result<Self> {
        let backend = CandleBackend::new(config.classifier.clone());
        let registry = ModelRegistry::open(&config.registry)?;
        let inference =
            InferenceService::new(registry.clone(), backend.clone(), TextNormalizer::new()?);
        let orchestrator = TrainingOrchestrator::new(config, backend, registry)?;
        Ok(Self {
            orchestrator,
            inference,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    model_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrainResponse {
    message: String,
    accepted: bool,
    promoted: bool,
    run_dir: String,
    candidate_score: EvaluationScore,
    best_score: Option<EvaluationScore>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PredictRequest {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PredictResponse {
    prediction: Label,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Error mapped onto an HTTP status.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<HatewatchError> for ApiError {
    fn from(err: HatewatchError) -> Self {
        let status = match err {
            HatewatchError::TrainingInProgress | HatewatchError::PromotionConflict { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("worker failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/train", get(train))
        .route("/predict", post(predict))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        model_loaded: state.inference.is_loaded(),
    })
}

async fn train(State(state): State<SharedState>) -> Result<Json<TrainResponse>, ApiError> {
    let worker = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || worker.orchestrator.run()).await??;

    if outcome.promoted.is_some() {
        let worker = Arc::clone(&state);
        match tokio::task::spawn_blocking(move || worker.inference.reload()).await? {
            Ok(_) => info!("serving the newly promoted model"),
            Err(e) => warn!(error = %e, "promoted model could not be loaded for serving"),
        }
    }

    let message = if outcome.promoted.is_some() {
        "Training successful, new model promoted"
    } else {
        "Training successful, best model kept"
    };
    Ok(Json(TrainResponse {
        message: message.into(),
        accepted: outcome.verdict.is_model_accepted,
        promoted: outcome.promoted.is_some(),
        run_dir: outcome.run_dir.display().to_string(),
        candidate_score: outcome.verdict.candidate_score,
        best_score: outcome.verdict.best_score,
    }))
}

async fn predict(
    State(state): State<SharedState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let worker = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || worker.inference.classify(&request.text)).await?;

    match result {
        Ok(prediction) => Ok(Json(PredictResponse { prediction })),
        Err(err) if !state.inference.is_loaded() => {
            Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::new(),
    };

    let state = Arc::new(AppState::new(config).context("failed to set up services")?);
    match state.inference.load() {
        Ok(model) => info!(bundle = %model.bundle().dir().display(), "best model loaded"),
        Err(e) => warn!(error = %e, "starting without a model; train one with GET /train"),
    }

    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}

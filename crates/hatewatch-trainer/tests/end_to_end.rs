use std::fs::File;
use std::io::Write;
use std::path::Path;

use hatewatch_core::config::{ClassifierConfig, EncoderConfig, PipelineConfig};
use hatewatch_core::model::{CandleBackend, ModelRegistry};
use hatewatch_core::text::TextNormalizer;
use hatewatch_core::{InferenceService, Label};
use hatewatch_trainer::{TrainingOrchestrator, data};
use zip::write::SimpleFileOptions;

const ABUSIVE: &[&str] = &[
    "You are a stupid idiot!!!",
    "what a worthless idiot, total trash",
    "@someone shut up you stupid moron",
    "Pathetic trash, nobody wants you here",
    "idiot moron loser https://t.co/abc",
];

const NEUTRAL: &[&str] = &[
    "What a lovely sunny morning",
    "Enjoying a quiet walk in the park",
    "Lovely weather for coffee with friends",
    "[video] sunny afternoon by the lake",
    "Good morning, have a lovely day <3",
];

/// 50 rows in each source, half abusive.
fn write_dataset(path: &Path) {
    let mut imbalanced = String::from("id,label,tweet\n");
    let mut raw = String::from(",count,hate_speech,offensive_language,neither,class,tweet\n");
    for i in 0..25 {
        let abusive = ABUSIVE[i % ABUSIVE.len()];
        let neutral = NEUTRAL[i % NEUTRAL.len()];
        imbalanced.push_str(&format!("{},1,\"{abusive}\"\n", 2 * i));
        imbalanced.push_str(&format!("{},0,\"{neutral}\"\n", 2 * i + 1));

        // hate speech and offensive language both count as abusive
        let class = if i % 2 == 0 { 0 } else { 1 };
        raw.push_str(&format!("{},3,2,1,0,{class},\"{abusive}\"\n", 2 * i));
        raw.push_str(&format!("{},3,0,0,3,2,\"{neutral}\"\n", 2 * i + 1));
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
        .with_archive_path(root.join("data").join("dataset.zip"))
        .with_registry_dir(root.join("artifacts").join("PredictModel"))
        .with_encoder(EncoderConfig::default().with_max_len(16))
        .with_classifier(ClassifierConfig {
            embedding_dim: 16,
            epochs: 60,
            batch_size: 16,
            learning_rate: 0.05,
            seed: 42,
        })
}

#[test]
fn test_train_promote_and_classify() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    write_dataset(&tmp.path().join("data").join("dataset.zip"));

    let config = config(tmp.path());
    let backend = CandleBackend::new(config.classifier.clone());
    let registry = ModelRegistry::open(&config.registry).unwrap();
    let orchestrator = TrainingOrchestrator::new(config.clone(), backend.clone(), registry.clone())
        .unwrap();

    let outcome = orchestrator.run().unwrap();

    let feature_store = outcome
        .run_dir
        .join("DataIngestionArtifacts")
        .join("feature_store");
    assert!(feature_store.join("imbalanced_data.csv").is_file());
    assert!(feature_store.join("raw_data.csv").is_file());

    let transformed = outcome.run_dir.join("DataTransformationArtifacts");
    let train = data::read_records(&transformed.join("train.csv")).unwrap();
    let test = data::read_records(&transformed.join("test.csv")).unwrap();
    assert_eq!(train.len() + test.len(), 100);
    assert_eq!(test.len(), 30);

    assert!(outcome.verdict.is_model_accepted);
    assert!(outcome.verdict.best_score.is_none());
    assert!(outcome.verdict.candidate_score.accuracy > 0.9);
    let promoted = outcome.promoted.unwrap();
    assert_eq!(registry.current().unwrap(), Some(promoted));

    let service = InferenceService::new(registry, backend, TextNormalizer::new().unwrap());
    service.load().unwrap();
    assert_eq!(service.classify("stupid idiot").unwrap(), Label::HateAndAbusive);
    assert_eq!(
        service.classify("What a lovely sunny morning").unwrap(),
        Label::NoHate
    );
}

#[test]
fn test_transformation_and_inference_normalize_identically() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    write_dataset(&tmp.path().join("data").join("dataset.zip"));

    let config = config(tmp.path());
    let backend = CandleBackend::new(config.classifier.clone());
    let orchestrator = TrainingOrchestrator::from_config(config.clone(), backend.clone()).unwrap();
    let outcome = orchestrator.run().unwrap();

    let service = InferenceService::new(
        orchestrator.registry().clone(),
        backend,
        TextNormalizer::new().unwrap(),
    );
    let transformed = outcome.run_dir.join("DataTransformationArtifacts");
    let mut cleaned = data::read_records(&transformed.join("train.csv")).unwrap();
    cleaned.extend(data::read_records(&transformed.join("test.csv")).unwrap());

    for raw in ABUSIVE.iter().chain(NEUTRAL) {
        let expected = service.preprocess(raw);
        assert!(
            cleaned.iter().any(|record| record.text == expected),
            "{raw:?} normalized to {expected:?}, which the transformation stage never wrote"
        );
    }
}

//! Normalization and the reproducible train/test split.

use std::path::PathBuf;

use hatewatch_core::config::{DatasetConfig, SplitPolicy};
use hatewatch_core::error::{HatewatchError, Result, Stage};
use hatewatch_core::sampling::permutation;
use hatewatch_core::text::TextNormalizer;
use tracing::info;

use crate::artifacts::{RawArtifact, TransformedArtifact};
use crate::data::{self, LabeledRecord};

pub const TRAIN_FILENAME: &str = "train.csv";
pub const TEST_FILENAME: &str = "test.csv";

pub struct DataTransformation {
    dataset: DatasetConfig,
    split: SplitPolicy,
    normalizer: TextNormalizer,
    stage_dir: PathBuf,
}

impl DataTransformation {
    pub fn new(
        dataset: DatasetConfig,
        split: SplitPolicy,
        normalizer: TextNormalizer,
        stage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dataset,
            split,
            normalizer,
            stage_dir: stage_dir.into(),
        }
    }

    /// Normalize both sources and write the `train.csv` / `test.csv` splits.
    pub fn transform(&self, raw: RawArtifact) -> Result<TransformedArtifact> {
        let mut records = Vec::new();
        for (path, source) in [
            (&raw.imbalanced_data_path, &self.dataset.imbalanced),
            (&raw.raw_data_path, &self.dataset.raw),
        ] {
            if !path.is_file() {
                return Err(HatewatchError::missing(Stage::Transformation, path));
            }
            let rows = data::read_source(path, source).map_err(|e| match e {
                HatewatchError::Transformation { .. } => e,
                other => HatewatchError::Transformation {
                    reason: format!("failed to read {}: {other}", path.display()),
                },
            })?;
            info!(source = %source.file_name, rows = rows.len(), "dataset source loaded");
            records.extend(rows);
        }
        let read = records.len();

        let cleaned: Vec<LabeledRecord> = records
            .into_iter()
            .map(|record| LabeledRecord::new(self.normalizer.normalize(&record.text), record.label))
            .collect();

        let (train, test) = split(cleaned, &self.split)?;

        let train_path = self.stage_dir.join(TRAIN_FILENAME);
        let test_path = self.stage_dir.join(TEST_FILENAME);
        let write = |path: &PathBuf, records: &[LabeledRecord]| {
            data::write_records(path, records).map_err(|e| HatewatchError::Transformation {
                reason: format!("failed to write {}: {e}", path.display()),
            })
        };
        let written = write(&train_path, &train)? + write(&test_path, &test)?;
        if written != read {
            return Err(HatewatchError::Transformation {
                reason: format!("read {read} records but wrote {written}"),
            });
        }

        info!(
            train = train.len(),
            test = test.len(),
            dir = %self.stage_dir.display(),
            "dataset transformed"
        );
        Ok(TransformedArtifact {
            train_path,
            test_path,
        })
    }
}

/// Seeded split into `(train, test)`. The test partition gets
/// `ceil(len * test_ratio)` records and both partitions must be non-empty.
pub fn split(
    records: Vec<LabeledRecord>,
    policy: &SplitPolicy,
) -> Result<(Vec<LabeledRecord>, Vec<LabeledRecord>)> {
    let total = records.len();
    let test_len = (total as f64 * policy.test_ratio).ceil() as usize;
    if test_len == 0 || test_len >= total {
        return Err(HatewatchError::Transformation {
            reason: format!(
                "cannot split {total} records with test_ratio {} into two non-empty partitions",
                policy.test_ratio
            ),
        });
    }

    let order = permutation(total, policy.seed);
    let mut slots: Vec<Option<LabeledRecord>> = records.into_iter().map(Some).collect();
    let mut shuffled = order.into_iter().filter_map(|i| slots[i].take());

    let test: Vec<LabeledRecord> = shuffled.by_ref().take(test_len).collect();
    let train: Vec<LabeledRecord> = shuffled.collect();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn records(n: usize) -> Vec<LabeledRecord> {
        (0..n)
            .map(|i| LabeledRecord::new(format!("text {i}"), (i % 2) as u8))
            .collect()
    }

    #[test]
    fn test_split_is_reproducible() {
        let policy = SplitPolicy::default();
        assert_eq!(
            split(records(20), &policy).unwrap(),
            split(records(20), &policy).unwrap()
        );
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = split(records(10), &SplitPolicy::default()).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);
    }

    #[test]
    fn test_split_rejects_empty_partition() {
        assert!(split(records(1), &SplitPolicy::default()).is_err());
        assert!(split(Vec::new(), &SplitPolicy::default()).is_err());
    }

    #[test]
    fn test_transform_normalizes_each_record_once() {
        let tmp = tempfile::tempdir().unwrap();
        let imbalanced = tmp.path().join("imbalanced_data.csv");
        let raw = tmp.path().join("raw_data.csv");
        fs::write(
            &imbalanced,
            "id,label,tweet\n1,1,\"You are a STUPID idiot!!! @user\"\n2,0,\"[video] Lovely day https://t.co/x\"\n",
        )
        .unwrap();
        fs::write(
            &raw,
            ",count,hate_speech,offensive_language,neither,class,tweet\n\
             0,3,0,0,3,2,sunny 2day morning\n\
             1,3,3,0,0,0,<b>trash</b> talk\n",
        )
        .unwrap();

        let normalizer = TextNormalizer::new().unwrap();
        let stage = DataTransformation::new(
            DatasetConfig::default(),
            SplitPolicy::default(),
            normalizer.clone(),
            tmp.path(),
        );
        let artifact = stage
            .transform(RawArtifact {
                imbalanced_data_path: imbalanced,
                raw_data_path: raw,
            })
            .unwrap();

        let mut all = data::read_records(&artifact.train_path).unwrap();
        all.extend(data::read_records(&artifact.test_path).unwrap());
        all.sort_by(|a, b| a.text.cmp(&b.text));

        assert_eq!(
            all,
            vec![
                LabeledRecord::new("lovely day", 0),
                LabeledRecord::new("stupid idiot", 1),
                LabeledRecord::new("sunny morning", 0),
                LabeledRecord::new("trash talk", 1),
            ]
        );
        for record in &all {
            assert_eq!(normalizer.normalize(&record.text), record.text);
        }
    }

    #[test]
    fn test_missing_source_file() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = DataTransformation::new(
            DatasetConfig::default(),
            SplitPolicy::default(),
            TextNormalizer::new().unwrap(),
            tmp.path(),
        );
        let err = stage
            .transform(RawArtifact {
                imbalanced_data_path: tmp.path().join("nope.csv"),
                raw_data_path: tmp.path().join("nope2.csv"),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            HatewatchError::MissingArtifact {
                stage: Stage::Transformation,
                ..
            }
        ));
    }
}

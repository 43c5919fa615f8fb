//! CSV readers and writers for dataset sources, splits and the test set.

use std::path::Path;

use hatewatch_core::config::DatasetSource;
use hatewatch_core::error::{HatewatchError, Result};
use serde::{Deserialize, Serialize};

/// A single `text,label` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub text: String,
    pub label: u8,
}

impl LabeledRecord {
    pub fn new(text: impl Into<String>, label: u8) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TextRow {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LabelRow {
    label: u8,
}

/// Read one dataset source, mapping its label column onto `{0, 1}`.
///
/// Text is returned exactly as stored. A missing column, or a label that does
/// not parse or is absent from the label map, fails the whole read.
pub fn read_source(path: &Path, source: &DatasetSource) -> Result<Vec<LabeledRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| HatewatchError::Transformation {
                reason: format!("{} has no column {name:?}", path.display()),
            })
    };
    let text_idx = column(&source.text_column)?;
    let label_idx = column(&source.label_column)?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let line = row + 2;
        let text = record.get(text_idx).unwrap_or_default();
        let raw_label = record.get(label_idx).unwrap_or_default().trim();

        let value: i64 = raw_label.parse().map_err(|_| HatewatchError::Transformation {
            reason: format!(
                "{}:{line}: label {raw_label:?} is not an integer",
                path.display()
            ),
        })?;
        let label = *source
            .label_map
            .get(&value)
            .ok_or_else(|| HatewatchError::Transformation {
                reason: format!(
                    "{}:{line}: label {value} is not in the label map",
                    path.display()
                ),
            })?;

        records.push(LabeledRecord::new(text, label));
    }
    Ok(records)
}

/// Write `text,label` rows. Returns the number of rows written.
pub fn write_records(path: &Path, records: &[LabeledRecord]) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .map_err(|e| HatewatchError::io(format!("failed to flush {}", path.display()), e))?;
    Ok(records.len())
}

pub fn read_records(path: &Path) -> Result<Vec<LabeledRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Write the held-out split as two single-column files, `text` and `label`.
pub fn write_test_set(x_path: &Path, y_path: &Path, records: &[LabeledRecord]) -> Result<()> {
    let mut x_writer = csv::Writer::from_path(x_path)?;
    let mut y_writer = csv::Writer::from_path(y_path)?;
    for record in records {
        x_writer.serialize(TextRow {
            text: record.text.clone(),
        })?;
        y_writer.serialize(LabelRow {
            label: record.label,
        })?;
    }
    x_writer
        .flush()
        .map_err(|e| HatewatchError::io(format!("failed to flush {}", x_path.display()), e))?;
    y_writer
        .flush()
        .map_err(|e| HatewatchError::io(format!("failed to flush {}", y_path.display()), e))?;
    Ok(())
}

/// Read the held-out split back. The two files must have the same length.
pub fn read_test_set(x_path: &Path, y_path: &Path) -> Result<(Vec<String>, Vec<u8>)> {
    let texts: Vec<String> = csv::Reader::from_path(x_path)?
        .deserialize::<TextRow>()
        .map(|row| row.map(|row| row.text))
        .collect::<std::result::Result<_, _>>()?;
    let labels: Vec<u8> = csv::Reader::from_path(y_path)?
        .deserialize::<LabelRow>()
        .map(|row| row.map(|row| row.label))
        .collect::<std::result::Result<_, _>>()?;

    if texts.len() != labels.len() {
        return Err(HatewatchError::Evaluation {
            reason: format!(
                "{} has {} rows but {} has {}",
                x_path.display(),
                texts.len(),
                y_path.display(),
                labels.len()
            ),
        });
    }
    Ok((texts, labels))
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Decision boundary applied to the predictor's scalar output.
/// A score strictly above this value is classified as abusive.
pub const ABUSIVE_THRESHOLD: f32 = 0.5;

/// Classification returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "hate and abusive")]
    HateAndAbusive,
    #[serde(rename = "no hate")]
    NoHate,
}

impl Label {
    pub fn from_score(score: f32) -> Self {
        if score > ABUSIVE_THRESHOLD {
            Label::HateAndAbusive
        } else {
            Label::NoHate
        }
    }

    /// Binary class id used in datasets: 1 = abusive, 0 = no hate.
    pub fn class_id(&self) -> u8 {
        match self {
            Label::HateAndAbusive => 1,
            Label::NoHate => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::HateAndAbusive => "hate and abusive",
            Label::NoHate => "no hate",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

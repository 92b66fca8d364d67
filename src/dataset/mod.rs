/// Dataset preparation between labeling and model training
///
/// - Seeded (optionally stratified) train/test split
/// - Class weight computation
/// - Random oversampling of minority classes

pub mod balance;
pub mod split;

pub use balance::{ClassWeights, RandomOverSampler};
pub use split::{train_test_split, DatasetSplit};

use crate::error::{AppError, Result};
use crate::labeling::LabeledBatch;
use crate::models::SeverityLabel;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Dataset preparation settings (`[dataset]`)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatasetConfig {
    /// Fraction of samples held out for testing, exclusive (0, 1)
    #[serde(default = "default_test_size")]
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub test_size: f64,

    /// Seed for splitting, oversampling and model randomness
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Keep class proportions on both sides of the split
    #[serde(default = "default_true")]
    pub stratify: bool,

    /// Oversample minority classes in the training split
    #[serde(default = "default_true")]
    pub oversample: bool,

    #[serde(default)]
    pub class_weights: ClassWeights,
}

fn default_test_size() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            seed: default_seed(),
            stratify: true,
            oversample: true,
            class_weights: ClassWeights::default(),
        }
    }
}

impl DatasetConfig {
    /// Field validation plus the class weight check
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::Configuration(format!("[dataset] {}", e)))?;
        self.class_weights.validate()
    }
}

/// A projected feature string with its ground-truth label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSample {
    pub text: String,
    pub label: SeverityLabel,
}

impl TextSample {
    pub fn new(text: impl Into<String>, label: SeverityLabel) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }
}

impl From<&LabeledBatch> for Vec<TextSample> {
    fn from(batch: &LabeledBatch) -> Self {
        batch
            .records
            .iter()
            .map(|r| TextSample::new(r.features.clone(), r.label))
            .collect()
    }
}

use crate::error::{AppError, Result};
use crate::models::{SeverityLabel, N_CLASSES};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strum::{EnumIter, EnumString, IntoEnumIterator};
use validator::{Validate, ValidationError};

/// Text vectorizer configuration (`[vectorizer]`)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_ngram_range"))]
pub struct FeatureConfig {
    /// Maximum vocabulary size
    #[serde(default = "default_max_features")]
    #[validate(range(min = 1))]
    pub max_features: usize,

    /// Minimum document frequency for terms
    #[serde(default = "default_min_doc_freq")]
    #[validate(range(min = 1))]
    pub min_doc_freq: usize,

    /// N-gram range (min, max)
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
}

fn default_max_features() -> usize {
    1000
}

fn default_min_doc_freq() -> usize {
    1
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn validate_ngram_range(config: &FeatureConfig) -> std::result::Result<(), ValidationError> {
    let (min_n, max_n) = config.ngram_range;
    if min_n == 0 || min_n > max_n {
        return Err(ValidationError::new("ngram_range"));
    }
    Ok(())
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            min_doc_freq: default_min_doc_freq(),
            ngram_range: default_ngram_range(),
        }
    }
}

/// `[evaluation]`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvaluationConfig {
    /// Precision/recall reported when a class has no predictions or no
    /// support
    #[serde(default = "default_zero_division")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub zero_division: f64,
}

fn default_zero_division() -> f64 {
    1.0
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            zero_division: default_zero_division(),
        }
    }
}

/// Term weighting used to turn feature strings into vectors
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VectorizerKind {
    /// L2-normalized TF-IDF
    #[default]
    Tfidf,
    /// Raw term counts
    Count,
}

/// Model type enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum ModelType {
    /// Random forest
    #[strum(serialize = "rf", serialize = "random_forest")]
    RandomForest,

    /// Logistic regression
    #[strum(serialize = "lr", serialize = "logistic_regression")]
    LogisticRegression,

    /// Gradient boosting
    #[strum(serialize = "gb", serialize = "gradient_boosting", serialize = "xgboost")]
    GradientBoosting,
}

impl ModelType {
    pub fn all() -> Vec<ModelType> {
        ModelType::iter().collect()
    }

    /// Short code used on the command line and as a metric label
    pub fn code(&self) -> &'static str {
        match self {
            ModelType::RandomForest => "rf",
            ModelType::LogisticRegression => "lr",
            ModelType::GradientBoosting => "gb",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::RandomForest => write!(f, "Random Forest"),
            ModelType::LogisticRegression => write!(f, "Logistic Regression"),
            ModelType::GradientBoosting => write!(f, "Gradient Boosting"),
        }
    }
}

/// `[models.random_forest]`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RandomForestSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rf_trees")]
    #[validate(range(min = 1))]
    pub n_trees: u16,

    #[serde(default = "default_rf_depth")]
    #[validate(range(min = 1))]
    pub max_depth: u16,

    #[serde(default = "default_min_samples_split")]
    #[validate(range(min = 2))]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,

    #[serde(default)]
    pub features: VectorizerKind,
}

impl Default for RandomForestSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            n_trees: default_rf_trees(),
            max_depth: default_rf_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            features: VectorizerKind::Tfidf,
        }
    }
}

/// `[models.logistic_regression]`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogisticRegressionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// L2 regularization strength
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub alpha: f64,

    #[serde(default = "default_count_features")]
    pub features: VectorizerKind,

    /// Scale columns to unit variance before fitting
    #[serde(default = "default_true")]
    pub scale: bool,
}

impl Default for LogisticRegressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.0,
            features: VectorizerKind::Count,
            scale: true,
        }
    }
}

/// `[models.gradient_boosting]`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GradientBoostingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_gb_rounds")]
    #[validate(range(min = 1))]
    pub n_rounds: usize,

    #[serde(default = "default_gb_learning_rate")]
    #[validate(range(min = 0.0001, max = 1.0))]
    pub learning_rate: f64,

    #[serde(default = "default_gb_depth")]
    #[validate(range(min = 1))]
    pub max_depth: u16,

    /// Minimum number of samples a leaf must hold
    #[serde(default = "default_gb_min_child_weight")]
    #[validate(range(min = 1))]
    pub min_child_weight: usize,

    /// Fraction of rows drawn for each round
    #[serde(default = "default_fraction")]
    #[validate(range(min = 0.01, max = 1.0))]
    pub subsample: f64,

    /// Fraction of columns drawn for each tree
    #[serde(default = "default_gb_colsample")]
    #[validate(range(min = 0.01, max = 1.0))]
    pub colsample_bytree: f64,

    #[serde(default)]
    pub features: VectorizerKind,
}

impl Default for GradientBoostingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            n_rounds: default_gb_rounds(),
            learning_rate: default_gb_learning_rate(),
            max_depth: default_gb_depth(),
            min_child_weight: default_gb_min_child_weight(),
            subsample: default_fraction(),
            colsample_bytree: default_gb_colsample(),
            features: VectorizerKind::Tfidf,
        }
    }
}

/// `[models]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ModelsConfig {
    #[serde(default)]
    #[validate(nested)]
    pub random_forest: RandomForestSettings,

    #[serde(default)]
    #[validate(nested)]
    pub logistic_regression: LogisticRegressionSettings,

    #[serde(default)]
    #[validate(nested)]
    pub gradient_boosting: GradientBoostingSettings,
}

impl ModelsConfig {
    /// Models switched on in configuration, in fixed order
    pub fn enabled(&self) -> Vec<ModelType> {
        ModelType::iter().filter(|m| self.is_enabled(*m)).collect()
    }

    pub fn is_enabled(&self, model: ModelType) -> bool {
        match model {
            ModelType::RandomForest => self.random_forest.enabled,
            ModelType::LogisticRegression => self.logistic_regression.enabled,
            ModelType::GradientBoosting => self.gradient_boosting.enabled,
        }
    }

    /// Feature weighting the model trains on
    pub fn features_for(&self, model: ModelType) -> VectorizerKind {
        match model {
            ModelType::RandomForest => self.random_forest.features,
            ModelType::LogisticRegression => self.logistic_regression.features,
            ModelType::GradientBoosting => self.gradient_boosting.features,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_count_features() -> VectorizerKind {
    VectorizerKind::Count
}

fn default_rf_trees() -> u16 {
    40
}

fn default_rf_depth() -> u16 {
    20
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_gb_rounds() -> usize {
    50
}

fn default_gb_learning_rate() -> f64 {
    0.2
}

fn default_gb_depth() -> u16 {
    8
}

fn default_gb_min_child_weight() -> usize {
    6
}

fn default_fraction() -> f64 {
    1.0
}

fn default_gb_colsample() -> f64 {
    0.8
}

/// Prediction result with confidence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction<T> {
    /// Predicted value
    pub value: T,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// All class probabilities
    pub probabilities: HashMap<String, f64>,
}

impl<T> Prediction<T> {
    pub fn new(value: T, confidence: f64) -> Self {
        Self {
            value,
            confidence,
            probabilities: HashMap::new(),
        }
    }

    pub fn with_probabilities(mut self, probabilities: HashMap<String, f64>) -> Self {
        self.probabilities = probabilities;
        self
    }
}

/// Vectorized training data
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Severity labels, one per row
    pub labels: Vec<SeverityLabel>,

    /// Per-row weight derived from the class weights
    pub weights: Array1<f64>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    pub fn new(features: Array2<f64>, labels: Vec<SeverityLabel>) -> Result<Self> {
        Self::with_class_weights(features, labels, &[1.0; N_CLASSES])
    }

    pub fn with_class_weights(
        features: Array2<f64>,
        labels: Vec<SeverityLabel>,
        class_weights: &[f64; N_CLASSES],
    ) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(AppError::Training(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(AppError::Training("training set is empty".to_string()));
        }

        let weights = labels.iter().map(|l| class_weights[l.index()]).collect();
        let (n_samples, n_features) = features.dim();

        Ok(Self {
            features,
            labels,
            weights,
            n_samples,
            n_features,
        })
    }

    /// Labels as class indices
    pub fn label_indices(&self) -> Vec<usize> {
        self.labels.iter().map(|l| l.index()).collect()
    }

    /// Number of distinct classes present
    pub fn n_present_classes(&self) -> usize {
        let mut seen = [false; N_CLASSES];
        for label in &self.labels {
            seen[label.index()] = true;
        }
        seen.iter().filter(|s| **s).count()
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Support-weighted precision
    pub precision: f64,

    /// Support-weighted recall
    pub recall: f64,

    /// Support-weighted F1 score
    pub f1_score: f64,

    /// Unweighted mean over reported classes
    pub macro_avg: AverageMetrics,

    /// Confusion matrix, rows are true labels and columns predictions, over
    /// all four classes
    pub confusion_matrix: Vec<Vec<usize>>,

    /// Per-class metrics for every class seen in truth or predictions
    pub per_class_metrics: Vec<ClassMetrics>,

    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weighted_avg(&self) -> AverageMetrics {
        AverageMetrics {
            precision: self.precision,
            recall: self.recall,
            f1_score: self.f1_score,
        }
    }

    pub fn class(&self, label: SeverityLabel) -> Option<&ClassMetrics> {
        self.per_class_metrics.iter().find(|m| m.label == label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: SeverityLabel,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model version
    pub version: String,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Training metrics
    pub training_metrics: ModelMetrics,

    /// Validation metrics
    pub validation_metrics: Option<ModelMetrics>,

    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
}

impl ModelMetadata {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            name: model_type.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_type,
            trained_at: chrono::Utc::now(),
            n_training_samples: 0,
            n_features: 0,
            training_metrics: ModelMetrics::new(),
            validation_metrics: None,
            hyperparameters: BTreeMap::new(),
        }
    }

    pub fn with_hyperparameter(mut self, key: &str, value: impl ToString) -> Self {
        self.hyperparameters
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_training_dataset_weights() {
        let features = Array2::zeros((3, 2));
        let labels = vec![
            SeverityLabel::NoAnomaly,
            SeverityLabel::HighAnomaly,
            SeverityLabel::NoAnomaly,
        ];
        let dataset =
            TrainingDataset::with_class_weights(features, labels, &[0.5, 1.0, 2.0, 3.0]).unwrap();

        assert_eq!(dataset.n_samples, 3);
        assert_eq!(dataset.n_features, 2);
        assert_eq!(dataset.weights.to_vec(), vec![0.5, 3.0, 0.5]);
        assert_eq!(dataset.label_indices(), vec![0, 3, 0]);
        assert_eq!(dataset.n_present_classes(), 2);
    }

    #[test]
    fn test_training_dataset_shape_mismatch() {
        let features = Array2::zeros((2, 2));
        let result = TrainingDataset::new(features, vec![SeverityLabel::NoAnomaly]);
        assert!(result.is_err());
    }

    #[test]
    fn test_model_type_parse() {
        assert_eq!(ModelType::from_str("rf").unwrap(), ModelType::RandomForest);
        assert_eq!(
            ModelType::from_str("Logistic_Regression").unwrap(),
            ModelType::LogisticRegression
        );
        assert_eq!(
            ModelType::from_str("xgboost").unwrap(),
            ModelType::GradientBoosting
        );
        assert!(ModelType::from_str("svm").is_err());
    }

    #[test]
    fn test_model_type_display() {
        assert_eq!(ModelType::LogisticRegression.to_string(), "Logistic Regression");
        assert_eq!(ModelType::RandomForest.to_string(), "Random Forest");
        assert_eq!(ModelType::GradientBoosting.code(), "gb");
    }

    #[test]
    fn test_models_config_enabled() {
        let mut config = ModelsConfig::default();
        assert_eq!(config.enabled(), ModelType::all());

        config.logistic_regression.enabled = false;
        assert_eq!(
            config.enabled(),
            vec![ModelType::RandomForest, ModelType::GradientBoosting]
        );
        assert_eq!(
            config.features_for(ModelType::LogisticRegression),
            VectorizerKind::Count
        );
    }

    #[test]
    fn test_settings_validation() {
        assert!(ModelsConfig::default().validate().is_ok());

        let mut config = ModelsConfig::default();
        config.gradient_boosting.subsample = 0.0;
        assert!(config.validate().is_err());

        let bad_ngrams = FeatureConfig {
            ngram_range: (2, 1),
            ..FeatureConfig::default()
        };
        assert!(bad_ngrams.validate().is_err());
    }

    #[test]
    fn test_prediction_creation() {
        let prediction = Prediction::new(SeverityLabel::LowAnomaly, 0.85).with_probabilities(
            vec![
                ("No Anomaly".to_string(), 0.15),
                ("Low Anomaly".to_string(), 0.85),
            ]
            .into_iter()
            .collect(),
        );

        assert_eq!(prediction.value, SeverityLabel::LowAnomaly);
        assert_eq!(prediction.probabilities.len(), 2);
    }
}

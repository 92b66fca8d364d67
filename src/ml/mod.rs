/// Machine learning over labeled log records
///
/// This module trains supervised models on the rule-derived labels:
/// - TF-IDF and count vectorization of projected feature strings
/// - Random Forest and Logistic Regression (smartcore)
/// - Softmax gradient boosting over smartcore regression trees
/// - Evaluation reports and a comparison across models

pub mod classifier;
pub mod evaluation;
pub mod features;
pub mod models;
pub mod service;

pub use classifier::{
    build_classifier, Classifier, GradientBoostingClassifier, LogisticRegressionClassifier,
    RandomForestClassifierWrapper,
};
pub use evaluation::{
    classification_report, comparison_table, confusion_matrix, evaluate, format_confusion_matrix,
};
pub use features::{StandardScaler, TextVectorizer};
pub use models::{
    ClassMetrics, EvaluationConfig, FeatureConfig, GradientBoostingSettings,
    LogisticRegressionSettings, ModelMetadata, ModelMetrics, ModelType, ModelsConfig, Prediction,
    RandomForestSettings, TrainingDataset, VectorizerKind,
};
pub use service::{
    DatasetSummary, ExperimentConfig, ExperimentOutcome, ExperimentReport, ExperimentRunner,
    ModelReport, PreparedData, TrainedModel,
};

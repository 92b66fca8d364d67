use crate::dataset::{
    train_test_split, DatasetConfig, RandomOverSampler, TextSample,
};
use crate::error::{AppError, Result};
use crate::metrics::{MODEL_ACCURACY, MODEL_TRAINING_DURATION_SECONDS};
use crate::ml::classifier::{build_classifier, Classifier};
use crate::ml::evaluation::{comparison_table, evaluate};
use crate::ml::features::{StandardScaler, TextVectorizer};
use crate::ml::models::{
    EvaluationConfig, FeatureConfig, ModelMetadata, ModelMetrics, ModelType, ModelsConfig,
    Prediction, TrainingDataset,
};
use crate::models::{LabelDistribution, SeverityLabel, N_CLASSES};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything an experiment run needs besides the samples
#[derive(Debug, Clone, Default)]
pub struct ExperimentConfig {
    pub dataset: DatasetConfig,
    pub vectorizer: FeatureConfig,
    pub models: ModelsConfig,
    pub evaluation: EvaluationConfig,
}

/// Train/test data after splitting and oversampling
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Training samples, oversampled when enabled
    pub train: Vec<TextSample>,
    pub test: Vec<TextSample>,
    /// Weight per class, derived from the training samples models see
    pub class_weights: [f64; N_CLASSES],
}

/// Label counts and split sizes recorded with each run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub n_samples: usize,
    pub n_train: usize,
    pub n_train_resampled: usize,
    pub n_test: usize,
    pub label_distribution: LabelDistribution,
    pub train_distribution: LabelDistribution,
    pub test_distribution: LabelDistribution,
    pub class_weights: [f64; N_CLASSES],
    pub stratified: bool,
    pub oversampled: bool,
    pub seed: u64,
}

/// Outcome of one model in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub model_type: ModelType,
    pub metadata: ModelMetadata,
    /// Metrics on the held-out test split
    pub metrics: ModelMetrics,
    pub training_duration_ms: u64,
    pub vocabulary_size: usize,
}

/// JSON-serializable record of an experiment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dataset: DatasetSummary,
    pub models: Vec<ModelReport>,
}

impl ExperimentReport {
    /// Comparison of all models in run order
    pub fn comparison_table(&self) -> String {
        let rows: Vec<(ModelType, &ModelMetrics)> = self
            .models
            .iter()
            .map(|m| (m.model_type, &m.metrics))
            .collect();
        comparison_table(&rows)
    }

    /// Model with the highest weighted F1 on the test split
    pub fn best_model(&self) -> Option<&ModelReport> {
        self.models
            .iter()
            .max_by(|a, b| a.metrics.f1_score.total_cmp(&b.metrics.f1_score))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A fitted vectorizer, optional scaler and classifier, ready to score text
pub struct TrainedModel {
    vectorizer: TextVectorizer,
    scaler: Option<StandardScaler>,
    classifier: Box<dyn Classifier>,
}

impl TrainedModel {
    pub fn model_type(&self) -> ModelType {
        self.classifier.model_type()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.classifier.metadata()
    }

    fn features<S: AsRef<str>>(&self, texts: &[S]) -> Result<Array2<f64>> {
        let features = self.vectorizer.transform(texts)?;
        match &self.scaler {
            Some(scaler) => scaler.transform(&features),
            None => Ok(features),
        }
    }

    /// Predict labels for feature strings
    pub fn predict<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<SeverityLabel>> {
        let features = self.features(texts)?;
        self.classifier.predict(&features)
    }

    /// Predict one feature string with class probabilities
    pub fn predict_one(&self, text: &str) -> Result<Prediction<SeverityLabel>> {
        let features = self.features(&[text])?;
        let label = self
            .classifier
            .predict(&features)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("empty prediction".to_string()))?;
        let proba = self.classifier.predict_proba(&features)?;

        let probabilities: HashMap<String, f64> = SeverityLabel::all()
            .into_iter()
            .map(|l| (l.name().to_string(), proba[[0, l.index()]]))
            .collect();

        Ok(Prediction::new(label, proba[[0, label.index()]]).with_probabilities(probabilities))
    }
}

/// Results of a run: the report plus the trained models
pub struct ExperimentOutcome {
    pub report: ExperimentReport,
    pub models: Vec<TrainedModel>,
}

impl ExperimentOutcome {
    pub fn model(&self, model_type: ModelType) -> Option<&TrainedModel> {
        self.models.iter().find(|m| m.model_type() == model_type)
    }
}

/// Splits labeled samples, trains the requested models concurrently and
/// evaluates each on the held-out split
pub struct ExperimentRunner {
    config: Arc<ExperimentConfig>,
}

impl ExperimentRunner {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Split, oversample and derive class weights
    pub fn prepare(&self, samples: &[TextSample]) -> Result<(PreparedData, DatasetSummary)> {
        let dataset = &self.config.dataset;
        dataset.check()?;

        let labels: Vec<SeverityLabel> = samples.iter().map(|s| s.label).collect();
        let label_distribution = LabelDistribution::from_labels(&labels);
        if label_distribution.present().len() < 2 {
            return Err(AppError::Validation(format!(
                "training needs at least two distinct labels, found {}",
                label_distribution.present().len()
            )));
        }

        let split = train_test_split(samples, dataset.test_size, dataset.seed, dataset.stratify)?;
        let train_distribution = LabelDistribution::from_labels(&split.train_labels());
        let test_distribution = LabelDistribution::from_labels(&split.test_labels());
        let n_train = split.train.len();

        let train = if dataset.oversample {
            RandomOverSampler::new(dataset.seed).fit_resample(&split.train)
        } else {
            split.train
        };

        let resampled_labels: Vec<SeverityLabel> = train.iter().map(|s| s.label).collect();
        let class_weights = dataset
            .class_weights
            .compute(&LabelDistribution::from_labels(&resampled_labels));

        let summary = DatasetSummary {
            n_samples: samples.len(),
            n_train,
            n_train_resampled: train.len(),
            n_test: split.test.len(),
            label_distribution,
            train_distribution,
            test_distribution,
            class_weights,
            stratified: dataset.stratify,
            oversampled: dataset.oversample,
            seed: dataset.seed,
        };

        info!(
            samples = summary.n_samples,
            train = summary.n_train,
            train_resampled = summary.n_train_resampled,
            test = summary.n_test,
            "Prepared dataset"
        );

        Ok((
            PreparedData {
                train,
                test: split.test,
                class_weights,
            },
            summary,
        ))
    }

    /// Run the experiment for the given models
    pub async fn run(&self, samples: &[TextSample], models: &[ModelType]) -> Result<ExperimentOutcome> {
        if models.is_empty() {
            return Err(AppError::Validation("no models selected".to_string()));
        }

        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, models = models.len(), "Starting experiment");

        let (prepared, summary) = self.prepare(samples)?;
        let prepared = Arc::new(prepared);

        let mut handles = Vec::with_capacity(models.len());
        for &model_type in models {
            let config = Arc::clone(&self.config);
            let data = Arc::clone(&prepared);
            handles.push((
                model_type,
                tokio::task::spawn_blocking(move || train_model(model_type, &config, &data)),
            ));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut trained = Vec::with_capacity(handles.len());
        for (model_type, handle) in handles {
            let (model, report) = handle.await.map_err(|e| {
                AppError::Internal(format!("{} training task failed: {}", model_type, e))
            })??;

            MODEL_TRAINING_DURATION_SECONDS
                .with_label_values(&[model_type.code()])
                .observe(report.training_duration_ms as f64 / 1000.0);
            MODEL_ACCURACY
                .with_label_values(&[model_type.code()])
                .set(report.metrics.accuracy);

            info!(
                model = %model_type,
                accuracy = report.metrics.accuracy,
                f1 = report.metrics.f1_score,
                duration_ms = report.training_duration_ms,
                "Model evaluated"
            );
            reports.push(report);
            trained.push(model);
        }

        let report = ExperimentReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dataset: summary,
            models: reports,
        };

        Ok(ExperimentOutcome {
            report,
            models: trained,
        })
    }
}

/// Fit the vectorizer on the training texts, train one model and evaluate it
fn train_model(
    model_type: ModelType,
    config: &ExperimentConfig,
    data: &PreparedData,
) -> Result<(TrainedModel, ModelReport)> {
    let kind = config.models.features_for(model_type);
    debug!(model = %model_type, features = %kind, "Vectorizing");

    let train_texts: Vec<&str> = data.train.iter().map(|s| s.text.as_str()).collect();
    let test_texts: Vec<&str> = data.test.iter().map(|s| s.text.as_str()).collect();

    let mut vectorizer = TextVectorizer::new(config.vectorizer.clone(), kind);
    let mut x_train = vectorizer.fit_transform(&train_texts)?;
    let mut x_test = vectorizer.transform(&test_texts)?;

    let scaler = if model_type == ModelType::LogisticRegression
        && config.models.logistic_regression.scale
    {
        let mut scaler = StandardScaler::new();
        x_train = scaler.fit_transform(&x_train)?;
        x_test = scaler.transform(&x_test)?;
        Some(scaler)
    } else {
        None
    };

    let train_labels: Vec<SeverityLabel> = data.train.iter().map(|s| s.label).collect();
    let test_labels: Vec<SeverityLabel> = data.test.iter().map(|s| s.label).collect();
    let dataset = TrainingDataset::with_class_weights(x_train, train_labels, &data.class_weights)?;

    let mut classifier = build_classifier(model_type, &config.models, config.dataset.seed);
    let start = Instant::now();
    let training_metrics = classifier.train(&dataset)?;
    let training_duration_ms = start.elapsed().as_millis() as u64;

    let predictions = classifier.predict(&x_test)?;
    let metrics = evaluate(&test_labels, &predictions, config.evaluation.zero_division);
    if metrics.accuracy + 0.2 < training_metrics.accuracy {
        warn!(
            model = %model_type,
            train_accuracy = training_metrics.accuracy,
            test_accuracy = metrics.accuracy,
            "Large gap between training and test accuracy"
        );
    }

    let mut metadata = classifier.metadata().clone();
    metadata.validation_metrics = Some(metrics.clone());

    let report = ModelReport {
        model_type,
        metadata,
        metrics,
        training_duration_ms,
        vocabulary_size: vectorizer.vocab_size(),
    };
    let model = TrainedModel {
        vectorizer,
        scaler,
        classifier,
    };

    Ok((model, report))
}

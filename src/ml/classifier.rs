use crate::error::{AppError, Result};
use crate::ml::evaluation::{evaluate, DEFAULT_ZERO_DIVISION};
use crate::ml::models::{
    GradientBoostingSettings, LogisticRegressionSettings, ModelMetadata, ModelMetrics, ModelType,
    ModelsConfig, RandomForestSettings, TrainingDataset,
};
use crate::models::{SeverityLabel, N_CLASSES};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::{LogisticRegression, LogisticRegressionParameters};
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use tracing::debug;

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train the classifier, returning metrics on the training data
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics>;

    /// Predict class labels
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<SeverityLabel>>;

    /// Predict class probabilities (n_samples × 4, columns in label order)
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Get model type
    fn model_type(&self) -> ModelType;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Build an untrained classifier from its settings
pub fn build_classifier(model_type: ModelType, config: &ModelsConfig, seed: u64) -> Box<dyn Classifier> {
    match model_type {
        ModelType::RandomForest => Box::new(RandomForestClassifierWrapper::new(
            config.random_forest.clone(),
            seed,
        )),
        ModelType::LogisticRegression => Box::new(LogisticRegressionClassifier::new(
            config.logistic_regression.clone(),
        )),
        ModelType::GradientBoosting => Box::new(GradientBoostingClassifier::new(
            config.gradient_boosting.clone(),
            seed,
        )),
    }
}

fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

fn labels_to_i32(labels: &[SeverityLabel]) -> Vec<i32> {
    labels.iter().map(|l| l.index() as i32).collect()
}

fn i32_to_labels(raw: &[i32]) -> Result<Vec<SeverityLabel>> {
    raw.iter()
        .map(|&x| {
            usize::try_from(x)
                .ok()
                .and_then(SeverityLabel::from_index)
                .ok_or_else(|| AppError::Internal(format!("model predicted unknown class {}", x)))
        })
        .collect()
}

/// One-hot probabilities for models that only expose hard predictions
fn one_hot(predictions: &[SeverityLabel]) -> Array2<f64> {
    let mut proba = Array2::zeros((predictions.len(), N_CLASSES));
    for (i, pred) in predictions.iter().enumerate() {
        proba[[i, pred.index()]] = 1.0;
    }
    proba
}

fn not_trained() -> AppError {
    AppError::Internal("Model not trained".to_string())
}

fn record_training(metadata: &mut ModelMetadata, dataset: &TrainingDataset, metrics: &ModelMetrics) {
    metadata.n_training_samples = dataset.n_samples;
    metadata.n_features = dataset.n_features;
    metadata.trained_at = chrono::Utc::now();
    metadata.training_metrics = metrics.clone();
}

/// Random Forest Classifier
pub struct RandomForestClassifierWrapper {
    /// Model metadata
    metadata: ModelMetadata,

    /// Trained model
    model: Option<RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>>,

    settings: RandomForestSettings,

    seed: u64,
}

impl RandomForestClassifierWrapper {
    pub fn new(settings: RandomForestSettings, seed: u64) -> Self {
        let metadata = ModelMetadata::new(ModelType::RandomForest)
            .with_hyperparameter("n_trees", settings.n_trees)
            .with_hyperparameter("max_depth", settings.max_depth)
            .with_hyperparameter("min_samples_split", settings.min_samples_split)
            .with_hyperparameter("min_samples_leaf", settings.min_samples_leaf)
            .with_hyperparameter("features", settings.features)
            .with_hyperparameter("seed", seed);

        Self {
            metadata,
            model: None,
            settings,
            seed,
        }
    }
}

impl Classifier for RandomForestClassifierWrapper {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        let x = ndarray_to_densematrix(&dataset.features);
        let y = labels_to_i32(&dataset.labels);

        let params = RandomForestClassifierParameters::default()
            .with_n_trees(self.settings.n_trees)
            .with_max_depth(self.settings.max_depth)
            .with_min_samples_split(self.settings.min_samples_split)
            .with_min_samples_leaf(self.settings.min_samples_leaf)
            .with_seed(self.seed);

        let model = RandomForestClassifier::fit(&x, &y, params)
            .map_err(|e| AppError::Training(format!("Failed to train random forest: {}", e)))?;
        self.model = Some(model);

        let predictions = self.predict(&dataset.features)?;
        let metrics = evaluate(&dataset.labels, &predictions, DEFAULT_ZERO_DIVISION);
        record_training(&mut self.metadata, dataset, &metrics);

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<SeverityLabel>> {
        let model = self.model.as_ref().ok_or_else(not_trained)?;
        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;
        i32_to_labels(&predictions)
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(one_hot(&self.predict(features)?))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// Logistic Regression Classifier
pub struct LogisticRegressionClassifier {
    /// Model metadata
    metadata: ModelMetadata,

    /// Trained model
    model: Option<LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>>>,

    settings: LogisticRegressionSettings,
}

impl LogisticRegressionClassifier {
    pub fn new(settings: LogisticRegressionSettings) -> Self {
        let metadata = ModelMetadata::new(ModelType::LogisticRegression)
            .with_hyperparameter("alpha", settings.alpha)
            .with_hyperparameter("features", settings.features)
            .with_hyperparameter("scale", settings.scale);

        Self {
            metadata,
            model: None,
            settings,
        }
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        let x = ndarray_to_densematrix(&dataset.features);
        let y = labels_to_i32(&dataset.labels);

        let params = LogisticRegressionParameters::default().with_alpha(self.settings.alpha);
        let model = LogisticRegression::fit(&x, &y, params).map_err(|e| {
            AppError::Training(format!("Failed to train logistic regression: {}", e))
        })?;
        self.model = Some(model);

        let predictions = self.predict(&dataset.features)?;
        let metrics = evaluate(&dataset.labels, &predictions, DEFAULT_ZERO_DIVISION);
        record_training(&mut self.metadata, dataset, &metrics);

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<SeverityLabel>> {
        let model = self.model.as_ref().ok_or_else(not_trained)?;
        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;
        i32_to_labels(&predictions)
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(one_hot(&self.predict(features)?))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::LogisticRegression
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// A regression tree fitted on a subset of columns
struct BoostedTree {
    columns: Vec<usize>,
    tree: DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>,
}

impl BoostedTree {
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>> {
        let x = ndarray_to_densematrix(&features.select(Axis(1), &self.columns));
        self.tree
            .predict(&x)
            .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))
    }
}

/// Multi-class gradient boosting with softmax loss.
///
/// Each round fits one regression tree per present class to the
/// class-weighted negative gradient `w * (y - p)`, on a row sample shared by
/// the round and a column sample drawn per tree. Classes absent from the
/// training data get probability 0.
pub struct GradientBoostingClassifier {
    metadata: ModelMetadata,

    settings: GradientBoostingSettings,

    seed: u64,

    /// Classes seen during training
    present: [bool; N_CLASSES],

    /// `rounds[m][k]` is the tree for class `k` in round `m`
    rounds: Vec<Vec<Option<BoostedTree>>>,

    trained: bool,
}

impl GradientBoostingClassifier {
    pub fn new(settings: GradientBoostingSettings, seed: u64) -> Self {
        let metadata = ModelMetadata::new(ModelType::GradientBoosting)
            .with_hyperparameter("n_rounds", settings.n_rounds)
            .with_hyperparameter("learning_rate", settings.learning_rate)
            .with_hyperparameter("max_depth", settings.max_depth)
            .with_hyperparameter("min_child_weight", settings.min_child_weight)
            .with_hyperparameter("subsample", settings.subsample)
            .with_hyperparameter("colsample_bytree", settings.colsample_bytree)
            .with_hyperparameter("features", settings.features)
            .with_hyperparameter("seed", seed);

        Self {
            metadata,
            settings,
            seed,
            present: [false; N_CLASSES],
            rounds: Vec::new(),
            trained: false,
        }
    }

    fn tree_parameters(&self) -> DecisionTreeRegressorParameters {
        let min_leaf = self.settings.min_child_weight.max(1);
        DecisionTreeRegressorParameters::default()
            .with_max_depth(self.settings.max_depth)
            .with_min_samples_leaf(min_leaf)
            .with_min_samples_split((2 * min_leaf).max(2))
    }

    /// Raw additive scores (n_samples × 4)
    fn decision_function(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let mut scores = Array2::zeros((features.nrows(), N_CLASSES));
        for round in &self.rounds {
            for (class, tree) in round.iter().enumerate() {
                if let Some(tree) = tree {
                    let update = tree.predict(features)?;
                    for (row, value) in update.into_iter().enumerate() {
                        scores[[row, class]] += self.settings.learning_rate * value;
                    }
                }
            }
        }
        Ok(scores)
    }

    /// Row-wise softmax over present classes
    fn softmax(&self, scores: &Array2<f64>) -> Array2<f64> {
        let mut proba = Array2::zeros(scores.raw_dim());
        for (row, mut out) in scores.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            let max = (0..N_CLASSES)
                .filter(|&k| self.present[k])
                .map(|k| row[k])
                .fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for k in (0..N_CLASSES).filter(|&k| self.present[k]) {
                out[k] = (row[k] - max).exp();
                total += out[k];
            }
            if total > 0.0 {
                out.mapv_inplace(|v| v / total);
            }
        }
        proba
    }

    fn sample_size(total: usize, fraction: f64) -> usize {
        ((total as f64 * fraction).round() as usize).clamp(1, total)
    }
}

impl Classifier for GradientBoostingClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        if dataset.n_features == 0 {
            return Err(AppError::Training(
                "gradient boosting needs at least one feature".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let params = self.tree_parameters();
        let n_rows = dataset.n_samples;
        let n_cols = dataset.n_features;

        self.present = [false; N_CLASSES];
        for label in &dataset.labels {
            self.present[label.index()] = true;
        }
        self.rounds.clear();

        let mut targets: Array2<f64> = Array2::zeros((n_rows, N_CLASSES));
        for (row, label) in dataset.labels.iter().enumerate() {
            targets[[row, label.index()]] = 1.0;
        }

        let mut scores: Array2<f64> = Array2::zeros((n_rows, N_CLASSES));
        let row_count = Self::sample_size(n_rows, self.settings.subsample);
        let col_count = Self::sample_size(n_cols, self.settings.colsample_bytree);

        for round in 0..self.settings.n_rounds {
            let proba = self.softmax(&scores);
            let mut rows = sample(&mut rng, n_rows, row_count).into_vec();
            rows.sort_unstable();
            let round_x = dataset.features.select(Axis(0), &rows);

            let mut trees = Vec::with_capacity(N_CLASSES);
            for class in 0..N_CLASSES {
                if !self.present[class] {
                    trees.push(None);
                    continue;
                }

                let mut columns = sample(&mut rng, n_cols, col_count).into_vec();
                columns.sort_unstable();

                let gradient: Vec<f64> = rows
                    .iter()
                    .map(|&r| dataset.weights[r] * (targets[[r, class]] - proba[[r, class]]))
                    .collect();
                let x = ndarray_to_densematrix(&round_x.select(Axis(1), &columns));
                let tree = DecisionTreeRegressor::fit(&x, &gradient, params.clone())
                    .map_err(|e| {
                        AppError::Training(format!("Failed to fit boosting tree: {}", e))
                    })?;

                let boosted = BoostedTree { columns, tree };
                let update = Array1::from(boosted.predict(&dataset.features)?);
                let mut column = scores.column_mut(class);
                column.scaled_add(self.settings.learning_rate, &update);
                trees.push(Some(boosted));
            }
            self.rounds.push(trees);

            if round % 10 == 0 {
                debug!(round, "Gradient boosting round complete");
            }
        }
        self.trained = true;

        let predictions = self.predict(&dataset.features)?;
        let metrics = evaluate(&dataset.labels, &predictions, DEFAULT_ZERO_DIVISION);
        record_training(&mut self.metadata, dataset, &metrics);

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<SeverityLabel>> {
        let proba = self.predict_proba(features)?;
        proba
            .axis_iter(Axis(0))
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &p)| {
                        if p > best.1 {
                            (k, p)
                        } else {
                            best
                        }
                    })
                    .0;
                SeverityLabel::from_index(best)
                    .ok_or_else(|| AppError::Internal(format!("unknown class {}", best)))
            })
            .collect()
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.trained {
            return Err(not_trained());
        }
        let scores = self.decision_function(features)?;
        Ok(self.softmax(&scores))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::GradientBoosting
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two informative columns, one per class pair, plus a noise column
    fn create_test_dataset(n_samples: usize) -> TrainingDataset {
        let mut features = Array2::zeros((n_samples, 3));
        let mut labels = Vec::with_capacity(n_samples);
        for i in 0..n_samples {
            let label = SeverityLabel::from_index(i % 3).unwrap();
            match label {
                SeverityLabel::NoAnomaly => features[[i, 0]] = 1.0,
                SeverityLabel::LowAnomaly => features[[i, 1]] = 1.0,
                _ => {
                    features[[i, 0]] = 1.0;
                    features[[i, 1]] = 1.0;
                }
            }
            features[[i, 2]] = (i % 7) as f64 / 7.0;
            labels.push(label);
        }
        TrainingDataset::new(features, labels).unwrap()
    }

    fn small_gb() -> GradientBoostingSettings {
        GradientBoostingSettings {
            n_rounds: 20,
            learning_rate: 0.5,
            max_depth: 3,
            min_child_weight: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            ..GradientBoostingSettings::default()
        }
    }

    #[test]
    fn test_random_forest_classifier() {
        let dataset = create_test_dataset(60);
        let settings = RandomForestSettings {
            n_trees: 10,
            ..RandomForestSettings::default()
        };
        let mut classifier = RandomForestClassifierWrapper::new(settings, 42);
        assert!(!classifier.is_trained());

        let metrics = classifier.train(&dataset).unwrap();

        assert!(classifier.is_trained());
        assert!(metrics.accuracy > 0.9);
        assert_eq!(classifier.metadata().n_training_samples, 60);
        assert_eq!(classifier.metadata().hyperparameters["n_trees"], "10");
    }

    #[test]
    fn test_logistic_regression_classifier() {
        let dataset = create_test_dataset(60);
        let mut classifier = LogisticRegressionClassifier::new(LogisticRegressionSettings::default());

        let metrics = classifier.train(&dataset).unwrap();

        assert!(classifier.is_trained());
        assert!(metrics.accuracy >= 0.0 && metrics.accuracy <= 1.0);
        let proba = classifier.predict_proba(&dataset.features).unwrap();
        assert_eq!(proba.shape(), &[60, N_CLASSES]);
    }

    #[test]
    fn test_gradient_boosting_learns_separable_data() {
        let dataset = create_test_dataset(60);
        let mut classifier = GradientBoostingClassifier::new(small_gb(), 42);

        let metrics = classifier.train(&dataset).unwrap();

        assert!(metrics.accuracy > 0.95);
    }

    #[test]
    fn test_gradient_boosting_probabilities() {
        let dataset = create_test_dataset(30);
        let mut classifier = GradientBoostingClassifier::new(small_gb(), 7);
        classifier.train(&dataset).unwrap();

        let proba = classifier.predict_proba(&dataset.features).unwrap();
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            // High anomaly never appears in training
            assert_eq!(row[SeverityLabel::HighAnomaly.index()], 0.0);
        }
    }

    #[test]
    fn test_gradient_boosting_with_subsampling_is_reproducible() {
        let dataset = create_test_dataset(45);
        let settings = GradientBoostingSettings {
            subsample: 0.7,
            colsample_bytree: 0.67,
            ..small_gb()
        };

        let mut a = GradientBoostingClassifier::new(settings.clone(), 3);
        let mut b = GradientBoostingClassifier::new(settings, 3);
        a.train(&dataset).unwrap();
        b.train(&dataset).unwrap();

        assert_eq!(
            a.predict_proba(&dataset.features).unwrap(),
            b.predict_proba(&dataset.features).unwrap()
        );
    }

    #[test]
    fn test_untrained_model_errors() {
        let classifier = GradientBoostingClassifier::new(small_gb(), 1);
        assert!(classifier.predict(&Array2::zeros((1, 3))).is_err());

        let classifier = LogisticRegressionClassifier::new(LogisticRegressionSettings::default());
        assert!(classifier.predict(&Array2::zeros((1, 3))).is_err());
    }

    #[test]
    fn test_build_classifier() {
        let config = ModelsConfig::default();
        for model_type in ModelType::all() {
            let classifier = build_classifier(model_type, &config, 42);
            assert_eq!(classifier.model_type(), model_type);
            assert!(!classifier.is_trained());
        }
    }
}

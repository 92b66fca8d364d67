use crate::dataset::DatasetConfig;
use crate::error::{AppError, Result};
use crate::labeling::{
    LabelingConfig, LabelingPipeline, MissingFieldPolicy, RecordNormalizer, SeverityLabeler,
    DEFAULT_ERROR_KEYWORDS, DEFAULT_EXCEPTION_KEYWORDS, DEFAULT_PRIORITY_THRESHOLD,
    DEFAULT_TRANSPORT_KEYWORDS,
};
use crate::ml::{EvaluationConfig, ExperimentConfig, FeatureConfig, ModelsConfig};
use crate::models::FieldMapping;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "LOG_ANOMALY_CONFIG";

/// Prefix for per-key environment overrides (`LOG_ANOMALY__SECTION__KEY`)
pub const ENV_PREFIX: &str = "LOG_ANOMALY";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Severity rule settings
    #[serde(default)]
    pub labeling: LabelingSettings,

    /// Source keys of the labeled fields
    #[serde(default)]
    pub fields: FieldMapping,

    /// Batch processing
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Train/test preparation
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Text vectorization
    #[serde(default)]
    pub vectorizer: FeatureConfig,

    /// Per-model hyperparameters
    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, the file named by
    /// `LOG_ANOMALY_CONFIG` (if set) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load configuration with an explicit file, which must exist when given
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            // Override with environment variables (prefix: LOG_ANOMALY__)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("labeling.error_keywords")
                    .with_list_parse_key("labeling.exception_keywords")
                    .with_list_parse_key("labeling.transport_keywords")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults, without environment
    /// overrides
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        section("labeling", self.labeling.validate())?;
        section("fields", self.fields.validate())?;
        section("vectorizer", self.vectorizer.validate())?;
        section("models", self.models.validate())?;
        section("evaluation", self.evaluation.validate())?;
        self.dataset.check()?;
        self.labeling_config()?;

        if self.models.enabled().is_empty() {
            return Err(AppError::Configuration(
                "[models] at least one model must be enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// The validated keyword and threshold set for the labeler
    pub fn labeling_config(&self) -> Result<LabelingConfig> {
        self.labeling.to_labeling_config()
    }

    /// A labeling pipeline wired from this configuration
    pub fn pipeline(&self) -> Result<LabelingPipeline> {
        let labeler = SeverityLabeler::new(self.labeling_config()?);
        let normalizer = RecordNormalizer::new(self.fields.clone());
        Ok(LabelingPipeline::new(normalizer, labeler)
            .with_policy(self.pipeline.on_missing_field)
            .with_parallelism(self.pipeline.parallel))
    }

    /// Settings for an experiment run
    pub fn experiment_config(&self) -> ExperimentConfig {
        ExperimentConfig {
            dataset: self.dataset.clone(),
            vectorizer: self.vectorizer.clone(),
            models: self.models.clone(),
            evaluation: self.evaluation.clone(),
        }
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn section(
    name: &str,
    result: std::result::Result<(), validator::ValidationErrors>,
) -> Result<()> {
    result.map_err(|e| AppError::Configuration(format!("[{}] {}", name, e)))
}

/// `[labeling]`: raw keyword lists before normalization
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LabelingSettings {
    /// Maximum priority (inclusive) for the high-anomaly tier
    #[serde(default = "default_priority_threshold")]
    #[validate(range(max = 7))]
    pub priority_threshold: u8,

    #[serde(default = "default_error_keywords")]
    pub error_keywords: Vec<String>,

    #[serde(default = "default_exception_keywords")]
    pub exception_keywords: Vec<String>,

    #[serde(default = "default_transport_keywords")]
    pub transport_keywords: Vec<String>,

    /// Reject empty keyword lists
    #[serde(default = "default_true")]
    pub require_keywords: bool,
}

impl Default for LabelingSettings {
    fn default() -> Self {
        Self {
            priority_threshold: default_priority_threshold(),
            error_keywords: default_error_keywords(),
            exception_keywords: default_exception_keywords(),
            transport_keywords: default_transport_keywords(),
            require_keywords: true,
        }
    }
}

impl LabelingSettings {
    pub fn to_labeling_config(&self) -> Result<LabelingConfig> {
        LabelingConfig::new(
            self.priority_threshold,
            &self.error_keywords,
            &self.exception_keywords,
            &self.transport_keywords,
            self.require_keywords,
        )
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub on_missing_field: MissingFieldPolicy,

    /// Label records on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            on_missing_field: MissingFieldPolicy::Fail,
            parallel: true,
        }
    }
}

/// `[observability]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_priority_threshold() -> u8 {
    DEFAULT_PRIORITY_THRESHOLD
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn default_error_keywords() -> Vec<String> {
    to_strings(DEFAULT_ERROR_KEYWORDS)
}

fn default_exception_keywords() -> Vec<String> {
    to_strings(DEFAULT_EXCEPTION_KEYWORDS)
}

fn default_transport_keywords() -> Vec<String> {
    to_strings(DEFAULT_TRANSPORT_KEYWORDS)
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ClassWeights;
    use crate::ml::{ModelType, VectorizerKind};

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_priority_threshold(), 4);
        assert_eq!(default_log_level(), "info");
        assert!(default_true());
    }

    #[test]
    fn test_embedded_defaults_match_code_defaults() {
        let config = Config::from_toml_str("").unwrap();
        let defaults = Config::default();

        assert_eq!(config.labeling.error_keywords, defaults.labeling.error_keywords);
        assert_eq!(
            config.labeling.exception_keywords,
            defaults.labeling.exception_keywords
        );
        assert_eq!(
            config.labeling.transport_keywords,
            defaults.labeling.transport_keywords
        );
        assert_eq!(config.labeling_config().unwrap(), LabelingConfig::default());
        assert_eq!(config.fields.boot_id, "_BOOT_ID");
        assert_eq!(config.pipeline.on_missing_field, MissingFieldPolicy::Fail);
        assert_eq!(config.dataset.seed, 42);
        assert_eq!(config.vectorizer.max_features, 1000);
        assert_eq!(config.models.random_forest.n_trees, 40);
        assert_eq!(
            config.models.logistic_regression.features,
            VectorizerKind::Count
        );
        assert_eq!(config.models.gradient_boosting.colsample_bytree, 0.8);
        assert_eq!(config.evaluation.zero_division, 1.0);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_toml_str(
            r#"
            [labeling]
            priority_threshold = 3
            transport_keywords = ["kernel"]

            [pipeline]
            on_missing_field = "skip"

            [dataset]
            class_weights = { manual = [1.0, 10.0, 34.0, 53.0] }

            [models.logistic_regression]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.labeling_config().unwrap().priority_threshold(), 3);
        assert_eq!(config.pipeline.on_missing_field, MissingFieldPolicy::Skip);
        assert_eq!(
            config.dataset.class_weights,
            ClassWeights::Manual([1.0, 10.0, 34.0, 53.0])
        );
        assert_eq!(
            config.models.enabled(),
            vec![ModelType::RandomForest, ModelType::GradientBoosting]
        );
        // Untouched keys keep their defaults
        assert_eq!(config.labeling.error_keywords.len(), 11);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = Config::from_toml_str("[labeling]\npriority_threshold = 9\n");
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_keyword_matching_none_rejected() {
        let result = Config::from_toml_str("[labeling]\nerror_keywords = [\"on\"]\n");
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_empty_list_policy() {
        let settings: LabelingSettings = toml::from_str("exception_keywords = []").unwrap();
        assert!(settings.to_labeling_config().is_err());

        let settings: LabelingSettings =
            toml::from_str("exception_keywords = []\nrequire_keywords = false").unwrap();
        let config = settings.to_labeling_config().unwrap();
        assert!(config.exception_keywords().is_empty());
        assert_eq!(config.error_keywords().len(), 11);
    }

    #[test]
    fn test_all_models_disabled_rejected() {
        let result = Config::from_toml_str(
            r#"
            [models.random_forest]
            enabled = false
            [models.logistic_regression]
            enabled = false
            [models.gradient_boosting]
            enabled = false
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[labeling]"));
        assert!(rendered.contains("priority_threshold = 4"));

        let parsed = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.labeling_config().unwrap(), LabelingConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[dataset]\ntest_size = 0.3\n").unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.dataset.test_size, 0.3);

        let missing = dir.path().join("missing.toml");
        assert!(Config::load_from(Some(&missing)).is_err());
    }
}

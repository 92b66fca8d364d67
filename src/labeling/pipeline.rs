use crate::error::{AppError, Result};
use crate::labeling::labeler::{LabelExplanation, SeverityLabeler};
use crate::labeling::normalizer::RecordNormalizer;
use crate::labeling::projector::project_features;
use crate::metrics::{LABELING_DURATION_SECONDS, RECORDS_PROCESSED_TOTAL, SEVERITY_LABELS_TOTAL};
use crate::models::{LabelDistribution, NormalizedRecord, RawRecord, SeverityLabel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What to do with a record that cannot be normalized
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Abort the batch at the first faulty record
    #[default]
    Fail,
    /// Drop the record, log it and keep going
    Skip,
}

/// One labeled log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRecord {
    /// Position of the record in the input batch
    pub index: usize,
    pub record: NormalizedRecord,
    pub label: SeverityLabel,
    /// Projected text feature
    pub features: String,
}

/// Record dropped under the skip policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub field: String,
    pub reason: String,
}

/// Batch-level counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub records_seen: usize,
    pub records_labeled: usize,
    pub records_skipped: usize,
    pub distribution: LabelDistribution,
    pub duration_ms: u64,
}

/// Output of a labeling pass
#[derive(Debug, Clone, Default)]
pub struct LabeledBatch {
    pub records: Vec<LabeledRecord>,
    pub skipped: Vec<SkippedRecord>,
    pub summary: BatchSummary,
}

impl LabeledBatch {
    /// `(feature_string, label)` pairs in input order
    pub fn training_pairs(&self) -> Vec<(String, SeverityLabel)> {
        self.records
            .iter()
            .map(|r| (r.features.clone(), r.label))
            .collect()
    }

    pub fn labels(&self) -> Vec<SeverityLabel> {
        self.records.iter().map(|r| r.label).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Normalize, label and project a batch of raw records
#[derive(Debug, Clone)]
pub struct LabelingPipeline {
    normalizer: RecordNormalizer,
    labeler: SeverityLabeler,
    policy: MissingFieldPolicy,
    parallel: bool,
}

impl Default for LabelingPipeline {
    fn default() -> Self {
        Self::new(RecordNormalizer::default(), SeverityLabeler::default())
    }
}

impl LabelingPipeline {
    pub fn new(normalizer: RecordNormalizer, labeler: SeverityLabeler) -> Self {
        Self {
            normalizer,
            labeler,
            policy: MissingFieldPolicy::default(),
            parallel: true,
        }
    }

    pub fn with_policy(mut self, policy: MissingFieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn policy(&self) -> MissingFieldPolicy {
        self.policy
    }

    pub fn labeler(&self) -> &SeverityLabeler {
        &self.labeler
    }

    /// Label one raw record at `index`
    pub fn label_one(&self, index: usize, raw: &RawRecord) -> Result<LabeledRecord> {
        let record = self.normalizer.normalize(raw).map_err(|e| e.at(index))?;
        let label = self.labeler.label(&record);
        let features = project_features(&record);

        Ok(LabeledRecord {
            index,
            record,
            label,
            features,
        })
    }

    /// Explain the label of one raw record
    pub fn explain_one(&self, index: usize, raw: &RawRecord) -> Result<LabelExplanation> {
        let record = self.normalizer.normalize(raw).map_err(|e| e.at(index))?;
        Ok(self.labeler.explain(&record))
    }

    /// Run the batch. Output order follows input order regardless of
    /// parallelism.
    pub fn run(&self, raw_records: &[RawRecord]) -> Result<LabeledBatch> {
        let started = Instant::now();
        info!(
            records = raw_records.len(),
            policy = ?self.policy,
            parallel = self.parallel,
            "Labeling batch"
        );

        let results: Vec<Result<LabeledRecord>> = if self.parallel {
            raw_records
                .par_iter()
                .enumerate()
                .map(|(index, raw)| self.label_one(index, raw))
                .collect()
        } else {
            raw_records
                .iter()
                .enumerate()
                .map(|(index, raw)| self.label_one(index, raw))
                .collect()
        };

        let mut batch = LabeledBatch::default();
        batch.summary.records_seen = raw_records.len();

        for result in results {
            match result {
                Ok(labeled) => {
                    RECORDS_PROCESSED_TOTAL.with_label_values(&["labeled"]).inc();
                    SEVERITY_LABELS_TOTAL
                        .with_label_values(&[metric_label(labeled.label)])
                        .inc();
                    batch.summary.distribution.record(labeled.label);
                    batch.records.push(labeled);
                }
                Err(err) => {
                    RECORDS_PROCESSED_TOTAL
                        .with_label_values(&[err.error_code()])
                        .inc();
                    self.handle_record_error(err, &mut batch)?;
                }
            }
        }

        batch.summary.records_labeled = batch.records.len();
        batch.summary.records_skipped = batch.skipped.len();
        let elapsed = started.elapsed();
        batch.summary.duration_ms = elapsed.as_millis() as u64;
        LABELING_DURATION_SECONDS.observe(elapsed.as_secs_f64());

        info!(
            labeled = batch.summary.records_labeled,
            skipped = batch.summary.records_skipped,
            no_anomaly = batch.summary.distribution.count(SeverityLabel::NoAnomaly),
            low = batch.summary.distribution.count(SeverityLabel::LowAnomaly),
            medium = batch.summary.distribution.count(SeverityLabel::MediumAnomaly),
            high = batch.summary.distribution.count(SeverityLabel::HighAnomaly),
            duration_ms = batch.summary.duration_ms,
            "Labeling batch completed"
        );

        Ok(batch)
    }

    fn handle_record_error(&self, err: AppError, batch: &mut LabeledBatch) -> Result<()> {
        if self.policy == MissingFieldPolicy::Fail {
            debug!(error = %err, "Aborting batch");
            return Err(err);
        }

        match err {
            AppError::MissingField { index, field } => {
                warn!(index, field = %field, "Skipping record with missing field");
                batch.skipped.push(SkippedRecord {
                    index,
                    field,
                    reason: "missing".to_string(),
                });
                Ok(())
            }
            AppError::InvalidField {
                index,
                field,
                reason,
            } => {
                warn!(index, field = %field, reason = %reason, "Skipping record with invalid field");
                batch.skipped.push(SkippedRecord {
                    index,
                    field,
                    reason,
                });
                Ok(())
            }
            other => Err(other),
        }
    }
}

fn metric_label(label: SeverityLabel) -> &'static str {
    match label {
        SeverityLabel::NoAnomaly => "none",
        SeverityLabel::LowAnomaly => "low",
        SeverityLabel::MediumAnomaly => "medium",
        SeverityLabel::HighAnomaly => "high",
    }
}

/// Heuristic severity labeling for structured log records
///
/// This module turns raw journal entries into training data:
/// - Normalization of the five labeled fields with the `"none"` message default
/// - The tier-cascade severity rule over error, exception and transport keywords
/// - Projection of each record into a single text feature
/// - Parallel batch processing with a configurable missing-field policy

pub mod labeler;
pub mod normalizer;
pub mod pipeline;
pub mod projector;

pub use labeler::{
    LabelExplanation, LabelSignals, LabelingConfig, SeverityLabeler, DEFAULT_ERROR_KEYWORDS,
    DEFAULT_EXCEPTION_KEYWORDS, DEFAULT_PRIORITY_THRESHOLD, DEFAULT_TRANSPORT_KEYWORDS,
};
pub use normalizer::{FieldError, RecordNormalizer};
pub use pipeline::{
    BatchSummary, LabeledBatch, LabeledRecord, LabelingPipeline, MissingFieldPolicy,
    SkippedRecord,
};
pub use projector::project_features;

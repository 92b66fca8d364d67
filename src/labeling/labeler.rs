use crate::error::{AppError, Result};
use crate::models::{NormalizedRecord, SeverityLabel, DEFAULT_MESSAGE, MAX_PRIORITY};
use serde::Serialize;

/// Default priority threshold for the high-anomaly tier
pub const DEFAULT_PRIORITY_THRESHOLD: u8 = 4;

/// Hard-failure keywords
pub const DEFAULT_ERROR_KEYWORDS: &[&str] = &[
    "critical",
    "error",
    "dumped",
    "problem",
    "unable",
    "failed",
    "status 1",
    "fault",
    "corrupt",
    "fatal",
    "crash",
];

/// Soft or warning-level keywords
pub const DEFAULT_EXCEPTION_KEYWORDS: &[&str] = &[
    "exception",
    "warning",
    "potential issue",
    "alert",
    "risk",
    "caution",
    "advisory",
];

/// Transports treated as system-critical
pub const DEFAULT_TRANSPORT_KEYWORDS: &[&str] = &["kernel", "syslog", "journal", "stderr"];

/// Validated, immutable keyword and threshold set driving the labeler.
///
/// Keywords are stored lower-cased. Construct once per batch (or experiment)
/// and share by reference; nothing mutates it after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelingConfig {
    priority_threshold: u8,
    error_keywords: Vec<String>,
    exception_keywords: Vec<String>,
    transport_keywords: Vec<String>,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            priority_threshold: DEFAULT_PRIORITY_THRESHOLD,
            error_keywords: lowered(DEFAULT_ERROR_KEYWORDS),
            exception_keywords: lowered(DEFAULT_EXCEPTION_KEYWORDS),
            transport_keywords: lowered(DEFAULT_TRANSPORT_KEYWORDS),
        }
    }
}

impl LabelingConfig {
    /// Build and validate a labeling configuration.
    ///
    /// Fails when the threshold is outside 0..=7, a keyword is empty, an
    /// error or exception keyword would match the substituted `"none"`
    /// message, or (with `require_keywords`) any list is empty.
    pub fn new<S: AsRef<str>>(
        priority_threshold: u8,
        error_keywords: &[S],
        exception_keywords: &[S],
        transport_keywords: &[S],
        require_keywords: bool,
    ) -> Result<Self> {
        if priority_threshold > MAX_PRIORITY {
            return Err(AppError::Configuration(format!(
                "priority_threshold {} outside 0..={}",
                priority_threshold, MAX_PRIORITY
            )));
        }

        let error_keywords = normalize_keywords("error_keywords", error_keywords, require_keywords)?;
        let exception_keywords =
            normalize_keywords("exception_keywords", exception_keywords, require_keywords)?;
        let transport_keywords =
            normalize_keywords("transport_keywords", transport_keywords, require_keywords)?;

        for keyword in error_keywords.iter().chain(exception_keywords.iter()) {
            if DEFAULT_MESSAGE.contains(keyword.as_str()) {
                return Err(AppError::Configuration(format!(
                    "keyword '{}' matches the default message '{}'",
                    keyword, DEFAULT_MESSAGE
                )));
            }
        }

        Ok(Self {
            priority_threshold,
            error_keywords,
            exception_keywords,
            transport_keywords,
        })
    }

    /// Build from comma-separated keyword strings
    pub fn from_comma_lists(
        priority_threshold: u8,
        error_keywords: &str,
        exception_keywords: &str,
        transport_keywords: &str,
        require_keywords: bool,
    ) -> Result<Self> {
        Self::new(
            priority_threshold,
            &split_list(error_keywords),
            &split_list(exception_keywords),
            &split_list(transport_keywords),
            require_keywords,
        )
    }

    pub fn priority_threshold(&self) -> u8 {
        self.priority_threshold
    }

    pub fn error_keywords(&self) -> &[String] {
        &self.error_keywords
    }

    pub fn exception_keywords(&self) -> &[String] {
        &self.exception_keywords
    }

    pub fn transport_keywords(&self) -> &[String] {
        &self.transport_keywords
    }
}

fn lowered(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}

fn split_list(list: &str) -> Vec<&str> {
    if list.is_empty() {
        Vec::new()
    } else {
        list.split(',').collect()
    }
}

fn normalize_keywords<S: AsRef<str>>(
    name: &str,
    keywords: &[S],
    require_keywords: bool,
) -> Result<Vec<String>> {
    if require_keywords && keywords.is_empty() {
        return Err(AppError::Configuration(format!("{} must not be empty", name)));
    }

    let mut normalized: Vec<String> = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.as_ref().to_lowercase();
        if keyword.is_empty() {
            return Err(AppError::Configuration(format!(
                "{} contains an empty keyword",
                name
            )));
        }
        if !normalized.contains(&keyword) {
            normalized.push(keyword);
        }
    }
    Ok(normalized)
}

/// The three predicates the tier cascade is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelSignals {
    pub has_error_signal: bool,
    pub is_critical_transport: bool,
    pub within_threshold: bool,
}

impl LabelSignals {
    /// Resolve the tier cascade; first matching tier wins
    pub fn severity(&self) -> SeverityLabel {
        let high_anomaly =
            self.within_threshold && self.is_critical_transport && self.has_error_signal;
        let medium_anomaly = self.has_error_signal && self.is_critical_transport;
        let low_anomaly = self.has_error_signal;

        if high_anomaly {
            SeverityLabel::HighAnomaly
        } else if medium_anomaly {
            SeverityLabel::MediumAnomaly
        } else if low_anomaly {
            SeverityLabel::LowAnomaly
        } else {
            SeverityLabel::NoAnomaly
        }
    }
}

/// Labeling decision with the keywords that triggered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelExplanation {
    pub label: SeverityLabel,
    pub signals: LabelSignals,
    pub error_keyword: Option<String>,
    pub exception_keyword: Option<String>,
    pub transport_keyword: Option<String>,
}

/// Rule engine mapping normalized records to severity labels
#[derive(Debug, Clone, Default)]
pub struct SeverityLabeler {
    config: LabelingConfig,
}

impl SeverityLabeler {
    pub fn new(config: LabelingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LabelingConfig {
        &self.config
    }

    /// Label one record. Total and deterministic.
    pub fn label(&self, record: &NormalizedRecord) -> SeverityLabel {
        self.signals(record).severity()
    }

    /// Evaluate the cascade predicates for a record
    pub fn signals(&self, record: &NormalizedRecord) -> LabelSignals {
        let message = record.message.to_lowercase();
        let transport = record.transport.to_lowercase();

        LabelSignals {
            has_error_signal: contains_any(&message, &self.config.error_keywords)
                || contains_any(&message, &self.config.exception_keywords),
            is_critical_transport: contains_any(&transport, &self.config.transport_keywords),
            within_threshold: record.priority <= self.config.priority_threshold,
        }
    }

    /// Label a record and report the first keyword matched in each list
    pub fn explain(&self, record: &NormalizedRecord) -> LabelExplanation {
        let message = record.message.to_lowercase();
        let transport = record.transport.to_lowercase();
        let signals = self.signals(record);

        LabelExplanation {
            label: signals.severity(),
            signals,
            error_keyword: first_match(&message, &self.config.error_keywords),
            exception_keyword: first_match(&message, &self.config.exception_keywords),
            transport_keyword: first_match(&transport, &self.config.transport_keywords),
        }
    }
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| haystack.contains(k.as_str()))
}

fn first_match(haystack: &str, keywords: &[String]) -> Option<String> {
    keywords
        .iter()
        .find(|k| haystack.contains(k.as_str()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(priority: u8, transport: &str, message: &str) -> NormalizedRecord {
        NormalizedRecord {
            priority,
            transport: transport.to_string(),
            scope: "system".to_string(),
            boot_id: "boot-1".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_high_anomaly() {
        let labeler = SeverityLabeler::default();
        let label = labeler.label(&record(2, "kernel", "fatal crash detected"));
        assert_eq!(label, SeverityLabel::HighAnomaly);
    }

    #[test]
    fn test_medium_anomaly_above_threshold() {
        let labeler = SeverityLabeler::default();
        let label = labeler.label(&record(6, "kernel", "fatal crash detected"));
        assert_eq!(label, SeverityLabel::MediumAnomaly);
    }

    #[test]
    fn test_low_anomaly_non_critical_transport() {
        let labeler = SeverityLabeler::default();
        let label = labeler.label(&record(6, "app", "fatal crash detected"));
        assert_eq!(label, SeverityLabel::LowAnomaly);
    }

    #[test]
    fn test_no_anomaly_without_keywords() {
        let labeler = SeverityLabeler::default();
        let label = labeler.label(&record(1, "kernel", "started service ok"));
        assert_eq!(label, SeverityLabel::NoAnomaly);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let labeler = SeverityLabeler::default();
        assert_eq!(
            labeler.label(&record(4, "syslog", "disk error")),
            SeverityLabel::HighAnomaly
        );
        assert_eq!(
            labeler.label(&record(5, "syslog", "disk error")),
            SeverityLabel::MediumAnomaly
        );
    }

    #[test]
    fn test_exception_keywords_count_as_error_signal() {
        let labeler = SeverityLabeler::default();
        assert_eq!(
            labeler.label(&record(7, "stdout", "Deprecation WARNING: old api")),
            SeverityLabel::LowAnomaly
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let config = LabelingConfig::new(4, &["FATAL"], &["Risk"], &["KERNEL"], true).unwrap();
        let labeler = SeverityLabeler::new(config);

        assert_eq!(
            labeler.label(&record(0, "Kernel", "Fatal: oops")),
            SeverityLabel::HighAnomaly
        );
        assert_eq!(labeler.config().error_keywords(), ["fatal".to_string()]);
    }

    #[test]
    fn test_transport_alone_is_not_an_anomaly() {
        let labeler = SeverityLabeler::default();
        let signals = labeler.signals(&record(0, "kernel", "eth0: link up"));

        assert!(signals.is_critical_transport);
        assert!(signals.within_threshold);
        assert!(!signals.has_error_signal);
        assert_eq!(signals.severity(), SeverityLabel::NoAnomaly);
    }

    #[test]
    fn test_default_message_labels_no_anomaly() {
        let labeler = SeverityLabeler::default();
        assert_eq!(
            labeler.label(&record(0, "kernel", DEFAULT_MESSAGE)),
            SeverityLabel::NoAnomaly
        );
    }

    #[test]
    fn test_cascade_truth_table() {
        let cases = [
            (true, true, true, SeverityLabel::HighAnomaly),
            (true, true, false, SeverityLabel::MediumAnomaly),
            (true, false, true, SeverityLabel::LowAnomaly),
            (true, false, false, SeverityLabel::LowAnomaly),
            (false, true, true, SeverityLabel::NoAnomaly),
            (false, true, false, SeverityLabel::NoAnomaly),
            (false, false, true, SeverityLabel::NoAnomaly),
            (false, false, false, SeverityLabel::NoAnomaly),
        ];

        for (error, transport, threshold, expected) in cases {
            let signals = LabelSignals {
                has_error_signal: error,
                is_critical_transport: transport,
                within_threshold: threshold,
            };
            assert_eq!(signals.severity(), expected, "{:?}", signals);
        }
    }

    #[test]
    fn test_explain_reports_first_keywords() {
        let labeler = SeverityLabeler::default();
        let explanation = labeler.explain(&record(3, "journal", "unable to mount: fatal fault"));

        assert_eq!(explanation.label, SeverityLabel::HighAnomaly);
        assert_eq!(explanation.error_keyword.as_deref(), Some("unable"));
        assert_eq!(explanation.exception_keyword, None);
        assert_eq!(explanation.transport_keyword.as_deref(), Some("journal"));
    }

    #[test]
    fn test_config_rejects_out_of_range_threshold() {
        let err = LabelingConfig::new(8, &["error"], &["warning"], &["kernel"], true).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_config_rejects_empty_lists_when_required() {
        let empty: [&str; 0] = [];
        assert!(LabelingConfig::new(4, &empty, &["warning"], &["kernel"], true).is_err());

        let config = LabelingConfig::new(4, &["error"], &empty, &["kernel"], false).unwrap();
        assert!(config.exception_keywords().is_empty());
    }

    #[test]
    fn test_config_rejects_empty_keyword() {
        let err = LabelingConfig::from_comma_lists(4, "error,,fatal", "warning", "kernel", true)
            .unwrap_err();
        assert!(err.to_string().contains("empty keyword"));
    }

    #[test]
    fn test_config_rejects_keyword_matching_default_message() {
        let err = LabelingConfig::new(4, &["error", "one"], &["warning"], &["kernel"], true)
            .unwrap_err();
        assert!(err.to_string().contains("default message"));
    }

    #[test]
    fn test_from_comma_lists_matches_defaults() {
        let config = LabelingConfig::from_comma_lists(
            4,
            "critical,error,dumped,problem,unable,failed,status 1,fault,corrupt,fatal,crash",
            "exception,warning,potential issue,alert,risk,caution,advisory",
            "kernel,syslog,journal,stderr",
            true,
        )
        .unwrap();
        assert_eq!(config, LabelingConfig::default());
    }

    #[test]
    fn test_duplicate_keywords_collapsed() {
        let config = LabelingConfig::new(4, &["Error", "error"], &["warning"], &["kernel"], true)
            .unwrap();
        assert_eq!(config.error_keywords().len(), 1);
    }
}

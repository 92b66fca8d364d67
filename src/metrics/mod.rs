/// Prometheus metrics for labeling and model training.
///
/// All metrics live in the `log_anomaly` namespace and are registered in a
/// process-wide registry. The CLI writes the text exposition with
/// `--metrics-out`.
///
/// # Example
/// ```no_run
/// use log_anomaly_labeler::metrics::{init_metrics, gather_metrics, SEVERITY_LABELS_TOTAL};
///
/// init_metrics().unwrap();
/// SEVERITY_LABELS_TOTAL.with_label_values(&["high"]).inc();
/// println!("{}", gather_metrics());
/// ```

use lazy_static::lazy_static;
use prometheus::{CounterVec, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "log_anomaly";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Records handled by the labeling pipeline
    ///
    /// Labels: outcome (`labeled` or the error code of a rejected record)
    pub static ref RECORDS_PROCESSED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("records_processed_total", "Total number of log records processed")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create RECORDS_PROCESSED_TOTAL metric");

    /// Labels assigned by the severity labeler
    ///
    /// Labels: severity (none, low, medium, high)
    pub static ref SEVERITY_LABELS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("severity_labels_total", "Total number of severity labels assigned")
            .namespace(NAMESPACE),
        &["severity"]
    ).expect("Failed to create SEVERITY_LABELS_TOTAL metric");

    /// Wall time to label one batch
    pub static ref LABELING_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "labeling_duration_seconds",
            "Batch labeling duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0])
    ).expect("Failed to create LABELING_DURATION_SECONDS metric");

    /// Model training time
    ///
    /// Labels: model (rf, lr, gb)
    pub static ref MODEL_TRAINING_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "model_training_duration_seconds",
            "Model training duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["model"]
    ).expect("Failed to create MODEL_TRAINING_DURATION_SECONDS metric");

    /// Test-split accuracy of the last trained model
    ///
    /// Labels: model (rf, lr, gb)
    pub static ref MODEL_ACCURACY: GaugeVec = GaugeVec::new(
        Opts::new("model_accuracy", "Accuracy on the held-out test split")
            .namespace(NAMESPACE),
        &["model"]
    ).expect("Failed to create MODEL_ACCURACY metric");
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<(), prometheus::Error> {
    match PROMETHEUS_REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Register all metrics with the global registry. Safe to call more than once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(Box::new(RECORDS_PROCESSED_TOTAL.clone()))?;
    register(Box::new(SEVERITY_LABELS_TOTAL.clone()))?;
    register(Box::new(LABELING_DURATION_SECONDS.clone()))?;
    register(Box::new(MODEL_TRAINING_DURATION_SECONDS.clone()))?;
    register(Box::new(MODEL_ACCURACY.clone()))?;

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Text exposition of every registered metric
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_severity_counter() {
        SEVERITY_LABELS_TOTAL.with_label_values(&["medium"]).inc();

        let value = SEVERITY_LABELS_TOTAL.with_label_values(&["medium"]).get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        RECORDS_PROCESSED_TOTAL.with_label_values(&["labeled"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("log_anomaly_records_processed_total"));
    }
}

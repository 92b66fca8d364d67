//! Common test utilities
//!
//! Journal record fixtures shared by the integration suites, plus helpers
//! for asserting on Prometheus text exposition.

#![allow(dead_code)]

use log_anomaly_labeler::models::RawRecord;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Build a journald-style record with the default field names
pub fn journal_record(priority: u8, transport: &str, message: &str) -> RawRecord {
    record_from(json!({
        "PRIORITY": priority.to_string(),
        "_TRANSPORT": transport,
        "_RUNTIME_SCOPE": "system",
        "_BOOT_ID": "5f2b9c1e0d7a4e8b",
        "MESSAGE": message,
        "__CURSOR": "s=a1;i=1",
        "_HOSTNAME": "node-1",
    }))
}

/// Build a record from an arbitrary JSON object
pub fn record_from(value: Value) -> RawRecord {
    serde_json::from_value(value).unwrap()
}

/// A small export with every severity tier represented several times
pub fn mixed_export(copies: usize) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for i in 0..copies {
        records.push(journal_record(6, "journal", &format!("Started session {} of user root", i)));
        records.push(journal_record(5, "stdout", &format!("worker {} reported a warning", i)));
        records.push(journal_record(6, "kernel", &format!("usb {}: device error -71", i)));
        records.push(journal_record(2, "kernel", &format!("fatal crash in module {}", i)));
        records.push(journal_record(6, "syslog", &format!("Reached target timer {}", i)));
    }
    records
}

/// Serialize records as JSON lines
pub fn to_json_lines(records: &[RawRecord]) -> String {
    records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Group Prometheus exposition lines by metric name
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}

/// Extract the sample value from an exposition line
/// Example: `metric_name{label1="value1"} 42.5` -> Some(42.5)
pub fn extract_metric_value(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse::<f64>().ok()
}

/// Extract labels from an exposition line
/// Example: `metric{a="1",b="2"}` -> {"a": "1", "b": "2"}
pub fn extract_labels(line: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();

    if let (Some(start), Some(end)) = (line.find('{'), line.find('}')) {
        for pair in line[start + 1..end].split(',') {
            let parts: Vec<&str> = pair.split('=').collect();
            if parts.len() == 2 {
                labels.insert(
                    parts[0].trim().to_string(),
                    parts[1].trim().trim_matches('"').to_string(),
                );
            }
        }
    }

    labels
}

/// Value of the sample of `metric` whose labels include `label=value`
pub fn sample_value(output: &str, metric: &str, label: &str, value: &str) -> Option<f64> {
    output
        .lines()
        .filter(|line| line.starts_with(metric) && !line.starts_with('#'))
        .find(|line| extract_labels(line).get(label).map(String::as_str) == Some(value))
        .and_then(extract_metric_value)
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

/// Message substituted when the source message is empty, null or absent
pub const DEFAULT_MESSAGE: &str = "none";

/// Lowest (most severe) syslog priority
pub const MIN_PRIORITY: u8 = 0;

/// Highest (least severe) syslog priority
pub const MAX_PRIORITY: u8 = 7;

/// A log entry as emitted by the collector: arbitrary string keys to JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Value for a key; JSON `null` is reported as absent
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The five fields every labeled record carries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Syslog priority, 0 (emergency) to 7 (debug)
    pub priority: u8,

    /// Delivery channel (kernel, syslog, journal, stdout, stderr, ...)
    pub transport: String,

    /// Execution scope the entry was produced in
    pub scope: String,

    /// Boot session identifier
    pub boot_id: String,

    /// Free-text message, `"none"` when the source had none
    pub message: String,
}

impl NormalizedRecord {
    /// Field values in projection order
    pub fn field_values(&self) -> [String; 5] {
        [
            self.priority.to_string(),
            self.transport.clone(),
            self.scope.clone(),
            self.boot_id.clone(),
            self.message.clone(),
        ]
    }

    /// Whether the message was substituted by the normalizer
    pub fn has_default_message(&self) -> bool {
        self.message == DEFAULT_MESSAGE
    }
}

/// Source key names for the normalized fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct FieldMapping {
    #[validate(length(min = 1))]
    #[serde(default = "default_priority_key")]
    pub priority: String,

    #[validate(length(min = 1))]
    #[serde(default = "default_transport_key")]
    pub transport: String,

    #[validate(length(min = 1))]
    #[serde(default = "default_scope_key")]
    pub scope: String,

    #[validate(length(min = 1))]
    #[serde(default = "default_boot_id_key")]
    pub boot_id: String,

    #[validate(length(min = 1))]
    #[serde(default = "default_message_key")]
    pub message: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            priority: default_priority_key(),
            transport: default_transport_key(),
            scope: default_scope_key(),
            boot_id: default_boot_id_key(),
            message: default_message_key(),
        }
    }
}

impl FieldMapping {
    /// Keys that must be present in every record
    pub fn mandatory_keys(&self) -> [&str; 4] {
        [
            self.priority.as_str(),
            self.transport.as_str(),
            self.scope.as_str(),
            self.boot_id.as_str(),
        ]
    }
}

fn default_priority_key() -> String {
    "PRIORITY".to_string()
}

fn default_transport_key() -> String {
    "_TRANSPORT".to_string()
}

fn default_scope_key() -> String {
    "_RUNTIME_SCOPE".to_string()
}

fn default_boot_id_key() -> String {
    "_BOOT_ID".to_string()
}

fn default_message_key() -> String {
    "MESSAGE".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_null_is_absent() {
        let record: RawRecord = serde_json::from_value(json!({
            "MESSAGE": null,
            "PRIORITY": "6"
        }))
        .unwrap();

        assert!(record.contains_key("MESSAGE"));
        assert!(record.get("MESSAGE").is_none());
        assert_eq!(record.get("PRIORITY"), Some(&json!("6")));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_field_values_order() {
        let record = NormalizedRecord {
            priority: 3,
            transport: "kernel".to_string(),
            scope: "system".to_string(),
            boot_id: "b1".to_string(),
            message: "oops".to_string(),
        };

        assert_eq!(
            record.field_values(),
            [
                "3".to_string(),
                "kernel".to_string(),
                "system".to_string(),
                "b1".to_string(),
                "oops".to_string()
            ]
        );
        assert!(!record.has_default_message());
    }

    #[test]
    fn test_default_field_mapping() {
        let mapping = FieldMapping::default();
        assert_eq!(
            mapping.mandatory_keys(),
            ["PRIORITY", "_TRANSPORT", "_RUNTIME_SCOPE", "_BOOT_ID"]
        );
        assert_eq!(mapping.message, "MESSAGE");
        assert!(mapping.validate().is_ok());
    }
}

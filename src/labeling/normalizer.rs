use crate::error::AppError;
use crate::models::{FieldMapping, NormalizedRecord, RawRecord, DEFAULT_MESSAGE, MAX_PRIORITY};
use serde_json::Value;
use thiserror::Error;

/// Field-level normalization failure, not yet tied to a record index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("missing mandatory field '{0}'")]
    Missing(String),

    #[error("invalid value for field '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl FieldError {
    /// Attach the offending record's position in the batch
    pub fn at(self, index: usize) -> AppError {
        match self {
            FieldError::Missing(field) => AppError::MissingField { index, field },
            FieldError::Invalid { field, reason } => AppError::InvalidField {
                index,
                field,
                reason,
            },
        }
    }

    /// Name of the offending source field
    pub fn field(&self) -> &str {
        match self {
            FieldError::Missing(field) => field,
            FieldError::Invalid { field, .. } => field,
        }
    }
}

/// Extracts the labeled fields from heterogeneous raw records
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer {
    mapping: FieldMapping,
}

impl RecordNormalizer {
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Normalize one raw record.
    ///
    /// Priority, transport, scope and boot id are mandatory. The message falls
    /// back to `"none"` when it is empty, null or absent. Values are otherwise
    /// passed through untouched.
    pub fn normalize(&self, raw: &RawRecord) -> Result<NormalizedRecord, FieldError> {
        let priority = self.priority(raw)?;
        let transport = self.mandatory_text(raw, &self.mapping.transport)?;
        let scope = self.mandatory_text(raw, &self.mapping.scope)?;
        let boot_id = self.mandatory_text(raw, &self.mapping.boot_id)?;

        let message = match raw.get(&self.mapping.message) {
            Some(value) => text_value(&self.mapping.message, value)?,
            None => String::new(),
        };
        let message = if message.is_empty() {
            DEFAULT_MESSAGE.to_string()
        } else {
            message
        };

        Ok(NormalizedRecord {
            priority,
            transport,
            scope,
            boot_id,
            message,
        })
    }

    fn priority(&self, raw: &RawRecord) -> Result<u8, FieldError> {
        let key = &self.mapping.priority;
        let value = raw
            .get(key)
            .ok_or_else(|| FieldError::Missing(key.clone()))?;

        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };

        match parsed {
            Some(p) if (0..=i64::from(MAX_PRIORITY)).contains(&p) => Ok(p as u8),
            Some(p) => Err(FieldError::Invalid {
                field: key.clone(),
                reason: format!("priority {} outside 0..={}", p, MAX_PRIORITY),
            }),
            None => Err(FieldError::Invalid {
                field: key.clone(),
                reason: format!("expected an integer priority, got {}", value),
            }),
        }
    }

    fn mandatory_text(&self, raw: &RawRecord, key: &str) -> Result<String, FieldError> {
        let value = raw
            .get(key)
            .ok_or_else(|| FieldError::Missing(key.to_string()))?;
        text_value(key, value)
    }
}

/// Render a JSON value as field text.
///
/// journald exports payloads that are not valid UTF-8 as arrays of byte
/// values; those are decoded lossily.
fn text_value(key: &str, value: &Value) -> Result<String, FieldError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            bytes
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .ok_or_else(|| FieldError::Invalid {
                    field: key.to_string(),
                    reason: "array is not a byte sequence".to_string(),
                })
        }
        Value::Object(_) => Err(FieldError::Invalid {
            field: key.to_string(),
            reason: "expected text, got an object".to_string(),
        }),
    }
}

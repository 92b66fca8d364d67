use crate::models::NormalizedRecord;

/// Project a normalized record into the single text feature fed to the
/// vectorizers: field values joined by one space, in the order priority,
/// transport, scope, boot id, message.
pub fn project_features(record: &NormalizedRecord) -> String {
    record.field_values().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str) -> NormalizedRecord {
        NormalizedRecord {
            priority: 6,
            transport: "syslog".to_string(),
            scope: "system".to_string(),
            boot_id: "8e2f".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_projection_layout() {
        assert_eq!(
            project_features(&record("Started Session 4 of user root.")),
            "6 syslog system 8e2f Started Session 4 of user root."
        );
    }

    #[test]
    fn test_projection_is_deterministic() {
        let r = record("unable to resolve host");
        assert_eq!(project_features(&r), project_features(&r.clone()));
    }

    #[test]
    fn test_projection_keeps_whitespace() {
        assert_eq!(project_features(&record("  a  ")), "6 syslog system 8e2f   a  ");
    }
}

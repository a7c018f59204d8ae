// ABOUTME: Typed sandbox metadata and its encoding as engine labels
// ABOUTME: Labels are string-only, so conversion happens only at the engine boundary

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeZone, Utc};

/// Private namespace for every label we write
pub const LABEL_NAMESPACE: &str = "sandbox";
pub const TYPE_LABEL: &str = "sandbox.type";
pub const TYPE_VALUE: &str = "docker-sandbox";
pub const CREATED_AT_LABEL: &str = "sandbox.created_at";
pub const TIMEOUT_LABEL: &str = "sandbox.timeout";
pub const METADATA_PREFIX: &str = "sandbox.metadata.";

/// Decoded form of the labels attached to a sandbox container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxLabels {
    pub created_at: Option<DateTime<Utc>>,
    pub timeout_secs: Option<u64>,
    pub metadata: BTreeMap<String, String>,
}

impl SandboxLabels {
    /// Labels for a sandbox created now
    pub fn new(timeout_secs: Option<u64>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            created_at: Some(Utc::now()),
            timeout_secs,
            metadata,
        }
    }

    /// Coerce JSON metadata values to strings; strings are stored without quotes
    pub fn coerce_metadata(
        metadata: &BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, String> {
        metadata
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    pub fn to_labels(&self) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(TYPE_LABEL.to_string(), TYPE_VALUE.to_string());

        if let Some(created_at) = self.created_at {
            labels.insert(
                CREATED_AT_LABEL.to_string(),
                created_at.timestamp().to_string(),
            );
        }

        if let Some(timeout) = self.timeout_secs {
            labels.insert(TIMEOUT_LABEL.to_string(), timeout.to_string());
        }

        for (key, value) in &self.metadata {
            labels.insert(format!("{}{}", METADATA_PREFIX, key), value.clone());
        }

        labels
    }

    /// Decode labels; unparseable timestamps or timeouts are dropped, not fatal
    pub fn from_labels(labels: &HashMap<String, String>) -> Self {
        let created_at = labels
            .get(CREATED_AT_LABEL)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let timeout_secs = labels
            .get(TIMEOUT_LABEL)
            .and_then(|v| v.parse::<u64>().ok());

        let metadata = labels
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(METADATA_PREFIX)
                    .map(|k| (k.to_string(), value.clone()))
            })
            .collect();

        Self {
            created_at,
            timeout_secs,
            metadata,
        }
    }

    /// Engine label filter matching every sandbox we manage
    pub fn managed_filter() -> String {
        format!("{}={}", TYPE_LABEL, TYPE_VALUE)
    }
}

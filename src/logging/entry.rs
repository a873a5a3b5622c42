// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log entry structure

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Facility, Severity};

/// A single log record as delivered to a sink
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub facility: Facility,
    /// Node that produced the entry ("node 3 10.0.0.1"), if the logger is bound to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kvs: Vec<(String, String)>,
}

impl LogEntry {
    pub fn new(severity: Severity, facility: Facility, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            facility,
            context: None,
            message: message.to_string(),
            kvs: Vec::new(),
        }
    }

    /// Attach a key-value pair
    pub fn add_kv(&mut self, key: &str, value: &str) {
        self.kvs.push((key.to_string(), value.to_string()));
    }

    /// Look up a key-value pair by key
    pub fn get_kv(&self, key: &str) -> Option<&str> {
        self.kvs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render as a single JSON line
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "level": self.severity.as_str(),
            "facility": self.facility.as_str(),
            "message": self.message,
        });
        if let Some(context) = &self.context {
            value["node"] = serde_json::Value::String(context.clone());
        }
        for (key, val) in &self.kvs {
            value[key.as_str()] = serde_json::Value::String(val.clone());
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kvs() {
        let mut entry = LogEntry::new(Severity::Info, Facility::Hello, "HELLO sent");
        entry.add_kv("iface", "wlan0");
        entry.add_kv("seq", "7");

        assert_eq!(entry.get_kv("iface"), Some("wlan0"));
        assert_eq!(entry.get_kv("seq"), Some("7"));
        assert_eq!(entry.get_kv("missing"), None);
    }

    #[test]
    fn test_entry_json() {
        let mut entry = LogEntry::new(Severity::Warning, Facility::Engine, "malformed packet");
        entry.context = Some("node 1 10.0.0.1".to_string());
        entry.add_kv("sender", "10.0.0.2");

        let json = entry.to_json();
        assert_eq!(json["level"], "WARNING");
        assert_eq!(json["facility"], "Engine");
        assert_eq!(json["node"], "node 1 10.0.0.1");
        assert_eq!(json["sender"], "10.0.0.2");
    }
}

//! Metric publication
//!
//! Every tick publishes the snapshot twice over:
//! - `<base>/state`: the full JSON document, retained, with every field
//!   key present (absent values appear as `null`)
//! - `<base>/<key>`: one retained scalar per present field, for consumers
//!   that cannot parse JSON; absent fields are skipped entirely
//!
//! No per-publish retry: a failed tick is retried by the next tick.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::metrics::MetricsSnapshot;
use crate::mqtt::MessageSink;

/// Serializes snapshots onto the per-device state topics
pub struct MetricPublisher {
    base_topic: String,
}

impl MetricPublisher {
    pub fn new(hostname: &str) -> Self {
        MetricPublisher {
            base_topic: format!("system_monitor/{hostname}"),
        }
    }

    pub fn state_topic(&self) -> String {
        format!("{}/state", self.base_topic)
    }

    /// Build all (topic, payload) messages for one snapshot
    pub fn build_messages(&self, snapshot: &MetricsSnapshot) -> Result<Vec<(String, Vec<u8>)>> {
        let mut messages = vec![(
            self.state_topic(),
            serde_json::to_vec(snapshot).context("failed to serialize metrics snapshot")?,
        )];

        let doc = serde_json::to_value(snapshot).context("failed to serialize metrics snapshot")?;
        if let Value::Object(fields) = doc {
            for (key, value) in fields {
                if value.is_null() {
                    continue;
                }
                let scalar = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                messages.push((format!("{}/{key}", self.base_topic), scalar.into_bytes()));
            }
        }

        Ok(messages)
    }

    /// Publish one snapshot, retained, through the sink
    pub async fn publish(&self, sink: &dyn MessageSink, snapshot: &MetricsSnapshot) -> Result<()> {
        let messages = self.build_messages(snapshot)?;
        debug!("Publishing {} messages under {}", messages.len(), self.base_topic);
        for (topic, payload) in messages {
            sink.publish_retained(&topic, payload)
                .await
                .with_context(|| format!("metric publish failed on {topic}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::sample_snapshot;

    fn topics(messages: &[(String, Vec<u8>)]) -> Vec<&str> {
        messages.iter().map(|(t, _)| t.as_str()).collect()
    }

    #[test]
    fn test_state_document_always_first_and_complete() {
        let publisher = MetricPublisher::new("pi-01");
        let messages = publisher.build_messages(&sample_snapshot(None)).unwrap();

        let (topic, payload) = &messages[0];
        assert_eq!(topic, "system_monitor/pi-01/state");

        let doc: Value = serde_json::from_slice(payload).unwrap();
        // absent fields stay in the document as explicit nulls
        assert!(doc["cpu_temp"].is_null());
        assert!(doc["load_avg"].is_null());
        assert_eq!(doc["cpu_percent"], 42.1);
        assert_eq!(doc["network_bytes_sent"], 123_456);
    }

    #[test]
    fn test_fanout_skips_absent_fields() {
        let publisher = MetricPublisher::new("pi-01");
        let messages = publisher.build_messages(&sample_snapshot(None)).unwrap();
        let topics = topics(&messages);

        assert!(!topics.contains(&"system_monitor/pi-01/cpu_temp"));
        assert!(!topics.contains(&"system_monitor/pi-01/load_avg"));
        assert!(!topics.contains(&"system_monitor/pi-01/fan_status"));
        assert!(topics.contains(&"system_monitor/pi-01/cpu_percent"));
        assert!(topics.contains(&"system_monitor/pi-01/timestamp"));

        // state doc + 11 present scalar fields (cpu_temp/load_avg absent,
        // fan key omitted entirely)
        assert_eq!(messages.len(), 12);
    }

    #[test]
    fn test_fanout_scalar_rendering() {
        let publisher = MetricPublisher::new("pi-01");
        let messages = publisher.build_messages(&sample_snapshot(Some(Some(true)))).unwrap();

        let find = |key: &str| -> String {
            let topic = format!("system_monitor/pi-01/{key}");
            let (_, payload) = messages.iter().find(|(t, _)| *t == topic).unwrap();
            String::from_utf8(payload.clone()).unwrap()
        };

        assert_eq!(find("cpu_percent"), "42.1");
        assert_eq!(find("network_bytes_recv"), "654321");
        assert_eq!(find("fan_status"), "true");
        // strings go out unquoted
        assert_eq!(find("timestamp"), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_fan_unknown_not_fanned_out_but_null_in_state() {
        let publisher = MetricPublisher::new("pi-01");
        let messages = publisher.build_messages(&sample_snapshot(Some(None))).unwrap();

        let doc: Value = serde_json::from_slice(&messages[0].1).unwrap();
        assert!(doc.get("fan_status").is_some());
        assert!(doc["fan_status"].is_null());
        assert!(!topics(&messages).contains(&"system_monitor/pi-01/fan_status"));
    }
}

//! Contract tests for the publish surface, run against the devkit MQTT
//! stub instead of a real broker: discovery catalog layout, retained
//! flags and the per-field fan-out.

use async_trait::async_trait;
use rumqttc::QoS;
use serde_json::Value;

use sysmon_agent::discovery::DiscoveryPublisher;
use sysmon_agent::metrics::MetricsSnapshot;
use sysmon_agent::mqtt::MessageSink;
use sysmon_agent::publish::MetricPublisher;
use sysmon_devkit::MockMqttClient;

/// Adapter exposing the devkit stub through the agent's publish seam
struct StubSink(MockMqttClient);

#[async_trait]
impl MessageSink for StubSink {
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.0.publish(topic.to_string(), QoS::AtLeastOnce, true, payload).await
    }
}

fn snapshot(cpu_temp: Option<f64>, fan_status: Option<Option<bool>>) -> MetricsSnapshot {
    MetricsSnapshot {
        cpu_percent: 42.1,
        cpu_temp,
        load_avg: Some(0.52),
        memory_percent: 33.0,
        memory_used_gb: 1.25,
        memory_total_gb: 3.79,
        disk_percent: 75.5,
        disk_used_gb: 10.51,
        disk_total_gb: 13.92,
        network_bytes_sent: 123_456,
        network_bytes_recv: 654_321,
        uptime_hours: 12.3,
        fan_status,
        timestamp: "2024-01-01T12:00:00+01:00".to_string(),
    }
}

#[tokio::test]
async fn discovery_catalog_pi01_fan_disabled() {
    sysmon_devkit::init_test_logging();
    let client = MockMqttClient::new();
    let sink = StubSink(client.clone());

    let publisher = DiscoveryPublisher::new("pi-01", true, false);
    let count = publisher.publish_catalog(&sink).await.unwrap();
    assert_eq!(count, 10);

    let sensors = client.find_messages_by_prefix("homeassistant/sensor/");
    assert_eq!(sensors.len(), 10);
    assert!(client.find_messages_by_prefix("homeassistant/binary_sensor/").is_empty());

    let expected_keys = [
        "cpu_percent",
        "cpu_temp",
        "load_avg",
        "memory_percent",
        "memory_used_gb",
        "disk_percent",
        "disk_used_gb",
        "network_bytes_sent",
        "network_bytes_recv",
        "uptime_hours",
    ];
    for key in expected_keys {
        let topic = format!("homeassistant/sensor/system_monitor_pi-01_{key}/config");
        let messages = client.find_messages_by_topic(&topic);
        assert_eq!(messages.len(), 1, "missing discovery record for {key}");
        assert!(messages[0].retain, "discovery record for {key} must be retained");

        let config: Value = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(config["state_topic"], "system_monitor/pi-01/state");
        assert_eq!(config["unique_id"], format!("system_monitor_pi-01_{key}"));
        assert_eq!(config["device"]["identifiers"][0], "system_monitor_pi-01");
    }
}

#[tokio::test]
async fn discovery_catalog_is_idempotent() {
    let client = MockMqttClient::new();
    let sink = StubSink(client.clone());

    let publisher = DiscoveryPublisher::new("pi-01", true, true);
    publisher.publish_catalog(&sink).await.unwrap();
    let first = client.get_published_messages();

    client.clear();
    publisher.publish_catalog(&sink).await.unwrap();
    let second = client.get_published_messages();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.topic, b.topic);
        assert_eq!(a.payload, b.payload);
    }
}

#[tokio::test]
async fn fan_enabled_emits_binary_sensor_record() {
    let client = MockMqttClient::new();
    let sink = StubSink(client.clone());

    let publisher = DiscoveryPublisher::new("pi-01", true, true);
    let count = publisher.publish_catalog(&sink).await.unwrap();
    assert_eq!(count, 11);

    let messages = client
        .find_messages_by_topic("homeassistant/binary_sensor/system_monitor_pi-01_fan_status/config");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].retain);

    let config: Value = serde_json::from_slice(&messages[0].payload).unwrap();
    assert_eq!(config["payload_on"], "ON");
    assert_eq!(config["payload_off"], "OFF");
    assert_eq!(config["name"], "pi-01 Case Fan");
}

#[tokio::test]
async fn snapshot_publish_retains_state_and_skips_absent_fields() {
    let client = MockMqttClient::new();
    let sink = StubSink(client.clone());

    let publisher = MetricPublisher::new("pi-01");
    publisher
        .publish(&sink, &snapshot(None, None))
        .await
        .unwrap();

    let state = client.find_messages_by_topic("system_monitor/pi-01/state");
    assert_eq!(state.len(), 1);
    assert!(state[0].retain);

    let doc: Value = serde_json::from_slice(&state[0].payload).unwrap();
    assert!(doc["cpu_temp"].is_null());
    assert_eq!(doc["cpu_percent"], 42.1);

    // absent temperature must not appear in the scalar fan-out
    assert!(client.find_messages_by_topic("system_monitor/pi-01/cpu_temp").is_empty());

    let cpu = client.find_messages_by_topic("system_monitor/pi-01/cpu_percent");
    assert_eq!(cpu.len(), 1);
    assert!(cpu[0].retain);
    assert_eq!(cpu[0].payload, b"42.1");
}

#[tokio::test]
async fn snapshot_publish_includes_known_fan_state() {
    let client = MockMqttClient::new();
    let sink = StubSink(client.clone());

    let publisher = MetricPublisher::new("pi-01");
    publisher
        .publish(&sink, &snapshot(Some(55.2), Some(Some(false))))
        .await
        .unwrap();

    let fan = client.find_messages_by_topic("system_monitor/pi-01/fan_status");
    assert_eq!(fan.len(), 1);
    assert_eq!(fan[0].payload, b"false");

    let temp = client.find_messages_by_topic("system_monitor/pi-01/cpu_temp");
    assert_eq!(temp.len(), 1);
    assert_eq!(temp[0].payload, b"55.2");
}

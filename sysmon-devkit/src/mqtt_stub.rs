/*!
Mock MQTT Client pour développement sans broker

Permet de développer et tester l'agent sans démarrer un broker MQTT réel.
Enregistre tous les messages publiés (topic, payload, QoS, retain) et
fournit des helpers d'assertion pour les tests de contrat.
*/

use rumqttc::QoS;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Configuration d'un channel pour recevoir les messages simulés
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };

        // Enregistrer le message
        self.published_messages.lock().unwrap().push(message.clone());

        log::info!("📤 [MOCK] Published to {}: {} bytes (retain={})",
                   message.topic, message.payload.len(), message.retain);
        Ok(())
    }

    /// Simule l'abonnement à un topic (compatible avec AsyncClient)
    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        self.subscriptions.lock().unwrap().push(topic.clone());
        log::info!("📥 [MOCK] Subscribed to {}", topic);
        Ok(())
    }

    /// Simule la réception d'un message (pour tests)
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };

        if let Some(sender) = self.message_sender.lock().unwrap().as_ref() {
            sender.send(message.clone()).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        }

        log::info!("📨 [MOCK] Simulated incoming: {}", message.topic);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Récupère les abonnements (pour assertions de tests)
    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Trouve les messages dont le topic commence par un préfixe (ex: discovery)
    pub fn find_messages_by_prefix(&self, prefix: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper pour créer des payloads de test au format de l'agent sysmon
pub struct SysmonMessageBuilder;

impl SysmonMessageBuilder {
    /// Topic racine d'un hôte (`system_monitor/<hostname>`)
    pub fn base_topic(hostname: &str) -> String {
        format!("system_monitor/{hostname}")
    }

    /// Crée un payload snapshot minimal (état `<base>/state`)
    pub fn state_snapshot(cpu: f64, memory_percent: f64, disk_percent: f64) -> Value {
        serde_json::json!({
            "cpu_percent": cpu,
            "cpu_temp": Value::Null,
            "load_avg": Value::Null,
            "memory_percent": memory_percent,
            "memory_used_gb": 1.25,
            "memory_total_gb": 4.0,
            "disk_percent": disk_percent,
            "disk_used_gb": 10.5,
            "disk_total_gb": 64.0,
            "network_bytes_sent": 1024u64,
            "network_bytes_recv": 2048u64,
            "uptime_hours": 12.3,
            "timestamp": chrono::Local::now().to_rfc3339()
        })
    }

    /// Topic discovery d'un capteur Home Assistant
    pub fn sensor_discovery_topic(hostname: &str, key: &str) -> String {
        format!("homeassistant/sensor/system_monitor_{hostname}_{key}/config")
    }

    /// Topic discovery du binary sensor ventilateur
    pub fn fan_discovery_topic(hostname: &str) -> String {
        format!("homeassistant/binary_sensor/system_monitor_{hostname}_fan_status/config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio;

    #[tokio::test]
    async fn test_mock_client_publish_subscribe() {
        let client = MockMqttClient::new();

        // Test abonnement
        client.subscribe("test/topic", QoS::AtLeastOnce).await.unwrap();
        assert_eq!(client.get_subscriptions(), vec!["test/topic"]);

        // Test publication
        let payload = b"test message";
        client.publish("test/topic", QoS::AtLeastOnce, true, payload.to_vec()).await.unwrap();

        // Vérifier le message publié
        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "test/topic");
        assert_eq!(messages[0].payload, payload);
        assert!(messages[0].retain);
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let client = MockMqttClient::new();

        let test_data = SysmonMessageBuilder::state_snapshot(42.5, 60.0, 75.1);
        let payload = serde_json::to_vec(&test_data).unwrap();
        client.publish("system_monitor/pi-01/state", QoS::AtLeastOnce, true, payload).await.unwrap();

        // Parse du JSON
        let parsed: Option<serde_json::Value> = client
            .get_last_json_message("system_monitor/pi-01/state")
            .unwrap();
        assert!(parsed.is_some());
        let parsed = parsed.unwrap();
        assert_eq!(parsed["cpu_percent"], 42.5);
        assert!(parsed["cpu_temp"].is_null());
    }

    #[tokio::test]
    async fn test_prefix_search() {
        let client = MockMqttClient::new();
        let topic = SysmonMessageBuilder::sensor_discovery_topic("pi-01", "cpu_percent");
        client.publish(topic, QoS::AtLeastOnce, true, b"{}".to_vec()).await.unwrap();
        client.publish("system_monitor/pi-01/state", QoS::AtLeastOnce, true, b"{}".to_vec()).await.unwrap();

        let discovery = client.find_messages_by_prefix("homeassistant/sensor/");
        assert_eq!(discovery.len(), 1);
    }

    #[test]
    fn test_topic_builders() {
        assert_eq!(SysmonMessageBuilder::base_topic("pi-01"), "system_monitor/pi-01");
        assert_eq!(
            SysmonMessageBuilder::fan_discovery_topic("pi-01"),
            "homeassistant/binary_sensor/system_monitor_pi-01_fan_status/config"
        );
    }
}

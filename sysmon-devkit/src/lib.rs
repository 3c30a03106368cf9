/*!
# Sysmon DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le développement et les tests de l'agent sysmon:
- Stub MQTT pour tests sans broker
- Enregistrement des messages publiés (topic, payload, retain)
- Builders de payloads au format de l'agent
*/

pub mod mqtt_stub;

pub use mqtt_stub::{MockMessage, MockMqttClient, SysmonMessageBuilder};

/// Init logging pour les tests (idempotent)
pub fn init_test_logging() {
    env_logger::try_init().ok();
}

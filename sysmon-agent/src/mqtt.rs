//! MQTT session management
//!
//! Owns the broker session as an explicit state machine: the transport's
//! asynchronous events (ConnAck, disconnect, poll errors) are the only
//! inputs moving the connection state. The "discovery sent" flag lives in
//! the same `Session` and is re-armed on disconnect, so a reconnected
//! session re-announces the catalog exactly once.
//!
//! The event-loop task and the scheduler tick loop run concurrently; the
//! shared `Session` is guarded by a `parking_lot::Mutex` and never held
//! across an await point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS};
use tracing::{debug, error, info, warn};

use crate::config::MqttSettings;
use crate::discovery::DiscoveryPublisher;

/// Delay before re-polling the event loop after a transport error
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub type Shared<T> = Arc<Mutex<T>>;

/// Broker session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Connection state plus the per-session discovery flag. Mutated only
/// from the connection-event path.
#[derive(Debug)]
pub struct Session {
    state: ConnectionState,
    discovery_sent: bool,
}

impl Session {
    pub fn new() -> Self {
        Session {
            state: ConnectionState::Disconnected,
            discovery_sent: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Successful ConnAck. Returns whether the discovery catalog must be
    /// announced for this session; claiming happens here so a duplicate
    /// ConnAck cannot trigger a second in-flight announce.
    pub fn on_connected(&mut self, discovery_enabled: bool) -> bool {
        self.state = ConnectionState::Connected;
        if discovery_enabled && !self.discovery_sent {
            self.discovery_sent = true;
            return true;
        }
        false
    }

    /// Catalog publish failed: release the claim so the next session
    /// retries the announce
    pub fn discovery_failed(&mut self) {
        self.discovery_sent = false;
    }

    /// Broker refused the connection (bad credentials, etc.)
    pub fn on_connection_failed(&mut self) {
        self.state = ConnectionState::Failed;
    }

    /// Genuine disconnect: re-arm discovery for the next session
    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.discovery_sent = false;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Seam between the publishers and the transport, so contract tests can
/// substitute a recording stub for the real client.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

/// Cloneable publish handle over the rumqttc client
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
}

#[async_trait]
impl MessageSink for MqttHandle {
    /// Non-blocking enqueue: a full request queue (broker unreachable and
    /// nothing draining it) is an immediate error, not a stalled tick.
    async fn publish_retained(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, true, payload)
            .with_context(|| format!("failed to publish to {topic}"))
    }
}

/// Owns the broker session: client handle, shared session state and the
/// background event-loop task.
pub struct ConnectionManager {
    handle: MqttHandle,
    session: Shared<Session>,
}

impl ConnectionManager {
    /// Set up the transport and spawn the event-loop task. The actual
    /// connection is established asynchronously; reconnects are driven by
    /// the transport's keep-alive, not by a manager-side backoff loop.
    pub fn connect(
        settings: &MqttSettings,
        client_id: &str,
        discovery: DiscoveryPublisher,
    ) -> Result<Self> {
        if settings.broker.trim().is_empty() {
            anyhow::bail!("MQTT broker address is empty");
        }

        let mut options = MqttOptions::new(client_id, &settings.broker, settings.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        let handle = MqttHandle { client };
        let session: Shared<Session> = Arc::new(Mutex::new(Session::new()));
        session.lock().connecting();

        info!(
            "Connecting to MQTT broker at {}:{}",
            settings.broker, settings.port
        );

        tokio::spawn(run_event_loop(
            eventloop,
            handle.clone(),
            session.clone(),
            discovery,
        ));

        Ok(ConnectionManager { handle, session })
    }

    pub fn handle(&self) -> MqttHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.lock().state()
    }

    /// Deliberate shutdown: close the transport cleanly
    pub async fn shutdown(&self) {
        if let Err(e) = self.handle.client.disconnect().await {
            warn!("Error during MQTT disconnect: {e}");
        }
        self.session.lock().on_disconnected();
    }
}

/// Background task driving the rumqttc event loop and the session state
/// machine. Discovery is announced at most once per connection session.
async fn run_event_loop(
    mut eventloop: EventLoop,
    handle: MqttHandle,
    session: Shared<Session>,
    discovery: DiscoveryPublisher,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to MQTT broker");
                    let announce = session.lock().on_connected(discovery.enabled());
                    if announce {
                        // Announce from its own task: this loop must keep
                        // polling to drain the request queue the catalog
                        // publishes go through.
                        let discovery = discovery.clone();
                        let handle = handle.clone();
                        let session = session.clone();
                        tokio::spawn(async move {
                            match discovery.publish_catalog(&handle).await {
                                Ok(count) => {
                                    info!("Published {count} Home Assistant discovery records");
                                }
                                Err(e) => {
                                    error!("Failed to publish discovery catalog: {e:#}");
                                    session.lock().discovery_failed();
                                }
                            }
                        });
                    }
                } else {
                    error!("Failed to connect to MQTT broker: {:?}", ack.code);
                    session.lock().on_connection_failed();
                }
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                warn!("Disconnected from MQTT broker");
                session.lock().on_disconnected();
            }
            Ok(event) => {
                debug!("MQTT event: {event:?}");
            }
            Err(e) => {
                error!("MQTT connection error: {e}");
                {
                    let mut session = session.lock();
                    session.on_disconnected();
                    session.connecting();
                }
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }
}

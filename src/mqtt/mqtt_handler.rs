use std::time::Duration;

use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::MqttConfig;
use super::publisher::PublishSink;
use crate::mapping::SinkError;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
}

/// Publish sink backed by an MQTT client
///
/// Publishes are at-most-once and never wait: when the client's request queue is full
/// the publish fails with [`SinkError::QueueFull`].
pub struct MqttPublishSink {
    client: AsyncClient,
}

impl MqttPublishSink {
    /// Build the client and start driving its event loop until `shutdown`
    pub fn connect(
        config: &MqttConfig,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options.set_credentials(user, password);
        }

        info!(
            "Connecting to MQTT broker {}:{} as {}",
            config.host, config.port, config.client_id
        );
        let (client, event_loop) = AsyncClient::new(options, config.queue_capacity);
        let task = tokio::spawn(drive_event_loop(event_loop, client.clone(), shutdown));
        (Self { client }, task)
    }
}

impl PublishSink for MqttPublishSink {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| match e {
                ClientError::TryRequest(_) => {
                    SinkError::QueueFull(format!("MQTT request queue rejected publish: {}", e))
                }
                other => SinkError::Unavailable(other.to_string()),
            })
    }
}

async fn drive_event_loop(mut event_loop: EventLoop, client: AsyncClient, shutdown: CancellationToken) {
    let mut state = ConnectionState::Disconnected;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Err(e) = client.try_disconnect() {
                    debug!("MQTT disconnect request not sent: {}", e);
                }
                info!("mqtt shutdown");
                break;
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    state = ConnectionState::Connected;
                    info!("MQTT connected ({:?})", ack.code);
                }
                Ok(event) => debug!("MQTT event: {:?}", event),
                Err(e) => {
                    if state != ConnectionState::Reconnecting {
                        warn!("MQTT connection error: {}, retrying every {:?}", e, RECONNECT_DELAY);
                    } else {
                        debug!("MQTT still unreachable: {}", e);
                    }
                    state = ConnectionState::Reconnecting;
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }
}

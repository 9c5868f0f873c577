//! Broker connection: a rumqttc client plus the task driving its event loop.

use std::time::Duration;

use gattbridge_app::ports::{BrokerClient, BrokerEvent};
use gattbridge_domain::error::GattBridgeError;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backoff::Backoff;
use crate::config::MqttConfig;
use crate::error::MqttError;

/// How long [`MqttBroker::disconnect`] waits for the event loop to wind down.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// A live broker connection.
///
/// The event loop runs on its own task, independent of the peripheral
/// session, and reconnects on its own schedule.
pub struct MqttBroker {
    client: AsyncClient,
    driver: JoinHandle<Result<(), MqttError>>,
}

impl MqttBroker {
    /// Start connecting. Connection state is reported on `events`.
    #[must_use]
    pub fn connect(config: &MqttConfig, events: mpsc::Sender<BrokerEvent>) -> Self {
        let (client, eventloop) =
            AsyncClient::new(config.options(), config.request_channel_capacity.max(1));
        tracing::info!(
            host = %config.broker_host,
            port = config.broker_port,
            client_id = %config.client_id,
            "connecting to broker"
        );
        let backoff = Backoff::new(config.reconnect_initial(), config.reconnect_max());
        let driver = tokio::spawn(drive(eventloop, events, backoff, config.auto_reconnect));
        Self { client, driver }
    }

    /// A cheap handle for publishing.
    #[must_use]
    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// Whether the event loop task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.driver.is_finished()
    }

    /// Send a disconnect and stop the event loop.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Client`] if the disconnect request could not be
    /// queued.
    pub async fn disconnect(self) -> Result<(), MqttError> {
        let requested = self.client.try_disconnect().map_err(MqttError::Client);
        let mut driver = self.driver;
        match tokio::time::timeout(DISCONNECT_GRACE, &mut driver).await {
            Ok(Ok(Err(err))) => tracing::debug!(%err, "event loop ended with error"),
            Ok(_) => {}
            Err(_) => {
                tracing::debug!("event loop did not stop in time, aborting");
                driver.abort();
            }
        }
        requested
    }
}

/// Non-blocking [`BrokerClient`] backed by the rumqttc request queue.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl BrokerClient for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), GattBridgeError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .map_err(MqttError::Client)?;
        Ok(())
    }
}

async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::Sender<BrokerEvent>,
    mut backoff: Backoff,
    auto_reconnect: bool,
) -> Result<(), MqttError> {
    let mut connected = false;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::info!(session_present = ack.session_present, "broker connected");
                connected = true;
                backoff.reset();
                let _ = events
                    .send(BrokerEvent::Connected {
                        session_present: ack.session_present,
                    })
                    .await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let _ = events
                    .send(BrokerEvent::MessageArrived {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    })
                    .await;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!("disconnected from broker");
                if connected {
                    let _ = events.send(BrokerEvent::ConnectionLost).await;
                }
                return Ok(());
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                tracing::debug!("all broker clients dropped");
                return Ok(());
            }
            Err(err) => {
                if connected {
                    tracing::warn!(%err, "broker connection lost");
                    connected = false;
                    let _ = events.send(BrokerEvent::ConnectionLost).await;
                } else {
                    tracing::debug!(%err, "broker connection attempt failed");
                }
                if !auto_reconnect {
                    return Err(MqttError::Connection(err));
                }
                let delay = backoff.next_delay();
                tracing::debug!(delay_ms = delay.as_millis(), "reconnecting to broker");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

//! End-to-end tests for the gattbridged wiring.
//!
//! Each test assembles the real session manager, event bus, and event bridge
//! around a scripted peripheral and a recording broker, then drives them the
//! way the daemon does. No radio or broker is needed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gattbridge_app::bridge::{BridgeConfig, BrokerStatus, EventBridge};
use gattbridge_app::event_bus::InProcessEventBus;
use gattbridge_app::ports::{BrokerClient, BrokerEvent, LinkId, Transport, TransportEvent};
use gattbridge_app::session::{SessionConfig, SessionHandle, SessionManager, SessionState};
use gattbridge_domain::error::GattBridgeError;
use gattbridge_domain::gatt::{CharProperties, Characteristic, Service};
use gattbridge_domain::registry::{
    BUTTON_A_DATA, MAGNETOMETER_BEARING, Role, Sensor, TEMPERATURE_DATA,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A peripheral exposing the temperature, button, and magnetometer services.
#[derive(Default)]
struct ScriptedPeripheral {
    links: AtomicU64,
}

fn service(sensor: Sensor) -> Service {
    let channels = sensor
        .period_channel()
        .into_iter()
        .chain(sensor.measurement_channels().iter().copied());
    Service {
        uuid: sensor.service_uuid(),
        characteristics: channels
            .map(|channel| Characteristic {
                uuid: channel.uuid(),
                service_uuid: sensor.service_uuid(),
                properties: CharProperties {
                    read: true,
                    write: channel.role() == Role::Period,
                    notify: channel.role().is_measurement(),
                },
            })
            .collect(),
    }
}

impl Transport for ScriptedPeripheral {
    fn is_available(&self) -> bool {
        true
    }

    async fn connect(&self, _address: &str) -> Result<LinkId, GattBridgeError> {
        Ok(self.links.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn discover_services(&self) -> Result<Vec<Service>, GattBridgeError> {
        Ok(vec![
            service(Sensor::Temperature),
            service(Sensor::Button),
            service(Sensor::Magnetometer),
        ])
    }

    async fn read(&self, _characteristic: &Characteristic) -> Result<Vec<u8>, GattBridgeError> {
        // every read during setup targets a period characteristic
        Ok(vec![0x50, 0x00])
    }

    async fn write(&self, _: &Characteristic, _: &[u8]) -> Result<(), GattBridgeError> {
        Ok(())
    }

    async fn set_notification(&self, _: &Characteristic, _: bool) -> Result<(), GattBridgeError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GattBridgeError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), GattBridgeError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingBroker {
    published: Mutex<Vec<(String, String)>>,
}

impl RecordingBroker {
    fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

impl BrokerClient for RecordingBroker {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), GattBridgeError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

struct Harness {
    session: SessionHandle,
    peripheral: mpsc::Sender<TransportEvent>,
    broker_events: mpsc::Sender<BrokerEvent>,
    broker: Arc<RecordingBroker>,
    status: tokio::sync::watch::Receiver<BrokerStatus>,
}

fn harness(bridge_config: BridgeConfig) -> Harness {
    let bus = Arc::new(InProcessEventBus::new(256));

    let (broker_events, broker_rx) = mpsc::channel(16);
    let broker = Arc::new(RecordingBroker::default());
    let bridge = EventBridge::new(Arc::clone(&broker), bridge_config);
    let status = bridge.status();
    let _bridge_task = bridge.start(bus.subscribe(), broker_rx);

    let (peripheral, transport_rx) = mpsc::channel(16);
    let (session, _task) = SessionManager::start(
        ScriptedPeripheral::default(),
        transport_rx,
        bus,
        SessionConfig::default(),
    );

    Harness {
        session,
        peripheral,
        broker_events,
        broker,
        status,
    }
}

impl Harness {
    async fn ready(&self) {
        self.session.connect("C4:7F:51:00:00:01").await.unwrap();
        self.session
            .watch_state()
            .wait_for(|state| *state == SessionState::Ready)
            .await
            .unwrap();
    }

    async fn notify(&self, uuid: Uuid, value: &[u8]) {
        self.peripheral
            .send(TransportEvent::Notification {
                uuid,
                value: value.to_vec(),
            })
            .await
            .unwrap();
    }

    async fn broker_up(&self) {
        self.broker_events
            .send(BrokerEvent::Connected {
                session_present: false,
            })
            .await
            .unwrap();
    }
}

/// Let every task drain its queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn should_publish_notifications_to_their_topics() {
    let harness = harness(BridgeConfig::default());
    harness.broker_up().await;
    harness.ready().await;

    harness.notify(TEMPERATURE_DATA, &[0x15]).await;
    harness.notify(BUTTON_A_DATA, &[0x01]).await;
    harness.notify(MAGNETOMETER_BEARING, &[0xe1, 0x00]).await;
    settle().await;

    assert_eq!(
        harness.broker.published(),
        vec![
            ("TOPIC_TEMPERATURE".to_string(), "21".to_string()),
            ("TOPIC_BUTTON".to_string(), "A_1".to_string()),
            ("TOPIC_MAGNETOMETER_BEARING".to_string(), "SW - 225".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn should_not_publish_period_read_backs() {
    let harness = harness(BridgeConfig::default());
    harness.broker_up().await;
    harness.ready().await;
    settle().await;

    assert!(harness.broker.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn should_prefix_topics_with_base_topic() {
    let harness = harness(BridgeConfig {
        base_topic: Some("lab".to_string()),
        ..BridgeConfig::default()
    });
    harness.broker_up().await;
    harness.ready().await;

    harness.notify(TEMPERATURE_DATA, &[0x16]).await;
    settle().await;

    assert_eq!(
        harness.broker.published(),
        vec![("lab/TOPIC_TEMPERATURE".to_string(), "22".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn should_buffer_until_broker_connects_and_drop_oldest() {
    let mut harness = harness(BridgeConfig {
        buffer_capacity: 2,
        base_topic: None,
    });
    harness.ready().await;

    for value in [0x14, 0x15, 0x16] {
        harness.notify(TEMPERATURE_DATA, &[value]).await;
    }
    settle().await;
    assert!(harness.broker.published().is_empty());
    assert_eq!(
        *harness.status.borrow_and_update(),
        BrokerStatus::Disconnected { buffered: 2 }
    );

    harness.broker_up().await;
    settle().await;

    assert_eq!(
        harness.broker.published(),
        vec![
            ("TOPIC_TEMPERATURE".to_string(), "21".to_string()),
            ("TOPIC_TEMPERATURE".to_string(), "22".to_string()),
        ]
    );
    assert_eq!(*harness.status.borrow(), BrokerStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn should_rerun_setup_after_reconnect() {
    let harness = harness(BridgeConfig::default());
    harness.broker_up().await;
    harness.ready().await;

    harness.session.disconnect().await.unwrap();
    harness
        .session
        .watch_state()
        .wait_for(|state| *state == SessionState::Disconnected)
        .await
        .unwrap();

    harness.ready().await;
    harness.notify(BUTTON_A_DATA, &[0x00]).await;
    settle().await;

    assert_eq!(
        harness.broker.published(),
        vec![("TOPIC_BUTTON".to_string(), "A_0".to_string())]
    );
}

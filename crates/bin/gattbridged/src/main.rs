//! # gattbridged: gattbridge daemon
//!
//! Composition root that wires the adapters together and runs the bridge.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars) and install logging
//! - Start the broker connection and the event bridge
//! - Start the BLE transport and the peripheral session
//! - Reconnect the peripheral after the link drops
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use gattbridge_adapter_ble::BleTransport;
use gattbridge_adapter_mqtt::MqttBroker;
use gattbridge_app::bridge::{BrokerStatus, EventBridge};
use gattbridge_app::event_bus::InProcessEventBus;
use gattbridge_app::poller::Poller;
use gattbridge_app::session::{SessionEvent, SessionHandle, SessionManager, SessionState};
use gattbridge_domain::registry;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const EVENT_BUS_CAPACITY: usize = 256;
const CHANNEL_CAPACITY: usize = 64;
/// Wait before reconnecting to a peripheral that dropped the link.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Event bus
    let bus = Arc::new(InProcessEventBus::new(EVENT_BUS_CAPACITY));
    let report_task = tokio::spawn(report(bus.subscribe()));

    // Broker
    let (broker_tx, broker_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let broker = MqttBroker::connect(&config.mqtt, broker_tx);
    let bridge = EventBridge::new(broker.publisher(), config.bridge_config());
    let status_task = tokio::spawn(report_broker_status(bridge.status()));
    let bridge_task = bridge.start(bus.subscribe(), broker_rx);

    // Peripheral
    let (transport_tx, transport_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let transport = BleTransport::new(config.ble.clone(), transport_tx).await;
    let (session, session_task) = SessionManager::start(
        transport,
        transport_rx,
        Arc::clone(&bus),
        config.session_config(),
    );

    let supervisor = match &config.device.address {
        Some(address) => {
            session.connect(address.clone()).await?;
            Some(tokio::spawn(supervise(session.clone(), address.clone())))
        }
        None => {
            tracing::warn!("no device address configured, set [device] address or GATTBRIDGE_DEVICE");
            None
        }
    };

    let poller = config.poll_period().map(|period| {
        Poller::start(session.clone(), config.poller.channel.uuid(), period)
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    if let Some(supervisor) = supervisor {
        supervisor.abort();
        let _ = supervisor.await;
    }
    if let Some(poller) = poller {
        poller.stop().await;
    }
    if let Err(err) = session.close().await {
        tracing::warn!(error = %err, "failed to close session");
    }
    // the session task, and with it the last publisher, ends once every handle is gone
    drop(session);
    session_task.await?;
    drop(bus);
    bridge_task.await?;
    report_task.await?;

    broker.disconnect().await?;
    status_task.abort();
    Ok(())
}

/// Log session events, standing in for a presentation layer.
async fn report(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged(state)) => tracing::info!(%state, "session state"),
            Ok(SessionEvent::Connected { address }) => tracing::info!(%address, "device connected"),
            Ok(SessionEvent::Disconnected) => tracing::info!("device disconnected"),
            Ok(SessionEvent::ServicesDiscovered(services)) => {
                for (uuid, name) in services {
                    tracing::info!(%uuid, %name, "service");
                }
            }
            Ok(SessionEvent::DiscoveryFailed { attempts }) => {
                tracing::error!(attempts, "service discovery failed");
            }
            Ok(SessionEvent::Sample(sample)) => {
                let name = registry::lookup_name(sample.uuid, "unknown");
                tracing::info!(seq = sample.seq, characteristic = name, value = %sample.value, "sample");
            }
            Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "report fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn report_broker_status(mut status: watch::Receiver<BrokerStatus>) {
    while status.changed().await.is_ok() {
        match *status.borrow_and_update() {
            BrokerStatus::Connected => tracing::info!("broker link up"),
            BrokerStatus::Disconnected { buffered } => {
                tracing::warn!(buffered, "broker link down, buffering");
            }
        }
    }
}

/// Reconnect whenever the session falls back to `Disconnected`.
async fn supervise(session: SessionHandle, address: String) {
    let mut state = session.watch_state();
    while state.changed().await.is_ok() {
        if *state.borrow_and_update() != SessionState::Disconnected {
            continue;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
        tracing::info!(%address, "reconnecting to device");
        if let Err(err) = session.connect(address.clone()).await {
            tracing::error!(%address, error = %err, "reconnect refused, giving up");
            break;
        }
    }
}

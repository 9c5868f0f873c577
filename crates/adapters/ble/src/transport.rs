//! [`Transport`] implementation over a `btleplug` central.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use btleplug::api::{
    BDAddr, Central as _, CentralEvent, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use gattbridge_app::ports::{LinkId, Transport, TransportEvent};
use gattbridge_domain::error::GattBridgeError;
use gattbridge_domain::gatt::{Characteristic, Service};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use crate::config::BleConfig;
use crate::error::BleError;
use crate::gatt;

/// How often the peripheral list is checked while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The peripheral currently held, plus its forwarding tasks.
struct Link {
    address: BDAddr,
    peripheral: Peripheral,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// GATT transport for a single peripheral.
pub struct BleTransport {
    config: BleConfig,
    adapter: Option<Adapter>,
    events: mpsc::Sender<TransportEvent>,
    link: Mutex<Option<Link>>,
    /// Id handed to the next link brought up.
    next_link: AtomicU64,
}

impl BleTransport {
    /// Pick the first BLE adapter on the host.
    ///
    /// A host without a usable adapter still yields a transport; it reports
    /// itself unavailable and refuses to connect.
    pub async fn new(config: BleConfig, events: mpsc::Sender<TransportEvent>) -> Self {
        let adapter = match first_adapter().await {
            Ok(adapter) => Some(adapter),
            Err(err) => {
                tracing::warn!(%err, "BLE transport unavailable");
                None
            }
        };
        Self {
            config,
            adapter,
            events,
            link: Mutex::new(None),
            next_link: AtomicU64::new(1),
        }
    }

    async fn connect_inner(&self, address: &str) -> Result<LinkId, BleError> {
        let adapter = self.adapter.as_ref().ok_or(BleError::NotAvailable)?;
        let address: BDAddr = address.parse().map_err(BleError::InvalidAddress)?;

        let mut link = self.link.lock().await;
        let peripheral = match link.as_mut() {
            Some(current) if current.address == address => {
                tracing::debug!(%address, "reusing peripheral handle");
                current.stop_tasks();
                current.peripheral.clone()
            }
            _ => {
                if let Some(mut previous) = link.take() {
                    previous.stop_tasks();
                    if let Err(err) = previous.peripheral.disconnect().await {
                        tracing::debug!(%err, "failed to drop previous peripheral");
                    }
                }
                find_peripheral(adapter, address, self.config.scan_timeout()).await?
            }
        };

        if !peripheral.is_connected().await? {
            tokio::time::timeout(self.config.connect_timeout(), peripheral.connect())
                .await
                .map_err(|_| BleError::Timeout)??;
        }
        let id = self.next_link.fetch_add(1, Ordering::Relaxed);
        tracing::info!(%address, link = id, "peripheral connected");

        let tasks = vec![
            tokio::spawn(forward_notifications(
                peripheral.clone(),
                self.events.clone(),
            )),
            tokio::spawn(watch_link(
                adapter.clone(),
                peripheral.id(),
                id,
                self.events.clone(),
            )),
        ];
        *link = Some(Link {
            address,
            peripheral,
            tasks,
        });
        Ok(id)
    }

    async fn discover_inner(&self) -> Result<Vec<Service>, BleError> {
        let link = self.link.lock().await;
        let link = link.as_ref().ok_or(BleError::NotConnected)?;
        link.peripheral.discover_services().await?;
        Ok(link.peripheral.services().iter().map(gatt::service).collect())
    }

    async fn read_inner(&self, characteristic: &Characteristic) -> Result<Vec<u8>, BleError> {
        let link = self.link.lock().await;
        let link = link.as_ref().ok_or(BleError::NotConnected)?;
        let target = gatt::find_characteristic(&link.peripheral, characteristic.uuid)?;
        Ok(link.peripheral.read(&target).await?)
    }

    async fn write_inner(&self, characteristic: &Characteristic, value: &[u8]) -> Result<(), BleError> {
        let link = self.link.lock().await;
        let link = link.as_ref().ok_or(BleError::NotConnected)?;
        let target = gatt::find_characteristic(&link.peripheral, characteristic.uuid)?;
        link.peripheral
            .write(&target, value, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn set_notification_inner(
        &self,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> Result<(), BleError> {
        let link = self.link.lock().await;
        let link = link.as_ref().ok_or(BleError::NotConnected)?;
        let target = gatt::find_characteristic(&link.peripheral, characteristic.uuid)?;
        if enabled {
            link.peripheral.subscribe(&target).await?;
        } else {
            link.peripheral.unsubscribe(&target).await?;
        }
        Ok(())
    }

    async fn disconnect_inner(&self) -> Result<(), BleError> {
        let mut link = self.link.lock().await;
        let Some(link) = link.as_mut() else {
            return Ok(());
        };
        // the handle stays around so a reconnect to the same address can reuse it
        link.stop_tasks();
        link.peripheral.disconnect().await?;
        tracing::info!(address = %link.address, "peripheral disconnected");
        Ok(())
    }

    async fn close_inner(&self) -> Result<(), BleError> {
        let Some(mut link) = self.link.lock().await.take() else {
            return Ok(());
        };
        link.stop_tasks();
        if link.peripheral.is_connected().await? {
            link.peripheral.disconnect().await?;
        }
        tracing::debug!(address = %link.address, "peripheral handle released");
        Ok(())
    }
}

impl Transport for BleTransport {
    fn is_available(&self) -> bool {
        self.adapter.is_some()
    }

    async fn connect(&self, address: &str) -> Result<LinkId, GattBridgeError> {
        Ok(self.connect_inner(address).await?)
    }

    async fn discover_services(&self) -> Result<Vec<Service>, GattBridgeError> {
        Ok(self.discover_inner().await?)
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, GattBridgeError> {
        Ok(self.read_inner(characteristic).await?)
    }

    async fn write(&self, characteristic: &Characteristic, value: &[u8]) -> Result<(), GattBridgeError> {
        Ok(self.write_inner(characteristic, value).await?)
    }

    async fn set_notification(
        &self,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> Result<(), GattBridgeError> {
        Ok(self.set_notification_inner(characteristic, enabled).await?)
    }

    async fn disconnect(&self) -> Result<(), GattBridgeError> {
        Ok(self.disconnect_inner().await?)
    }

    async fn close(&self) -> Result<(), GattBridgeError> {
        Ok(self.close_inner().await?)
    }
}

async fn first_adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::NotAvailable)
}

async fn known_peripheral(adapter: &Adapter, address: BDAddr) -> Result<Option<Peripheral>, BleError> {
    Ok(adapter
        .peripherals()
        .await?
        .into_iter()
        .find(|p| p.address() == address))
}

/// Look the peripheral up, scanning for up to `scan_timeout` if the host
/// has not seen it yet.
async fn find_peripheral(
    adapter: &Adapter,
    address: BDAddr,
    scan_timeout: Duration,
) -> Result<Peripheral, BleError> {
    if let Some(peripheral) = known_peripheral(adapter, address).await? {
        return Ok(peripheral);
    }

    tracing::info!(%address, timeout_secs = scan_timeout.as_secs(), "scanning for peripheral");
    adapter.start_scan(ScanFilter::default()).await?;
    let deadline = tokio::time::Instant::now() + scan_timeout;
    let found = loop {
        match known_peripheral(adapter, address).await {
            Ok(Some(peripheral)) => break Ok(Some(peripheral)),
            Ok(None) if tokio::time::Instant::now() >= deadline => break Ok(None),
            Ok(None) => tokio::time::sleep(SCAN_POLL_INTERVAL).await,
            Err(err) => break Err(err),
        }
    };
    if let Err(err) = adapter.stop_scan().await {
        tracing::warn!(%err, "failed to stop scan");
    }

    found?.ok_or_else(|| BleError::PeripheralNotFound {
        address: address.to_string(),
    })
}

async fn forward_notifications(peripheral: Peripheral, events: mpsc::Sender<TransportEvent>) {
    let mut notifications = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(%err, "notification stream unavailable");
            return;
        }
    };
    while let Some(notification) = notifications.next().await {
        let event = TransportEvent::Notification {
            uuid: notification.uuid,
            value: notification.value,
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

/// Report loss of `link` to the peripheral `id`.
async fn watch_link(
    adapter: Adapter,
    id: PeripheralId,
    link: LinkId,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut central_events = match adapter.events().await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(%err, "central event stream unavailable");
            return;
        }
    };
    while let Some(event) = central_events.next().await {
        if let CentralEvent::DeviceDisconnected(gone) = event
            && gone == id
        {
            tracing::info!(link, "peripheral dropped the link");
            let _ = events.send(TransportEvent::Disconnected { link }).await;
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattbridge_domain::gatt::CharProperties;

    fn without_adapter() -> (BleTransport, mpsc::Receiver<TransportEvent>) {
        let (events, rx) = mpsc::channel(4);
        let transport = BleTransport {
            config: BleConfig::default(),
            adapter: None,
            events,
            link: Mutex::new(None),
            next_link: AtomicU64::new(1),
        };
        (transport, rx)
    }

    fn characteristic() -> Characteristic {
        Characteristic {
            uuid: uuid::Uuid::nil(),
            service_uuid: uuid::Uuid::nil(),
            properties: CharProperties::default(),
        }
    }

    #[tokio::test]
    async fn should_refuse_to_connect_without_adapter() {
        let (transport, _rx) = without_adapter();
        assert!(!transport.is_available());
        let err = transport.connect("C4:7F:51:00:00:01").await.unwrap_err();
        assert!(matches!(err, GattBridgeError::TransportUnavailable));
    }

    #[tokio::test]
    async fn should_require_a_link_for_gatt_operations() {
        let (transport, _rx) = without_adapter();
        assert!(matches!(
            transport.discover_inner().await,
            Err(BleError::NotConnected)
        ));
        assert!(matches!(
            transport.read_inner(&characteristic()).await,
            Err(BleError::NotConnected)
        ));
        assert!(matches!(
            transport.set_notification_inner(&characteristic(), true).await,
            Err(BleError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn should_close_and_disconnect_idempotently_without_link() {
        let (transport, _rx) = without_adapter();
        transport.disconnect().await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn should_not_report_explicit_disconnect_as_link_loss() {
        let (transport, mut rx) = without_adapter();
        transport.disconnect().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}

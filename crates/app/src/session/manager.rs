//! Session manager: the task that owns the transport.
//!
//! Commands from [`SessionHandle`], transport events, and scheduler
//! deadlines are funnelled into one loop. Every transport operation is
//! awaited inside that loop, so the peripheral never sees more than one
//! operation in flight.

use std::collections::VecDeque;

use gattbridge_domain::error::GattBridgeError;
use gattbridge_domain::registry::Sensor;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::SessionConfig;
use super::machine::{Effect, Input, SessionMachine, SessionState};
use crate::ports::{EventPublisher, Transport, TransportEvent};

const COMMAND_CAPACITY: usize = 32;

type Reply = oneshot::Sender<Result<(), GattBridgeError>>;

#[derive(Debug)]
enum Command {
    Connect { address: String, reply: Reply },
    Disconnect,
    SetPeriod { sensor: Sensor, ms: u16, reply: Reply },
    Read { uuid: Uuid, reply: Reply },
    Close { reply: Reply },
}

/// Cloneable front door to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Start connecting to `address`.
    ///
    /// Returns once the request is accepted; link-up is reported through
    /// the event bus.
    ///
    /// # Errors
    ///
    /// - [`GattBridgeError::TransportUnavailable`] when no radio is present
    /// - [`GattBridgeError::InvalidAddress`] for an empty address
    /// - [`GattBridgeError::SessionClosed`] when the session task has stopped
    pub async fn connect(&self, address: impl Into<String>) -> Result<(), GattBridgeError> {
        let address = address.into();
        self.request(|reply| Command::Connect { address, reply })
            .await
    }

    /// Drop the link and cancel any pending setup.
    ///
    /// # Errors
    ///
    /// Returns [`GattBridgeError::SessionClosed`] when the session task has stopped.
    pub async fn disconnect(&self) -> Result<(), GattBridgeError> {
        self.commands
            .send(Command::Disconnect)
            .await
            .map_err(|_| GattBridgeError::SessionClosed)
    }

    /// Change a sensor's sampling period and read it back.
    ///
    /// # Errors
    ///
    /// - [`GattBridgeError::NotReady`] before services are discovered
    /// - [`GattBridgeError::NoSamplingPeriod`] for a sensor without a
    ///   sampling period, such as the buttons
    /// - [`GattBridgeError::UnknownCharacteristic`] when the peripheral does
    ///   not expose the sensor's period characteristic
    /// - [`GattBridgeError::SessionClosed`] when the session task has stopped
    pub async fn set_period(&self, sensor: Sensor, ms: u16) -> Result<(), GattBridgeError> {
        self.request(|reply| Command::SetPeriod { sensor, ms, reply })
            .await
    }

    /// Read one characteristic. The value arrives as a sample on the event
    /// bus. Ignored while setup is still running.
    ///
    /// # Errors
    ///
    /// - [`GattBridgeError::UnknownCharacteristic`] when the peripheral does
    ///   not expose `uuid`
    /// - [`GattBridgeError::SessionClosed`] when the session task has stopped
    pub async fn read(&self, uuid: Uuid) -> Result<(), GattBridgeError> {
        self.request(|reply| Command::Read { uuid, reply }).await
    }

    /// Disconnect if needed and release the transport. Safe to call twice.
    ///
    /// # Errors
    ///
    /// Returns [`GattBridgeError::SessionClosed`] when the session task has stopped.
    pub async fn close(&self) -> Result<(), GattBridgeError> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch session state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> Result<(), GattBridgeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| GattBridgeError::SessionClosed)?;
        response.await.map_err(|_| GattBridgeError::SessionClosed)?
    }
}

/// Owns the transport and the state machine for one peripheral.
pub struct SessionManager<T, P> {
    transport: T,
    publisher: P,
    machine: SessionMachine,
    commands: mpsc::Receiver<Command>,
    transport_events: mpsc::Receiver<TransportEvent>,
    state: watch::Sender<SessionState>,
}

impl<T, P> SessionManager<T, P>
where
    T: Transport + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Spawn the session task.
    ///
    /// `transport_events` must be the receiving end of the channel the
    /// transport adapter emits on. The task runs until every
    /// [`SessionHandle`] is dropped, then closes the transport.
    pub fn start(
        transport: T,
        transport_events: mpsc::Receiver<TransportEvent>,
        publisher: P,
        config: SessionConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (state, state_rx) = watch::channel(SessionState::Disconnected);
        let manager = Self {
            transport,
            publisher,
            machine: SessionMachine::new(config),
            commands,
            transport_events,
            state,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (handle, tokio::spawn(manager.run()))
    }

    async fn run(mut self) {
        loop {
            let deadline = self.machine.next_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(event) = self.transport_events.recv() => {
                    self.dispatch(Input::Transport(event)).await;
                }
                () = wait_until(deadline) => self.dispatch(Input::Tick).await,
            }
        }
        tracing::debug!("session handles dropped, closing transport");
        if let Err(err) = self.transport.close().await {
            tracing::warn!(error = %err, "failed to close transport");
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { address, reply } => {
                if !self.transport.is_available() {
                    let _ = reply.send(Err(GattBridgeError::TransportUnavailable));
                    return;
                }
                self.respond(Input::Connect { address }, reply).await;
            }
            Command::Disconnect => self.dispatch(Input::Disconnect).await,
            Command::SetPeriod { sensor, ms, reply } => {
                self.respond(Input::SetPeriod { sensor, ms }, reply).await;
            }
            Command::Read { uuid, reply } => self.respond(Input::Poll { uuid }, reply).await,
            Command::Close { reply } => {
                let effects = self.step(Input::Close);
                self.apply(effects.unwrap_or_default()).await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Answer the caller as soon as the command is accepted or rejected,
    /// then carry out its effects.
    async fn respond(&mut self, input: Input, reply: Reply) {
        match self.step(input) {
            Ok(effects) => {
                let _ = reply.send(Ok(()));
                self.apply(effects).await;
            }
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        }
    }

    async fn dispatch(&mut self, input: Input) {
        match self.step(input) {
            Ok(effects) => self.apply(effects).await,
            Err(err) => tracing::warn!(error = %err, "session input rejected"),
        }
    }

    fn step(&mut self, input: Input) -> Result<Vec<Effect>, GattBridgeError> {
        let result = self.machine.handle(input, Instant::now());
        let current = self.machine.state();
        self.state.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
        result
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            let Some(input) = self.execute(effect).await else {
                continue;
            };
            match self.step(input) {
                Ok(more) => queue.extend(more),
                Err(err) => tracing::warn!(error = %err, "follow-up input rejected"),
            }
        }
    }

    /// Perform one effect, returning the input its outcome produces.
    async fn execute(&self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::Connect(address) => match self.transport.connect(&address).await {
                Ok(link) => Some(Input::LinkUp { link }),
                Err(err) => {
                    tracing::warn!(%address, error = %err, "connect failed");
                    Some(Input::ConnectFailed)
                }
            },
            Effect::DiscoverServices => match self.transport.discover_services().await {
                Ok(services) => Some(Input::ServicesDiscovered(services)),
                Err(err) => {
                    tracing::warn!(error = %err, "service discovery failed");
                    Some(Input::DiscoveryFailed)
                }
            },
            Effect::Write {
                characteristic,
                value,
            } => {
                if let Err(err) = self.transport.write(&characteristic, &value).await {
                    tracing::warn!(uuid = %characteristic.uuid, error = %err, "write failed");
                }
                None
            }
            Effect::Read(characteristic) => match self.transport.read(&characteristic).await {
                Ok(value) => Some(Input::ReadCompleted {
                    uuid: characteristic.uuid,
                    value,
                }),
                Err(err) => {
                    tracing::debug!(uuid = %characteristic.uuid, error = %err, "read failed");
                    Some(Input::ReadFailed {
                        uuid: characteristic.uuid,
                    })
                }
            },
            Effect::Subscribe(characteristic) => {
                if let Err(err) = self.transport.set_notification(&characteristic, true).await {
                    tracing::warn!(uuid = %characteristic.uuid, error = %err, "subscribe failed");
                }
                None
            }
            Effect::Disconnect => {
                if let Err(err) = self.transport.disconnect().await {
                    tracing::warn!(error = %err, "disconnect failed");
                }
                None
            }
            Effect::Close => {
                if let Err(err) = self.transport.close().await {
                    tracing::warn!(error = %err, "close failed");
                }
                None
            }
            Effect::Emit(event) => {
                if let Err(err) = self.publisher.publish(event).await {
                    tracing::warn!(error = %err, "failed to publish session event");
                }
                None
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::event_bus::InProcessEventBus;
    use crate::ports::LinkId;
    use crate::session::SessionEvent;
    use crate::session::fixtures::sensor_service;
    use gattbridge_domain::gatt::{Characteristic, Service};
    use gattbridge_domain::registry::{ACCELEROMETER_PERIOD, TEMPERATURE_DATA};
    use gattbridge_domain::sample::SampleValue;
    use tokio::sync::broadcast;

    /// Scripted transport recording every call.
    struct FakeTransport {
        available: bool,
        services: Vec<Service>,
        links: AtomicU64,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for FakeTransport {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn connect(&self, address: &str) -> Result<LinkId, GattBridgeError> {
            self.calls.lock().unwrap().push(format!("connect {address}"));
            Ok(self.links.fetch_add(1, Ordering::Relaxed) + 1)
        }

        async fn discover_services(&self) -> Result<Vec<Service>, GattBridgeError> {
            self.calls.lock().unwrap().push("discover".to_string());
            Ok(self.services.clone())
        }

        async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, GattBridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("read {}", characteristic.uuid));
            Ok(vec![0x19, 0x00])
        }

        async fn write(
            &self,
            characteristic: &Characteristic,
            value: &[u8],
        ) -> Result<(), GattBridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("write {} {value:?}", characteristic.uuid));
            Ok(())
        }

        async fn set_notification(
            &self,
            characteristic: &Characteristic,
            enabled: bool,
        ) -> Result<(), GattBridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("notify {} {enabled}", characteristic.uuid));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), GattBridgeError> {
            self.calls.lock().unwrap().push("disconnect".to_string());
            Ok(())
        }

        async fn close(&self) -> Result<(), GattBridgeError> {
            self.calls.lock().unwrap().push("close".to_string());
            Ok(())
        }
    }

    struct Harness {
        handle: SessionHandle,
        task: JoinHandle<()>,
        events: broadcast::Receiver<SessionEvent>,
        calls: Arc<Mutex<Vec<String>>>,
        notify: mpsc::Sender<TransportEvent>,
    }

    fn start(available: bool, services: Vec<Service>) -> Harness {
        let (events_tx, events_rx) = mpsc::channel(16);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let transport = FakeTransport {
            available,
            services,
            links: AtomicU64::new(0),
            calls: Arc::clone(&calls),
        };
        let bus = Arc::new(InProcessEventBus::new(64));
        let events = bus.subscribe();
        let (handle, task) =
            SessionManager::start(transport, events_rx, bus, SessionConfig::default());
        Harness {
            handle,
            task,
            events,
            calls,
            notify: events_tx,
        }
    }

    async fn wait_for(handle: &SessionHandle, target: SessionState) {
        let mut state = handle.watch_state();
        tokio::time::timeout(Duration::from_secs(30), state.wait_for(|s| *s == target))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    #[tokio::test]
    async fn should_fail_fast_without_transport() {
        let h = start(false, vec![]);
        let result = h.handle.connect("C4:7F:51:00:00:01").await;
        assert!(matches!(result, Err(GattBridgeError::TransportUnavailable)));
        assert_eq!(h.handle.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn should_reject_empty_address() {
        let h = start(true, vec![]);
        let result = h.handle.connect("").await;
        assert!(matches!(result, Err(GattBridgeError::InvalidAddress)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_setup_to_ready_in_order() {
        let h = start(
            true,
            vec![
                sensor_service(Sensor::Accelerometer),
                sensor_service(Sensor::Temperature),
            ],
        );
        h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
        wait_for(&h.handle, SessionState::Ready).await;
        // the reply only comes back once the final subscribe has run
        h.handle.read(Uuid::nil()).await.unwrap_err();

        let calls = h.calls.lock().unwrap().clone();
        let kinds: Vec<&str> = calls
            .iter()
            .map(|c| c.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "connect", "discover", "write", "write", "read", "read", "notify", "notify"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_publish_samples_for_notifications() {
        let mut h = start(true, vec![sensor_service(Sensor::Temperature)]);
        h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
        wait_for(&h.handle, SessionState::Ready).await;

        h.notify
            .send(TransportEvent::Notification {
                uuid: TEMPERATURE_DATA,
                value: vec![0x19],
            })
            .await
            .unwrap();

        loop {
            if let SessionEvent::Sample(sample) = h.events.recv().await.unwrap()
                && sample.uuid == TEMPERATURE_DATA
            {
                assert_eq!(sample.value, SampleValue::Scalar(25));
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_set_period_through_handle() {
        let h = start(true, vec![sensor_service(Sensor::Accelerometer)]);
        assert!(matches!(
            h.handle.set_period(Sensor::Accelerometer, 20).await,
            Err(GattBridgeError::NotReady)
        ));

        h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
        wait_for(&h.handle, SessionState::Ready).await;
        h.handle.set_period(Sensor::Accelerometer, 20).await.unwrap();
        // a later round trip guarantees the write and read-back have run
        h.handle.read(TEMPERATURE_DATA).await.unwrap_err();

        let calls = h.calls.lock().unwrap().clone();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(tail[0], format!("write {ACCELEROMETER_PERIOD} [20, 0]"));
        assert_eq!(tail[1], format!("read {ACCELEROMETER_PERIOD}"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_disconnect_and_reconnect() {
        let h = start(true, vec![]);
        h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
        wait_for(&h.handle, SessionState::Ready).await;

        h.handle.disconnect().await.unwrap();
        wait_for(&h.handle, SessionState::Disconnected).await;

        h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
        wait_for(&h.handle, SessionState::Ready).await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_reach_ready_when_reconnecting_right_after_disconnect() {
        let h = start(true, vec![sensor_service(Sensor::Temperature)]);
        for _ in 0..40 {
            h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
            wait_for(&h.handle, SessionState::Ready).await;
            h.handle.disconnect().await.unwrap();
        }
        h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
        wait_for(&h.handle, SessionState::Ready).await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_reset_when_current_link_drops() {
        let h = start(true, vec![]);
        h.handle.connect("C4:7F:51:00:00:01").await.unwrap();
        wait_for(&h.handle, SessionState::Ready).await;

        // a loss reported for an earlier link changes nothing
        h.notify
            .send(TransportEvent::Disconnected { link: 0 })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.handle.state(), SessionState::Ready);

        h.notify
            .send(TransportEvent::Disconnected { link: 1 })
            .await
            .unwrap();
        wait_for(&h.handle, SessionState::Disconnected).await;
    }

    #[tokio::test]
    async fn should_close_transport_when_handles_dropped() {
        let h = start(true, vec![]);
        h.handle.close().await.unwrap();
        h.handle.close().await.unwrap();
        drop(h.handle);
        h.task.await.unwrap();

        let calls = h.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["close", "close", "close"]);
    }
}

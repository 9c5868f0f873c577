//! Session state machine.
//!
//! Every transport callback, timer tick, and user command enters as an
//! [`Input`]; [`SessionMachine::handle`] applies it and returns the
//! [`Effect`]s the caller must perform, in order. The machine does no IO.

use std::collections::HashMap;
use std::fmt;

use gattbridge_domain::codec;
use gattbridge_domain::error::GattBridgeError;
use gattbridge_domain::gatt::{Characteristic, Service};
use gattbridge_domain::registry::{self, Channel, Role, Sensor};
use gattbridge_domain::sample::{Sample, SampleValue};
use tokio::time::Instant;
use uuid::Uuid;

use super::SessionConfig;
use super::scheduler::{SetupAction, SetupPlan, SetupScheduler};
use crate::ports::{LinkId, TransportEvent};

/// Lifecycle of the link to one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Discovering,
    Configuring,
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Discovering => f.write_str("discovering"),
            Self::Configuring => f.write_str("configuring"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

/// Something the presentation layer or the bridge may want to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Connected { address: String },
    Disconnected,
    /// Every discovered service with its display name.
    ServicesDiscovered(Vec<(Uuid, String)>),
    /// Discovery kept failing and will not be retried.
    DiscoveryFailed { attempts: u32 },
    Sample(Sample),
}

/// Everything that can drive the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Connect { address: String },
    /// The connection request succeeded and `link` is up.
    LinkUp { link: LinkId },
    /// The transport refused the connection request.
    ConnectFailed,
    Disconnect,
    Close,
    Transport(TransportEvent),
    ServicesDiscovered(Vec<Service>),
    DiscoveryFailed,
    ReadCompleted { uuid: Uuid, value: Vec<u8> },
    ReadFailed { uuid: Uuid },
    SetPeriod { sensor: Sensor, ms: u16 },
    /// Read one characteristic on behalf of the poller.
    Poll { uuid: Uuid },
    /// Time has passed; fire whatever is due.
    Tick,
}

/// Work the owner of the transport must carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Connect(String),
    DiscoverServices,
    Write {
        characteristic: Characteristic,
        value: Vec<u8>,
    },
    Read(Characteristic),
    Subscribe(Characteristic),
    Disconnect,
    Close,
    Emit(SessionEvent),
}

/// Transition logic for a single peripheral session.
#[derive(Debug)]
pub struct SessionMachine {
    config: SessionConfig,
    state: SessionState,
    address: Option<String>,
    /// The link currently up, if any. Loss of any other link is stale.
    link: Option<LinkId>,
    scheduler: SetupScheduler,
    plan: Option<SetupPlan>,
    /// Characteristics found at discovery, by UUID.
    characteristics: HashMap<Uuid, Characteristic>,
    /// Roles resolved once at discovery and never reinterpreted.
    roles: HashMap<Uuid, Role>,
    discovery_attempts: u32,
    next_seq: u64,
}

impl SessionMachine {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            address: None,
            link: None,
            scheduler: SetupScheduler::new(),
            plan: None,
            characteristics: HashMap::new(),
            roles: HashMap::new(),
            discovery_attempts: 0,
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The plan built at the last successful discovery, until disconnect.
    #[must_use]
    pub fn plan(&self) -> Option<&SetupPlan> {
        self.plan.as_ref()
    }

    /// When [`Input::Tick`] should next be delivered.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Apply one input.
    ///
    /// # Errors
    ///
    /// Only commands are rejected:
    /// - [`GattBridgeError::InvalidAddress`] for an empty connect address
    /// - [`GattBridgeError::NotReady`] for `SetPeriod` before configuration
    /// - [`GattBridgeError::NoSamplingPeriod`] for `SetPeriod` on a sensor
    ///   without a period characteristic
    /// - [`GattBridgeError::UnknownCharacteristic`] for `SetPeriod` or `Poll`
    ///   naming something the peripheral does not have
    pub fn handle(&mut self, input: Input, now: Instant) -> Result<Vec<Effect>, GattBridgeError> {
        let mut effects = Vec::new();
        match input {
            Input::Connect { address } => self.on_connect(address, &mut effects)?,
            Input::ConnectFailed => {
                if self.state == SessionState::Connecting {
                    tracing::warn!(address = ?self.address, "connection request failed");
                    self.reset(&mut effects);
                }
            }
            Input::Disconnect => {
                if self.state != SessionState::Disconnected {
                    effects.push(Effect::Disconnect);
                    self.reset(&mut effects);
                }
            }
            Input::Close => {
                self.reset(&mut effects);
                effects.push(Effect::Close);
            }
            Input::LinkUp { link } => self.on_link_up(link, now, &mut effects),
            Input::Transport(TransportEvent::Disconnected { link }) => {
                if self.link == Some(link) {
                    self.reset(&mut effects);
                } else {
                    tracing::debug!(link, current = ?self.link, "loss of stale link ignored");
                }
            }
            Input::Transport(TransportEvent::Notification { uuid, value }) => {
                self.on_value(uuid, &value, &mut effects);
            }
            Input::ServicesDiscovered(services) => self.on_discovered(&services, now, &mut effects),
            Input::DiscoveryFailed => self.on_discovery_failed(now, &mut effects),
            Input::ReadCompleted { uuid, value } => self.on_value(uuid, &value, &mut effects),
            Input::ReadFailed { uuid } => {
                tracing::warn!(%uuid, "characteristic read failed, no sample emitted");
            }
            Input::SetPeriod { sensor, ms } => self.on_set_period(sensor, ms, &mut effects)?,
            Input::Poll { uuid } => self.on_poll(uuid, &mut effects)?,
            Input::Tick => self.on_tick(now, &mut effects),
        }
        Ok(effects)
    }

    fn transition(&mut self, to: SessionState, effects: &mut Vec<Effect>) {
        if self.state != to {
            tracing::debug!(from = %self.state, %to, "session state changed");
            self.state = to;
            effects.push(Effect::Emit(SessionEvent::StateChanged(to)));
        }
    }

    fn on_connect(&mut self, address: String, effects: &mut Vec<Effect>) -> Result<(), GattBridgeError> {
        if address.trim().is_empty() {
            return Err(GattBridgeError::InvalidAddress);
        }
        if self.state != SessionState::Disconnected {
            tracing::debug!(state = %self.state, %address, "connect ignored, session already active");
            return Ok(());
        }
        tracing::info!(%address, "connecting");
        self.address = Some(address.clone());
        self.transition(SessionState::Connecting, effects);
        effects.push(Effect::Connect(address));
        Ok(())
    }

    fn on_link_up(&mut self, link: LinkId, now: Instant, effects: &mut Vec<Effect>) {
        if self.state != SessionState::Connecting {
            tracing::debug!(state = %self.state, link, "unexpected link-up ignored");
            return;
        }
        let address = self.address.clone().unwrap_or_default();
        tracing::info!(%address, link, "connected");
        self.link = Some(link);
        self.transition(SessionState::Connected, effects);
        effects.push(Effect::Emit(SessionEvent::Connected { address }));
        self.discovery_attempts = 0;
        self.scheduler
            .schedule(now + self.config.grace, SetupAction::Discover, false);
    }

    fn on_discovered(&mut self, services: &[Service], now: Instant, effects: &mut Vec<Effect>) {
        if self.state != SessionState::Discovering {
            tracing::debug!(state = %self.state, "stale discovery result ignored");
            return;
        }

        let summary = services
            .iter()
            .map(|s| (s.uuid, registry::lookup_name(s.uuid, "Unknown Service").to_string()))
            .collect();
        effects.push(Effect::Emit(SessionEvent::ServicesDiscovered(summary)));

        for characteristic in services.iter().flat_map(|s| &s.characteristics) {
            if let Some(role) = registry::lookup_role(characteristic.uuid) {
                self.roles.insert(characteristic.uuid, role);
            }
            self.characteristics
                .insert(characteristic.uuid, characteristic.clone());
        }

        let plan = SetupPlan::build(services, &self.config.timing);
        tracing::info!(
            services = services.len(),
            active = plan.active.len(),
            reads = plan.reads.len(),
            subscribes = plan.subscribes.len(),
            "services discovered"
        );

        if plan.is_empty() {
            self.plan = Some(plan);
            self.transition(SessionState::Ready, effects);
            return;
        }

        self.transition(SessionState::Configuring, effects);
        let value = codec::encode_period(self.config.period_ms).to_vec();
        for characteristic in &plan.writes {
            effects.push(Effect::Write {
                characteristic: characteristic.clone(),
                value: value.clone(),
            });
        }

        let last_read = plan.reads.len().saturating_sub(1);
        for (i, read) in plan.reads.iter().enumerate() {
            let completes = plan.subscribes.is_empty() && i == last_read;
            self.scheduler.schedule(
                now + read.offset,
                SetupAction::Read(read.characteristic.clone()),
                completes,
            );
        }
        let last_subscribe = plan.subscribes.len().saturating_sub(1);
        for (i, subscribe) in plan.subscribes.iter().enumerate() {
            self.scheduler.schedule(
                now + subscribe.offset,
                SetupAction::Subscribe(subscribe.characteristic.clone()),
                i == last_subscribe,
            );
        }
        self.plan = Some(plan);
    }

    fn on_discovery_failed(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if self.state != SessionState::Discovering {
            return;
        }
        self.discovery_attempts += 1;
        if self.discovery_attempts <= self.config.discovery_retries {
            tracing::warn!(attempt = self.discovery_attempts, "service discovery failed, retrying");
            self.scheduler
                .schedule(now + self.config.grace, SetupAction::Discover, false);
        } else {
            tracing::error!(attempts = self.discovery_attempts, "service discovery failed, giving up");
            effects.push(Effect::Emit(SessionEvent::DiscoveryFailed {
                attempts: self.discovery_attempts,
            }));
        }
    }

    fn on_value(&mut self, uuid: Uuid, value: &[u8], effects: &mut Vec<Effect>) {
        if self.state == SessionState::Disconnected {
            tracing::debug!(%uuid, "value after disconnect dropped");
            return;
        }
        let role = self.roles.get(&uuid).copied();
        let channel = role.and(Channel::from_uuid(uuid));
        let value = codec::try_decode(role, value).unwrap_or_else(|err| {
            tracing::debug!(%uuid, error = %err, "falling back to raw formatting");
            SampleValue::Raw(value.to_vec())
        });
        let seq = self.next_seq;
        self.next_seq += 1;
        effects.push(Effect::Emit(SessionEvent::Sample(Sample::new(
            seq, uuid, channel, value,
        ))));
    }

    fn on_set_period(
        &mut self,
        sensor: Sensor,
        ms: u16,
        effects: &mut Vec<Effect>,
    ) -> Result<(), GattBridgeError> {
        if !matches!(self.state, SessionState::Configuring | SessionState::Ready) {
            return Err(GattBridgeError::NotReady);
        }
        let uuid = sensor
            .period_channel()
            .ok_or(GattBridgeError::NoSamplingPeriod(sensor))?
            .uuid();
        let characteristic = self
            .characteristics
            .get(&uuid)
            .filter(|c| c.channel().is_some_and(|ch| ch.role() == Role::Period))
            .cloned()
            .ok_or(GattBridgeError::UnknownCharacteristic(uuid))?;
        tracing::info!(%sensor, ms, "setting sampling period");
        effects.push(Effect::Write {
            characteristic: characteristic.clone(),
            value: codec::encode_period(ms).to_vec(),
        });
        effects.push(Effect::Read(characteristic));
        Ok(())
    }

    fn on_poll(&mut self, uuid: Uuid, effects: &mut Vec<Effect>) -> Result<(), GattBridgeError> {
        if self.state != SessionState::Ready {
            tracing::trace!(%uuid, state = %self.state, "poll ignored until ready");
            return Ok(());
        }
        let characteristic = self
            .characteristics
            .get(&uuid)
            .cloned()
            .ok_or(GattBridgeError::UnknownCharacteristic(uuid))?;
        effects.push(Effect::Read(characteristic));
        Ok(())
    }

    fn on_tick(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        for scheduled in self.scheduler.pop_due(now) {
            match scheduled.action {
                SetupAction::Discover => {
                    if matches!(self.state, SessionState::Connected | SessionState::Discovering) {
                        self.transition(SessionState::Discovering, effects);
                        effects.push(Effect::DiscoverServices);
                    }
                }
                SetupAction::Read(characteristic) => effects.push(Effect::Read(characteristic)),
                SetupAction::Subscribe(characteristic) => {
                    effects.push(Effect::Subscribe(characteristic));
                }
            }
            if scheduled.completes_setup {
                tracing::info!("setup complete");
                self.transition(SessionState::Ready, effects);
            }
        }
    }

    /// Back to `Disconnected`, dropping everything tied to the link.
    fn reset(&mut self, effects: &mut Vec<Effect>) {
        if self.state == SessionState::Disconnected {
            return;
        }
        let cancelled = self.scheduler.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "pending setup actions cancelled");
        }
        self.link = None;
        self.plan = None;
        self.characteristics.clear();
        self.roles.clear();
        self.discovery_attempts = 0;
        tracing::info!(address = ?self.address, "disconnected");
        self.transition(SessionState::Disconnected, effects);
        effects.push(Effect::Emit(SessionEvent::Disconnected));
    }
}

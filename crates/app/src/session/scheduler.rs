//! Setup plan and the cancellable timer queue that fires it.
//!
//! A GATT link carries one operation at a time. Setup actions are spread
//! out on fixed offsets from the discovery moment: period reads first, then
//! notification subscriptions once the reads have settled.

use std::collections::BTreeMap;
use std::time::Duration;

use gattbridge_domain::gatt::{Characteristic, Service};
use gattbridge_domain::registry::Sensor;
use tokio::time::Instant;

/// Offsets used when laying out a [`SetupPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupTiming {
    pub read_base: Duration,
    pub read_step: Duration,
    pub subscribe_base: Duration,
    pub subscribe_step: Duration,
}

impl Default for SetupTiming {
    fn default() -> Self {
        Self {
            read_base: Duration::from_millis(500),
            read_step: Duration::from_millis(100),
            subscribe_base: Duration::from_millis(1000),
            subscribe_step: Duration::from_millis(200),
        }
    }
}

/// A characteristic and when, relative to discovery, to act on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub characteristic: Characteristic,
    pub offset: Duration,
}

/// Configuration actions computed once per successful discovery.
///
/// Offsets are strictly increasing within `reads` and within `subscribes`,
/// and every subscribe comes after every read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupPlan {
    /// Period characteristics to write immediately.
    pub writes: Vec<Characteristic>,
    pub reads: Vec<PlannedAction>,
    pub subscribes: Vec<PlannedAction>,
    /// Known sensors found on the peripheral, in setup order.
    pub active: Vec<Sensor>,
}

impl SetupPlan {
    /// Lay out the plan for a set of discovered services.
    ///
    /// Unknown services are ignored. Known services missing an expected
    /// characteristic are set up with what they have.
    #[must_use]
    pub fn build(services: &[Service], timing: &SetupTiming) -> Self {
        let mut plan = Self::default();
        let mut reads = Vec::new();
        let mut subscribes = Vec::new();

        for sensor in Sensor::ALL {
            let Some(service) = services.iter().find(|s| s.uuid == sensor.service_uuid()) else {
                continue;
            };
            plan.active.push(sensor);

            if let Some(channel) = sensor.period_channel() {
                match service.characteristic(channel.uuid()) {
                    Some(characteristic) => {
                        plan.writes.push(characteristic.clone());
                        reads.push(characteristic.clone());
                    }
                    None => tracing::warn!(%sensor, %channel, "period characteristic missing"),
                }
            }

            for &channel in sensor.measurement_channels() {
                match service.characteristic(channel.uuid()) {
                    Some(characteristic) if characteristic.properties.notify => {
                        subscribes.push(characteristic.clone());
                    }
                    Some(_) => tracing::debug!(%sensor, %channel, "characteristic does not notify"),
                    None => tracing::warn!(%sensor, %channel, "measurement characteristic missing"),
                }
            }
        }

        let mut offset = timing.read_base;
        for characteristic in reads {
            plan.reads.push(PlannedAction {
                characteristic,
                offset,
            });
            offset += timing.read_step;
        }

        // `offset` is now one step past the last read
        let mut offset = if plan.reads.is_empty() {
            timing.subscribe_base
        } else {
            timing.subscribe_base.max(offset)
        };
        for characteristic in subscribes {
            plan.subscribes.push(PlannedAction {
                characteristic,
                offset,
            });
            offset += timing.subscribe_step;
        }

        plan
    }

    /// True when there is nothing to configure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.reads.is_empty() && self.subscribes.is_empty()
    }
}

/// A timed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupAction {
    /// Start (or retry) service discovery.
    Discover,
    Read(Characteristic),
    Subscribe(Characteristic),
}

/// An action plus whether firing it finishes setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAction {
    pub action: SetupAction,
    pub completes_setup: bool,
}

/// Time-ordered queue of pending actions.
///
/// Actions due at the same instant fire in the order they were scheduled.
#[derive(Debug, Default)]
pub struct SetupScheduler {
    queue: BTreeMap<(Instant, u64), ScheduledAction>,
    next_id: u64,
}

impl SetupScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `action` to fire at `at`.
    pub fn schedule(&mut self, at: Instant, action: SetupAction, completes_setup: bool) {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.insert(
            (at, id),
            ScheduledAction {
                action,
                completes_setup,
            },
        );
    }

    /// When the earliest pending action is due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return every action due at or before `now`, in firing order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<ScheduledAction> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    /// Drop every pending action. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

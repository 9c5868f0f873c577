//! Peripheral session: connection, discovery, and configuration of one
//! GATT peripheral.
//!
//! [`machine`] holds the pure transition logic, [`scheduler`] the timed
//! setup plan, and [`manager`] the task that owns the transport and feeds
//! the machine.

pub mod machine;
pub mod manager;
pub mod scheduler;

use std::time::Duration;

pub use machine::{Effect, Input, SessionEvent, SessionMachine, SessionState};
pub use manager::{SessionHandle, SessionManager};
pub use scheduler::{SetupPlan, SetupScheduler, SetupTiming};

/// Default wait between link-up and service discovery.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(2000);

/// Default sampling period written to every period characteristic.
pub const DEFAULT_PERIOD_MS: u16 = 80;

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between the connected callback and service discovery. Some host
    /// stacks serve stale service caches if discovery starts immediately.
    pub grace: Duration,
    pub timing: SetupTiming,
    /// Sampling period written during setup, in milliseconds.
    pub period_ms: u16,
    /// How many times a failed discovery is retried before giving up.
    pub discovery_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
            timing: SetupTiming::default(),
            period_ms: DEFAULT_PERIOD_MS,
            discovery_retries: 2,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use gattbridge_domain::gatt::{CharProperties, Characteristic, Service};
    use gattbridge_domain::registry::{Role, Sensor};

    /// A service exposing every known characteristic of `sensor`, with the
    /// capabilities a real device advertises.
    pub fn sensor_service(sensor: Sensor) -> Service {
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
                    properties: match channel.role() {
                        Role::Period => CharProperties {
                            read: true,
                            write: true,
                            notify: false,
                        },
                        _ => CharProperties {
                            read: true,
                            write: false,
                            notify: true,
                        },
                    },
                })
                .collect(),
        }
    }
}

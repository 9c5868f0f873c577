//! GATT data model: services and characteristics as discovered on a
//! connected peripheral.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::{Channel, Sensor};

/// Capability flags of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CharProperties {
    pub read: bool,
    pub write: bool,
    /// Notify or indicate.
    pub notify: bool,
}

/// An addressable data item on the peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    /// Owning service; used for lookup only.
    pub service_uuid: Uuid,
    pub properties: CharProperties,
}

impl Characteristic {
    /// Known channel for this characteristic, if any.
    #[must_use]
    pub fn channel(&self) -> Option<Channel> {
        Channel::from_uuid(self.uuid)
    }
}

/// A discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    /// Known sensor for this service, if any.
    #[must_use]
    pub fn sensor(&self) -> Option<Sensor> {
        Sensor::from_service_uuid(self.uuid)
    }

    /// Find a characteristic of this service by UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ACCELEROMETER_DATA, ACCELEROMETER_SERVICE};

    #[test]
    fn should_resolve_sensor_and_channel() {
        let service = Service {
            uuid: ACCELEROMETER_SERVICE,
            characteristics: vec![Characteristic {
                uuid: ACCELEROMETER_DATA,
                service_uuid: ACCELEROMETER_SERVICE,
                properties: CharProperties {
                    read: true,
                    write: false,
                    notify: true,
                },
            }],
        };
        assert_eq!(service.sensor(), Some(Sensor::Accelerometer));
        let c = service.characteristic(ACCELEROMETER_DATA).unwrap();
        assert_eq!(c.channel(), Some(Channel::AccelerometerData));
        assert!(service.characteristic(Uuid::nil()).is_none());
    }
}

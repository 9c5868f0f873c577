//! Conversions between `btleplug` GATT types and the domain model.

use btleplug::api::{self, CharPropFlags, Peripheral as _};
use btleplug::platform::Peripheral;
use gattbridge_domain::gatt::{CharProperties, Characteristic, Service};

use crate::error::BleError;

pub(crate) fn properties(flags: CharPropFlags) -> CharProperties {
    CharProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
    }
}

pub(crate) fn characteristic(c: &api::Characteristic) -> Characteristic {
    Characteristic {
        uuid: c.uuid,
        service_uuid: c.service_uuid,
        properties: properties(c.properties),
    }
}

pub(crate) fn service(s: &api::Service) -> Service {
    Service {
        uuid: s.uuid,
        characteristics: s.characteristics.iter().map(characteristic).collect(),
    }
}

/// Find a GATT characteristic by UUID on a peripheral that has already
/// discovered its services.
///
/// # Errors
///
/// Returns [`BleError::CharacteristicNotFound`] if no characteristic with
/// the given UUID is present.
pub(crate) fn find_characteristic(
    peripheral: &Peripheral,
    uuid: uuid::Uuid,
) -> Result<api::Characteristic, BleError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or(BleError::CharacteristicNotFound { uuid })
}

//! Attribute registry: the fixed set of services and characteristics this
//! bridge understands.
//!
//! The table is immutable and compiled in. Every known characteristic maps to
//! exactly one [`Channel`], and every channel has one [`Role`] that decides
//! how its payload is decoded. Lookups for anything else return `None` (or the
//! caller-supplied default name).
//!
//! | Sensor | Service UUID | Channels |
//! |--------|--------------|----------|
//! | Accelerometer | `e95d0753-…` | data (vector), period |
//! | Temperature | `e95d6100-…` | data (scalar), period |
//! | Button | `e95d9882-…` | button A (scalar), button B (scalar) |
//! | Magnetometer | `e95df2d8-…` | data (vector), period, bearing |

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accelerometer service.
pub const ACCELEROMETER_SERVICE: Uuid = Uuid::from_u128(0xe95d_0753_251d_470a_a062_fa19_22df_a9a8);
/// Accelerometer 3-axis measurement.
pub const ACCELEROMETER_DATA: Uuid = Uuid::from_u128(0xe95d_ca4b_251d_470a_a062_fa19_22df_a9a8);
/// Accelerometer sampling period.
pub const ACCELEROMETER_PERIOD: Uuid = Uuid::from_u128(0xe95d_fb24_251d_470a_a062_fa19_22df_a9a8);

/// Temperature service.
pub const TEMPERATURE_SERVICE: Uuid = Uuid::from_u128(0xe95d_6100_251d_470a_a062_fa19_22df_a9a8);
/// Temperature measurement (whole degrees Celsius).
pub const TEMPERATURE_DATA: Uuid = Uuid::from_u128(0xe95d_9250_251d_470a_a062_fa19_22df_a9a8);
/// Temperature sampling period.
pub const TEMPERATURE_PERIOD: Uuid = Uuid::from_u128(0xe95d_1b25_251d_470a_a062_fa19_22df_a9a8);

/// Button service.
pub const BUTTON_SERVICE: Uuid = Uuid::from_u128(0xe95d_9882_251d_470a_a062_fa19_22df_a9a8);
/// Button A state.
pub const BUTTON_A_DATA: Uuid = Uuid::from_u128(0xe95d_da90_251d_470a_a062_fa19_22df_a9a8);
/// Button B state.
pub const BUTTON_B_DATA: Uuid = Uuid::from_u128(0xe95d_da91_251d_470a_a062_fa19_22df_a9a8);

/// Magnetometer service.
pub const MAGNETOMETER_SERVICE: Uuid = Uuid::from_u128(0xe95d_f2d8_251d_470a_a062_fa19_22df_a9a8);
/// Magnetometer 3-axis measurement.
pub const MAGNETOMETER_DATA: Uuid = Uuid::from_u128(0xe95d_fb11_251d_470a_a062_fa19_22df_a9a8);
/// Magnetometer sampling period.
pub const MAGNETOMETER_PERIOD: Uuid = Uuid::from_u128(0xe95d_386c_251d_470a_a062_fa19_22df_a9a8);
/// Magnetometer compass bearing.
pub const MAGNETOMETER_BEARING: Uuid = Uuid::from_u128(0xe95d_9715_251d_470a_a062_fa19_22df_a9a8);

/// Client Characteristic Configuration descriptor.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// Display names for attributes that have no [`Channel`] (generic services,
/// descriptors) but are still worth naming in logs.
const GENERIC_NAMES: &[(Uuid, &str)] = &[
    (
        Uuid::from_u128(0x0000_1800_0000_1000_8000_0080_5f9b_34fb),
        "Generic Access Profile",
    ),
    (
        Uuid::from_u128(0x0000_1801_0000_1000_8000_0080_5f9b_34fb),
        "Generic Attribute Profile",
    ),
    (
        Uuid::from_u128(0x0000_180a_0000_1000_8000_0080_5f9b_34fb),
        "Device Information Service",
    ),
    (
        CLIENT_CHARACTERISTIC_CONFIG,
        "Client Characteristic Configuration",
    ),
];

/// How a characteristic payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sampling interval, u16 little-endian milliseconds.
    Period,
    /// Three signed 16-bit axes, scaled by 1/1000.
    VectorMeasurement,
    /// Single unsigned byte.
    ScalarMeasurement,
    /// Signed 16-bit heading in degrees.
    Bearing,
}

impl Role {
    /// Whether this role carries sensor data (as opposed to configuration).
    #[must_use]
    pub fn is_measurement(self) -> bool {
        !matches!(self, Self::Period)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Period => f.write_str("period"),
            Self::VectorMeasurement => f.write_str("vector"),
            Self::ScalarMeasurement => f.write_str("scalar"),
            Self::Bearing => f.write_str("bearing"),
        }
    }
}

/// A known sensor service on the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Accelerometer,
    Temperature,
    Button,
    Magnetometer,
}

impl Sensor {
    /// Every known sensor, in setup order.
    pub const ALL: [Self; 4] = [
        Self::Accelerometer,
        Self::Temperature,
        Self::Button,
        Self::Magnetometer,
    ];

    /// Resolve a service UUID to a known sensor.
    #[must_use]
    pub fn from_service_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.service_uuid() == uuid)
    }

    /// GATT service UUID.
    #[must_use]
    pub fn service_uuid(self) -> Uuid {
        match self {
            Self::Accelerometer => ACCELEROMETER_SERVICE,
            Self::Temperature => TEMPERATURE_SERVICE,
            Self::Button => BUTTON_SERVICE,
            Self::Magnetometer => MAGNETOMETER_SERVICE,
        }
    }

    /// Human-readable service name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Accelerometer => "Accelerometer Service",
            Self::Temperature => "Temperature Service",
            Self::Button => "Button Service",
            Self::Magnetometer => "Magnetometer Service",
        }
    }

    /// The channel that configures this sensor's sampling period, if any.
    #[must_use]
    pub fn period_channel(self) -> Option<Channel> {
        match self {
            Self::Accelerometer => Some(Channel::AccelerometerPeriod),
            Self::Temperature => Some(Channel::TemperaturePeriod),
            Self::Button => None,
            Self::Magnetometer => Some(Channel::MagnetometerPeriod),
        }
    }

    /// Channels carrying measurements, in subscribe order.
    #[must_use]
    pub fn measurement_channels(self) -> &'static [Channel] {
        match self {
            Self::Accelerometer => &[Channel::AccelerometerData],
            Self::Temperature => &[Channel::TemperatureData],
            Self::Button => &[Channel::ButtonA, Channel::ButtonB],
            Self::Magnetometer => &[Channel::MagnetometerData, Channel::MagnetometerBearing],
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accelerometer => f.write_str("accelerometer"),
            Self::Temperature => f.write_str("temperature"),
            Self::Button => f.write_str("button"),
            Self::Magnetometer => f.write_str("magnetometer"),
        }
    }
}

/// A known characteristic: one sensor, one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    AccelerometerData,
    AccelerometerPeriod,
    TemperatureData,
    TemperaturePeriod,
    ButtonA,
    ButtonB,
    MagnetometerData,
    MagnetometerPeriod,
    MagnetometerBearing,
}

impl Channel {
    /// Every known channel.
    pub const ALL: [Self; 9] = [
        Self::AccelerometerData,
        Self::AccelerometerPeriod,
        Self::TemperatureData,
        Self::TemperaturePeriod,
        Self::ButtonA,
        Self::ButtonB,
        Self::MagnetometerData,
        Self::MagnetometerPeriod,
        Self::MagnetometerBearing,
    ];

    /// Resolve a characteristic UUID to a known channel.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    /// GATT characteristic UUID.
    #[must_use]
    pub fn uuid(self) -> Uuid {
        match self {
            Self::AccelerometerData => ACCELEROMETER_DATA,
            Self::AccelerometerPeriod => ACCELEROMETER_PERIOD,
            Self::TemperatureData => TEMPERATURE_DATA,
            Self::TemperaturePeriod => TEMPERATURE_PERIOD,
            Self::ButtonA => BUTTON_A_DATA,
            Self::ButtonB => BUTTON_B_DATA,
            Self::MagnetometerData => MAGNETOMETER_DATA,
            Self::MagnetometerPeriod => MAGNETOMETER_PERIOD,
            Self::MagnetometerBearing => MAGNETOMETER_BEARING,
        }
    }

    /// Payload interpretation.
    #[must_use]
    pub fn role(self) -> Role {
        match self {
            Self::AccelerometerData | Self::MagnetometerData => Role::VectorMeasurement,
            Self::AccelerometerPeriod | Self::TemperaturePeriod | Self::MagnetometerPeriod => {
                Role::Period
            }
            Self::TemperatureData | Self::ButtonA | Self::ButtonB => Role::ScalarMeasurement,
            Self::MagnetometerBearing => Role::Bearing,
        }
    }

    /// Owning sensor service.
    #[must_use]
    pub fn sensor(self) -> Sensor {
        match self {
            Self::AccelerometerData | Self::AccelerometerPeriod => Sensor::Accelerometer,
            Self::TemperatureData | Self::TemperaturePeriod => Sensor::Temperature,
            Self::ButtonA | Self::ButtonB => Sensor::Button,
            Self::MagnetometerData | Self::MagnetometerPeriod | Self::MagnetometerBearing => {
                Sensor::Magnetometer
            }
        }
    }

    /// Human-readable characteristic name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AccelerometerData => "Accelerometer Measurement",
            Self::AccelerometerPeriod => "Accelerometer Period",
            Self::TemperatureData => "Temperature Measurement",
            Self::TemperaturePeriod => "Temperature Period",
            Self::ButtonA => "Button A Data",
            Self::ButtonB => "Button B Data",
            Self::MagnetometerData => "Magnetometer Measurement",
            Self::MagnetometerPeriod => "Magnetometer Period",
            Self::MagnetometerBearing => "Magnetometer Bearing",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve the decoding role of a characteristic UUID.
#[must_use]
pub fn lookup_role(uuid: Uuid) -> Option<Role> {
    Channel::from_uuid(uuid).map(Channel::role)
}

/// Resolve a display name for any service, characteristic, or descriptor UUID,
/// falling back to `default` when the UUID is unknown.
#[must_use]
pub fn lookup_name(uuid: Uuid, default: &str) -> &str {
    if let Some(sensor) = Sensor::from_service_uuid(uuid) {
        return sensor.name();
    }
    if let Some(channel) = Channel::from_uuid(uuid) {
        return channel.name();
    }
    GENERIC_NAMES
        .iter()
        .find(|(known, _)| *known == uuid)
        .map_or(default, |(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_resolve_every_channel_from_its_uuid() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_uuid(channel.uuid()), Some(channel));
        }
    }

    #[test]
    fn should_resolve_every_sensor_from_its_service_uuid() {
        for sensor in Sensor::ALL {
            assert_eq!(Sensor::from_service_uuid(sensor.service_uuid()), Some(sensor));
        }
    }

    #[test]
    fn should_parse_uuid_constants_from_canonical_strings() {
        let parsed = Uuid::parse_str("e95dca4b-251d-470a-a062-fa1922dfa9a8").unwrap();
        assert_eq!(parsed, ACCELEROMETER_DATA);
        let parsed = Uuid::parse_str("e95d9715-251d-470a-a062-fa1922dfa9a8").unwrap();
        assert_eq!(parsed, MAGNETOMETER_BEARING);
    }

    #[test]
    fn should_assign_bearing_role_distinct_from_magnetometer_vector() {
        assert_eq!(lookup_role(MAGNETOMETER_BEARING), Some(Role::Bearing));
        assert_eq!(lookup_role(MAGNETOMETER_DATA), Some(Role::VectorMeasurement));
    }

    #[test]
    fn should_return_none_role_for_unknown_uuid() {
        assert_eq!(lookup_role(CLIENT_CHARACTERISTIC_CONFIG), None);
        assert_eq!(lookup_role(Uuid::nil()), None);
    }

    #[test]
    fn should_keep_every_channel_within_its_sensor() {
        for sensor in Sensor::ALL {
            for channel in sensor.measurement_channels() {
                assert_eq!(channel.sensor(), sensor);
                assert!(channel.role().is_measurement());
            }
            if let Some(period) = sensor.period_channel() {
                assert_eq!(period.sensor(), sensor);
                assert_eq!(period.role(), Role::Period);
            }
        }
    }

    #[test]
    fn should_lookup_names_for_services_characteristics_and_generic_attributes() {
        assert_eq!(lookup_name(TEMPERATURE_SERVICE, "?"), "Temperature Service");
        assert_eq!(lookup_name(BUTTON_A_DATA, "?"), "Button A Data");
        assert_eq!(
            lookup_name(
                Uuid::parse_str("0000180a-0000-1000-8000-00805f9b34fb").unwrap(),
                "?"
            ),
            "Device Information Service"
        );
    }

    #[test]
    fn should_fall_back_to_default_name() {
        assert_eq!(lookup_name(Uuid::nil(), "Unknown service"), "Unknown service");
    }

    #[test]
    fn should_deserialize_channel_from_snake_case() {
        let channel: Channel = serde_json::from_str("\"accelerometer_data\"").unwrap();
        assert_eq!(channel, Channel::AccelerometerData);
    }
}

//! Sample: one decoded characteristic value.
//!
//! Samples are produced by the session for every read result and
//! notification, and consumed immediately by the bridge. They are never
//! retained.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::registry::Channel;

/// UTC timestamp of sample arrival.
pub type Timestamp = DateTime<Utc>;

/// Three-axis measurement in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3},{:.3},{:.3})", self.x, self.y, self.z)
    }
}

/// Eight-point compass label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompassPoint {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl fmt::Display for CompassPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::N => "N",
            Self::NE => "NE",
            Self::E => "E",
            Self::SE => "SE",
            Self::S => "S",
            Self::SW => "SW",
            Self::W => "W",
            Self::NW => "NW",
        };
        f.write_str(label)
    }
}

/// Compass heading as reported by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bearing {
    pub point: CompassPoint,
    /// Raw heading, not normalised.
    pub degrees: i16,
}

impl fmt::Display for Bearing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.point, self.degrees)
    }
}

/// A decoded characteristic payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    Scalar(u8),
    Vector(Vector3),
    /// Sampling period in milliseconds.
    Period(u16),
    Bearing(Bearing),
    /// Unknown role or undersized payload.
    Raw(Vec<u8>),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Vector(vector) => write!(f, "{vector}"),
            Self::Period(ms) => write!(f, "{ms} ms"),
            Self::Bearing(bearing) => write!(f, "{bearing}"),
            Self::Raw(bytes) => f.write_str(&codec::format_raw(bytes)),
        }
    }
}

/// A decoded value tagged with where and when it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Arrival order within the session, starting at 0.
    pub seq: u64,
    /// Characteristic the value was read from.
    pub uuid: Uuid,
    /// Known channel, resolved once at discovery. `None` for unknown characteristics.
    pub channel: Option<Channel>,
    pub value: SampleValue,
    pub received_at: Timestamp,
}

impl Sample {
    /// Build a sample stamped with the current time.
    #[must_use]
    pub fn new(seq: u64, uuid: Uuid, channel: Option<Channel>, value: SampleValue) -> Self {
        Self {
            seq,
            uuid,
            channel,
            value,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_format_vector_with_three_decimals() {
        let v = Vector3 {
            x: 1.0,
            y: -0.5,
            z: 0.0126,
        };
        assert_eq!(v.to_string(), "(1.000,-0.500,0.013)");
    }

    #[test]
    fn should_format_bearing_as_label_and_degrees() {
        let b = Bearing {
            point: CompassPoint::SW,
            degrees: 225,
        };
        assert_eq!(b.to_string(), "SW - 225");
    }

    #[test]
    fn should_format_period_in_milliseconds() {
        assert_eq!(SampleValue::Period(80).to_string(), "80 ms");
    }

    #[test]
    fn should_format_raw_value_as_text_and_hex() {
        assert_eq!(SampleValue::Raw(vec![0x41, 0x42]).to_string(), "AB\n41 42 ");
    }

    #[test]
    fn should_stamp_sample_on_creation() {
        let before = Utc::now();
        let sample = Sample::new(3, Uuid::nil(), None, SampleValue::Scalar(1));
        assert_eq!(sample.seq, 3);
        assert!(sample.received_at >= before);
    }

    #[test]
    fn should_roundtrip_sample_value_through_serde_json() {
        let value = SampleValue::Bearing(Bearing {
            point: CompassPoint::E,
            degrees: 90,
        });
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"bearing","value":{"point":"E","degrees":90}}"#
        );
        let parsed: SampleValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }
}

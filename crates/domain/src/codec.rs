//! Characteristic payload codec.
//!
//! Pure functions operating on raw `&[u8]` slices, with no BLE dependency needed.
//! All multi-byte fields are little-endian.
//!
//! | Role | Layout | Decoded as |
//! |------|--------|------------|
//! | Period | 0–1: u16 | milliseconds |
//! | Vector | 0–1, 2–3, 4–5: i16 | axis / 1000 |
//! | Scalar | 0: u8 | integer |
//! | Bearing | 0–1: i16 | degrees + compass label |
//!
//! Trailing bytes beyond the layout are ignored.

use std::fmt::Write as _;

use crate::error::DecodeError;
use crate::registry::Role;
use crate::sample::{Bearing, CompassPoint, SampleValue, Vector3};

const PERIOD_LEN: usize = 2;
const VECTOR_LEN: usize = 6;
const SCALAR_LEN: usize = 1;
const BEARING_LEN: usize = 2;

const VECTOR_SCALE: f64 = 1000.0;

/// Index 8 wraps back to north so that headings in `[337.5, 360)` round up
/// onto it.
const DIRECTIONS: [CompassPoint; 9] = [
    CompassPoint::N,
    CompassPoint::NE,
    CompassPoint::E,
    CompassPoint::SE,
    CompassPoint::S,
    CompassPoint::SW,
    CompassPoint::W,
    CompassPoint::NW,
    CompassPoint::N,
];

fn ensure_len(role: Role, data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::TooShort {
            role,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Encode a sampling period for writing to a period characteristic.
#[must_use]
pub fn encode_period(ms: u16) -> [u8; 2] {
    ms.to_le_bytes()
}

/// Decode a sampling period in milliseconds.
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when fewer than 2 bytes are supplied.
pub fn decode_period(data: &[u8]) -> Result<u16, DecodeError> {
    ensure_len(Role::Period, data, PERIOD_LEN)?;
    Ok(u16::from_le_bytes([data[0], data[1]]))
}

/// Decode a three-axis measurement.
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when fewer than 6 bytes are supplied.
pub fn decode_vector(data: &[u8]) -> Result<Vector3, DecodeError> {
    ensure_len(Role::VectorMeasurement, data, VECTOR_LEN)?;
    let axis = |at: usize| f64::from(i16::from_le_bytes([data[at], data[at + 1]])) / VECTOR_SCALE;
    Ok(Vector3 {
        x: axis(0),
        y: axis(2),
        z: axis(4),
    })
}

/// Decode a single unsigned byte.
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when the payload is empty.
pub fn decode_scalar(data: &[u8]) -> Result<u8, DecodeError> {
    ensure_len(Role::ScalarMeasurement, data, SCALAR_LEN)?;
    Ok(data[0])
}

/// Decode a compass heading.
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when fewer than 2 bytes are supplied.
pub fn decode_bearing(data: &[u8]) -> Result<Bearing, DecodeError> {
    ensure_len(Role::Bearing, data, BEARING_LEN)?;
    let degrees = i16::from_le_bytes([data[0], data[1]]);
    Ok(Bearing {
        point: compass_point(degrees),
        degrees,
    })
}

/// Quantise a heading to the nearest of eight compass points.
///
/// The heading is reduced into `[0, 360)` first, so negative values map onto
/// their positive equivalent.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compass_point(degrees: i16) -> CompassPoint {
    let normalized = f64::from(degrees.rem_euclid(360));
    // normalized < 360, so the index is at most 8
    let index = (normalized / 45.0).round() as usize;
    DIRECTIONS[index]
}

/// Render bytes as lossy text, a newline, then space-terminated uppercase hex.
///
/// An empty payload renders as the empty string.
#[must_use]
pub fn format_raw(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }
    let mut out = String::from_utf8_lossy(data).into_owned();
    out.push('\n');
    for byte in data {
        let _ = write!(out, "{byte:02X} ");
    }
    out
}

/// Decode a payload for a role.
///
/// A `None` role yields [`SampleValue::Raw`].
///
/// # Errors
///
/// Returns [`DecodeError`] when the payload is too short for the role.
pub fn try_decode(role: Option<Role>, data: &[u8]) -> Result<SampleValue, DecodeError> {
    let value = match role {
        Some(Role::Period) => SampleValue::Period(decode_period(data)?),
        Some(Role::VectorMeasurement) => SampleValue::Vector(decode_vector(data)?),
        Some(Role::ScalarMeasurement) => SampleValue::Scalar(decode_scalar(data)?),
        Some(Role::Bearing) => SampleValue::Bearing(decode_bearing(data)?),
        None => SampleValue::Raw(data.to_vec()),
    };
    Ok(value)
}

/// Decode a payload for a role, falling back to [`SampleValue::Raw`] when
/// the payload does not fit.
#[must_use]
pub fn decode(role: Option<Role>, data: &[u8]) -> SampleValue {
    try_decode(role, data).unwrap_or_else(|_| SampleValue::Raw(data.to_vec()))
}

//! Static routing table from sample channel to broker topic.

use gattbridge_domain::registry::Channel;
use gattbridge_domain::sample::Sample;

pub const TOPIC_ACCELEROMETER: &str = "TOPIC_ACCELEROMETER";
pub const TOPIC_TEMPERATURE: &str = "TOPIC_TEMPERATURE";
/// Shared by both buttons; the payload prefix tells them apart.
pub const TOPIC_BUTTON: &str = "TOPIC_BUTTON";
pub const TOPIC_MAGNETOMETER_DATA: &str = "TOPIC_MAGNETOMETER_DATA";
pub const TOPIC_MAGNETOMETER_BEARING: &str = "TOPIC_MAGNETOMETER_BEARING";

/// Where a channel's samples go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub topic: &'static str,
    /// Prepended to the formatted value.
    pub prefix: &'static str,
}

/// Route for a channel. Period channels are not published.
#[must_use]
pub fn route(channel: Channel) -> Option<Route> {
    let (topic, prefix) = match channel {
        Channel::AccelerometerData => (TOPIC_ACCELEROMETER, ""),
        Channel::TemperatureData => (TOPIC_TEMPERATURE, ""),
        Channel::ButtonA => (TOPIC_BUTTON, "A_"),
        Channel::ButtonB => (TOPIC_BUTTON, "B_"),
        Channel::MagnetometerData => (TOPIC_MAGNETOMETER_DATA, ""),
        Channel::MagnetometerBearing => (TOPIC_MAGNETOMETER_BEARING, ""),
        Channel::AccelerometerPeriod | Channel::TemperaturePeriod | Channel::MagnetometerPeriod => {
            return None;
        }
    };
    Some(Route { topic, prefix })
}

/// Full topic name under an optional base.
#[must_use]
pub fn qualify(base: Option<&str>, topic: &str) -> String {
    match base {
        Some(base) => format!("{}/{topic}", base.trim_end_matches('/')),
        None => topic.to_string(),
    }
}

/// Topic and payload for a sample, or `None` when the sample is not
/// published.
#[must_use]
pub fn render(sample: &Sample, base: Option<&str>) -> Option<(String, String)> {
    let route = route(sample.channel?)?;
    Some((
        qualify(base, route.topic),
        format!("{}{}", route.prefix, sample.value),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattbridge_domain::registry::{BUTTON_B_DATA, MAGNETOMETER_BEARING, TEMPERATURE_PERIOD};
    use gattbridge_domain::sample::{Bearing, CompassPoint, SampleValue};
    use uuid::Uuid;

    #[test]
    fn should_route_every_measurement_channel() {
        for channel in Channel::ALL {
            assert_eq!(route(channel).is_some(), channel.role().is_measurement());
        }
    }

    #[test]
    fn should_keep_bearing_apart_from_magnetometer_vector() {
        let data = route(Channel::MagnetometerData).unwrap();
        let bearing = route(Channel::MagnetometerBearing).unwrap();
        assert_ne!(data.topic, bearing.topic);
    }

    #[test]
    fn should_prefix_button_payloads() {
        let sample = Sample::new(
            0,
            BUTTON_B_DATA,
            Some(Channel::ButtonB),
            SampleValue::Scalar(1),
        );
        assert_eq!(
            render(&sample, None),
            Some((TOPIC_BUTTON.to_string(), "B_1".to_string()))
        );
    }

    #[test]
    fn should_render_bearing_under_base_topic() {
        let sample = Sample::new(
            0,
            MAGNETOMETER_BEARING,
            Some(Channel::MagnetometerBearing),
            SampleValue::Bearing(Bearing {
                point: CompassPoint::E,
                degrees: 90,
            }),
        );
        assert_eq!(
            render(&sample, Some("microbit/")),
            Some((
                "microbit/TOPIC_MAGNETOMETER_BEARING".to_string(),
                "E - 90".to_string()
            ))
        );
    }

    #[test]
    fn should_not_render_periods_or_unknown_characteristics() {
        let period = Sample::new(
            0,
            TEMPERATURE_PERIOD,
            Some(Channel::TemperaturePeriod),
            SampleValue::Period(80),
        );
        assert_eq!(render(&period, None), None);

        let unknown = Sample::new(1, Uuid::nil(), None, SampleValue::Raw(vec![0x41]));
        assert_eq!(render(&unknown, None), None);
    }
}

use serde::{Deserialize, Serialize};

/// One successful sensor measurement.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Measurement {
    pub temperature_celsius: f32,
    pub relative_humidity: f32,
}

/// The climate reading taken once per boot.
///
/// A failed sensor read leaves both fields empty.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reading {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

impl Reading {
    pub const EMPTY: Self = Self {
        temperature: None,
        humidity: None,
    };
}

impl From<Measurement> for Reading {
    fn from(measurement: Measurement) -> Self {
        Self {
            temperature: Some(measurement.temperature_celsius),
            humidity: Some(measurement.relative_humidity),
        }
    }
}

/// Motion flag as understood by the Home Assistant binary sensor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl Motion {
    pub fn as_str(self) -> &'static str {
        match self {
            Motion::On => "ON",
            Motion::Off => "OFF",
        }
    }
}

impl core::fmt::Display for Motion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[test]
fn test_reading_from_measurement() {
    let reading = Reading::from(Measurement {
        temperature_celsius: 21.25,
        relative_humidity: 48.0,
    });

    assert_eq!(reading.temperature, Some(21.25));
    assert_eq!(reading.humidity, Some(48.0));
    assert_eq!(Reading::default(), Reading::EMPTY);
}

//! MQTT payloads: the state document and the Home Assistant discovery
//! documents that describe it.
//!
//! Reference: https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery

use serde::Serialize;

use crate::reading::{Motion, Reading};

/// Document published on the state topic.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct StatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f32>,
    #[serde(rename = "motionDetected")]
    pub motion_detected: Motion,
}

impl StatePayload {
    /// Build the state document for `reading`.
    ///
    /// Values of exactly `0.0` are left out together with missing ones; the
    /// hub has always treated a zero as "no reading".
    pub fn new(reading: &Reading, motion: Motion) -> Self {
        let non_zero = |value: Option<f32>| value.filter(|v| *v != 0.0);

        Self {
            temperature: non_zero(reading.temperature),
            humidity: non_zero(reading.humidity),
            motion_detected: motion,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One Home Assistant discovery document, using the abbreviated key names.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DiscoveryPayload<'a> {
    pub name: &'a str,
    #[serde(rename = "dev_cla")]
    pub device_class: &'a str,
    #[serde(rename = "stat_t")]
    pub state_topic: &'a str,
    #[serde(rename = "unit_of_meas", skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'a str>,
    pub unique_id: &'a str,
    #[serde(rename = "frc_upd", skip_serializing_if = "Option::is_none")]
    pub force_update: Option<bool>,
    #[serde(rename = "val_tpl")]
    pub value_template: &'a str,
}

/// A sensor entity announced to the hub.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entity {
    /// Topic below the discovery prefix, without the trailing `/config`.
    pub node: &'static str,
    pub name: &'static str,
    pub device_class: &'static str,
    pub unique_id: &'static str,
    pub value_template: &'static str,
    pub unit: Option<&'static str>,
    pub force_update: Option<bool>,
}

pub const MOTION: Entity = Entity {
    node: "binary_sensor/temp_motion_sensors",
    name: "Multi Sensor - Motion",
    device_class: "motion",
    unique_id: "multi_sensor_1_motion",
    value_template: "{{ value_json.motionDetected|default(0) }}",
    unit: None,
    force_update: None,
};

pub const HUMIDITY: Entity = Entity {
    node: "sensor/multi_sensor_1/humidity",
    name: "Relative Humidity",
    device_class: "humidity",
    unique_id: "multi_sensor_1_humidity",
    value_template: "{{ value_json.humidity|default(0) }}",
    unit: Some("rH"),
    force_update: Some(true),
};

pub const TEMPERATURE: Entity = Entity {
    node: "sensor/multi_sensor_1/temperature",
    name: "Ambient Temperature",
    device_class: "temperature",
    unique_id: "multi_sensor_1_temperature",
    value_template: "{{ value_json.temperature|default(0) }}",
    unit: Some("°C"),
    force_update: Some(true),
};

/// Announced in this order on every boot.
pub const ENTITIES: [Entity; 3] = [MOTION, HUMIDITY, TEMPERATURE];

impl Entity {
    pub fn topic(&self, prefix: &str) -> String {
        format!("{}/{}/config", prefix, self.node)
    }

    pub fn payload<'a>(&'a self, state_topic: &'a str) -> DiscoveryPayload<'a> {
        DiscoveryPayload {
            name: self.name,
            device_class: self.device_class,
            state_topic,
            unit_of_measurement: self.unit,
            unique_id: self.unique_id,
            force_update: self.force_update,
            value_template: self.value_template,
        }
    }
}

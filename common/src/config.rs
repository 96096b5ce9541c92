use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Runtime configuration of the node.
///
/// Every field has a default, so a provisioning document only needs to carry
/// the values that differ (usually the credentials).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub retry: RetryConfig,
    pub sleep: SleepConfig,
    pub motion: MotionConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Size of the client's in/out message buffers in bytes.
    pub buffer_size: usize,
    /// How long a single connection attempt waits for the broker's CONNACK.
    pub connect_timeout_ms: u64,
    pub state_topic: String,
    pub discovery_prefix: String,
    pub retain_discovery: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "192.168.68.58".into(),
            port: 1883,
            client_id: "OutsideWeatherStation_2".into(),
            username: String::new(),
            password: String::new(),
            buffer_size: 512,
            connect_timeout_ms: 5_000,
            state_topic: "home/multi_sensors/mqtt/temp_motion_sensor_1/action".into(),
            discovery_prefix: "homeassistant".into(),
            retain_discovery: false,
        }
    }
}

impl MqttConfig {
    /// Broker URL in the form expected by the ESP-IDF client.
    pub fn url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub wifi_attempts: u32,
    pub wifi_delay_ms: u64,
    pub broker_attempts: u32,
    pub broker_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            wifi_attempts: 5,
            wifi_delay_ms: 1_000,
            broker_attempts: 5,
            broker_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn wifi(&self) -> RetryPolicy {
        RetryPolicy::new(self.wifi_attempts, Duration::from_millis(self.wifi_delay_ms))
    }

    pub fn broker(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.broker_attempts,
            Duration::from_millis(self.broker_delay_ms),
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SleepConfig {
    pub interval_secs: u64,
    pub error_interval_secs: u64,
    /// GPIO bitmask armed as an ext1 "any high" wake source.
    pub wake_pin_mask: u64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            error_interval_secs: 600,
            // GPIO2 | GPIO15
            wake_pin_mask: 0x8004,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    pub poll_interval_ms: u32,
    /// Upper bound for waiting on the motion pin to drop. `None` waits forever.
    pub release_timeout_secs: Option<u64>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            release_timeout_secs: Some(300),
        }
    }
}

impl Config {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi.ssid.is_empty() {
            return Err(ConfigError::Empty("wifi.ssid"));
        }
        if self.mqtt.host.is_empty() {
            return Err(ConfigError::Empty("mqtt.host"));
        }
        if self.mqtt.state_topic.is_empty() {
            return Err(ConfigError::Empty("mqtt.state_topic"));
        }
        if self.retry.wifi_attempts == 0 {
            return Err(ConfigError::Zero("retry.wifi_attempts"));
        }
        if self.retry.broker_attempts == 0 {
            return Err(ConfigError::Zero("retry.broker_attempts"));
        }
        if self.sleep.wake_pin_mask == 0 {
            return Err(ConfigError::Zero("sleep.wake_pin_mask"));
        }
        Ok(())
    }
}

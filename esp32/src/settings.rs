//! Provisioned configuration.
//!
//! A JSON document stored in NVS takes precedence; without one the node runs
//! on the values baked in at build time (`WIFI_SSID`, `WIFI_PASS`, `MQTT_HOST`,
//! `MQTT_USER`, `MQTT_PASS`).

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use log::{info, warn};
use motion_sensor_common::Config;

const NVS_NAMESPACE: &str = "motion_sensor";
const NVS_CONFIG_KEY: &str = "config";
const MAX_CONFIG_LEN: usize = 1024;

pub fn load(partition: EspDefaultNvsPartition) -> Config {
    match load_provisioned(partition) {
        Ok(Some(config)) => {
            info!("config: using provisioned settings");
            config
        }
        Ok(None) => {
            info!("config: nothing provisioned, using build settings");
            build_settings()
        }
        Err(err) => {
            warn!("config: provisioned settings rejected ({err:#}), using build settings");
            build_settings()
        }
    }
}

fn load_provisioned(partition: EspDefaultNvsPartition) -> anyhow::Result<Option<Config>> {
    let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; MAX_CONFIG_LEN];

    match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
        Some(json) => Ok(Some(Config::from_json(json)?)),
        None => Ok(None),
    }
}

fn build_settings() -> Config {
    let mut config = Config::default();

    let overrides = [
        (option_env!("WIFI_SSID"), &mut config.wifi.ssid),
        (option_env!("WIFI_PASS"), &mut config.wifi.password),
        (option_env!("MQTT_HOST"), &mut config.mqtt.host),
        (option_env!("MQTT_USER"), &mut config.mqtt.username),
        (option_env!("MQTT_PASS"), &mut config.mqtt.password),
    ];
    for (value, field) in overrides {
        if let Some(value) = value {
            *field = value.to_owned();
        }
    }

    config
}

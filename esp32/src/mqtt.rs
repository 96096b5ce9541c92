use std::sync::mpsc;
use std::time::Duration;

use anyhow::anyhow;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use esp_idf_svc::sys::EspError;
use log::{info, warn};
use motion_sensor_common::config::MqttConfig;
use motion_sensor_common::{Broker, Publisher};

/// Connects to the broker with the node's identity and credentials.
pub struct MqttBroker {
    config: MqttConfig,
}

impl MqttBroker {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }
}

impl Broker for MqttBroker {
    type Client = MqttPublisher;
    type Error = anyhow::Error;

    /// Create a client and wait for the broker's answer.
    ///
    /// The ESP-IDF client connects in the background, so the event callback
    /// forwards the first connection result over a channel.
    fn connect(&mut self) -> anyhow::Result<MqttPublisher> {
        let mqtt = &self.config;
        let conf = MqttClientConfiguration {
            client_id: Some(mqtt.client_id.as_str()),
            username: (!mqtt.username.is_empty()).then_some(mqtt.username.as_str()),
            password: (!mqtt.password.is_empty()).then_some(mqtt.password.as_str()),
            buffer_size: mqtt.buffer_size,
            out_buffer_size: mqtt.buffer_size,
            ..Default::default()
        };

        let (tx, rx) = mpsc::channel::<Result<(), String>>();
        let client = EspMqttClient::new_cb(&mqtt.url(), &conf, move |event| {
            let state = match event.payload() {
                EventPayload::Connected(_) => Ok(()),
                EventPayload::Disconnected => Err("disconnected".to_string()),
                EventPayload::Error(err) => Err(err.to_string()),
                _ => return,
            };
            // the receiver is gone once the attempt is decided
            let _ = tx.send(state);
        })?;

        let timeout = Duration::from_millis(mqtt.connect_timeout_ms);
        match rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                info!("mqtt: connected as {}", mqtt.client_id);
                Ok(MqttPublisher { client })
            }
            Ok(Err(reason)) => Err(anyhow!("not connected: {reason}")),
            Err(_) => {
                warn!("mqtt: no answer from {}", mqtt.url());
                Err(anyhow!("no answer within {timeout:?}"))
            }
        }
    }
}

/// A connected session. Dropping it disconnects from the broker.
pub struct MqttPublisher {
    client: EspMqttClient<'static>,
}

impl Publisher for MqttPublisher {
    type Error = EspError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), EspError> {
        self.client
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .map(|_| ())
    }
}

mod esp32;
mod mqtt;
mod settings;
mod sleep;
mod wifi;

use std::time::Duration;

use esp_idf_svc::hal::delay::FreeRtos;
use log::{error, info};
use motion_sensor_common::config::SleepConfig;
use motion_sensor_common::{Board, BootCycle, SleepPlan, WakeCause};

/// Bring up the node and run one boot cycle.
fn run(wake_cause: WakeCause) -> anyhow::Result<SleepPlan> {
    let node = esp32::EspNode::new()?;

    let config = settings::load(node.nvs.clone());
    config.validate()?;

    let network = wifi::WifiLink::new(node.wifi, &config.wifi)?;
    let broker = mqtt::MqttBroker::new(config.mqtt.clone());

    let board = Board {
        sensor: node.sensor,
        motion_pin: node.motion_pin,
        status_led: node.status_led,
        delay: FreeRtos,
    };

    Ok(BootCycle::new(&config, board, network, broker).run(wake_cause))
}

fn main() {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    let wake_cause = sleep::wake_cause();

    let (timer, wake_pin_mask) = match run(wake_cause) {
        Ok(plan) => {
            info!("boot: cycle finished: {:?}", plan.outcome);
            (plan.timer, plan.wake_pin_mask)
        }
        Err(err) => {
            // Without drivers or settings there is nothing to publish; try again next wake.
            error!("boot: setup failed: {err:#}");
            let fallback = SleepConfig::default();
            (
                Duration::from_secs(fallback.error_interval_secs),
                fallback.wake_pin_mask,
            )
        }
    };

    sleep::deep_sleep(timer, wake_pin_mask)
}
